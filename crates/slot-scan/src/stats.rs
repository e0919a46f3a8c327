use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Process-wide counters shared by every city poller
#[derive(Debug)]
pub struct TrackerStats {
    checking_since: DateTime<Utc>,
    check_count: AtomicU64,
    good_api_responses: AtomicU64,
    bad_api_responses: AtomicU64,
    internal_failures: AtomicU64,
    published_centers: AtomicU64,
    failed_deliveries: AtomicU64,
    last_publish_time: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`TrackerStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// When this process started checking
    pub checking_since: DateTime<Utc>,
    /// Completed polling cycles across all cities
    pub check_count: u64,
    /// Successful upstream fetches
    pub good_api_responses: u64,
    /// Failed upstream fetches
    pub bad_api_responses: u64,
    /// Internal failures recovered from
    pub internal_failures: u64,
    /// Centers delivered to at least one channel
    pub published_centers: u64,
    /// Failed channel deliveries
    pub failed_deliveries: u64,
    /// Most recent successful publish
    pub last_publish_time: Option<DateTime<Utc>>,
    /// Slots currently in the tracker
    pub tracked_slots: usize,
}

impl TrackerStats {
    /// Start counting from `checking_since`
    pub fn new(checking_since: DateTime<Utc>) -> Self {
        Self {
            checking_since,
            check_count: AtomicU64::new(0),
            good_api_responses: AtomicU64::new(0),
            bad_api_responses: AtomicU64::new(0),
            internal_failures: AtomicU64::new(0),
            published_centers: AtomicU64::new(0),
            failed_deliveries: AtomicU64::new(0),
            last_publish_time: Mutex::new(None),
        }
    }

    /// One polling cycle finished
    pub fn add_check_count(&self) {
        self.check_count.fetch_add(1, Ordering::Relaxed);
    }

    /// One upstream fetch succeeded
    pub fn add_good_response(&self) {
        self.good_api_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// One upstream fetch failed
    pub fn add_bad_response(&self) {
        self.bad_api_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// An internal failure was logged and skipped
    pub fn add_internal_failure(&self) {
        self.internal_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A channel delivery failed
    pub fn add_failed_delivery(&self) {
        self.failed_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    /// A center was published at `at`
    pub fn record_publish(&self, at: DateTime<Utc>) {
        self.published_centers.fetch_add(1, Ordering::Relaxed);

        let mut last = match self.last_publish_time.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.is_none_or(|previous| previous < at) {
            *last = Some(at);
        }
    }

    /// Copy every counter; `tracked_slots` comes from the tracker store
    pub fn snapshot(&self, tracked_slots: usize) -> StatsSnapshot {
        let last_publish_time = match self.last_publish_time.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };

        StatsSnapshot {
            checking_since: self.checking_since,
            check_count: self.check_count.load(Ordering::Relaxed),
            good_api_responses: self.good_api_responses.load(Ordering::Relaxed),
            bad_api_responses: self.bad_api_responses.load(Ordering::Relaxed),
            internal_failures: self.internal_failures.load(Ordering::Relaxed),
            published_centers: self.published_centers.load(Ordering::Relaxed),
            failed_deliveries: self.failed_deliveries.load(Ordering::Relaxed),
            last_publish_time,
            tracked_slots,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Checking since: {}",
            self.checking_since.format("%b %-d, %Y %H:%M:%S")
        )?;
        writeln!(f, "Check count: {}", self.check_count)?;
        writeln!(f, "Good api response: {}", self.good_api_responses)?;
        writeln!(f, "Bad api response: {}", self.bad_api_responses)?;
        writeln!(f, "Internal failures: {}", self.internal_failures)?;
        writeln!(f, "Published centers: {}", self.published_centers)?;
        writeln!(f, "Failed deliveries: {}", self.failed_deliveries)?;
        write!(f, "Tracked slots: {}", self.tracked_slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = TrackerStats::new(start());
        stats.add_check_count();
        stats.add_check_count();
        stats.add_good_response();
        stats.add_bad_response();
        stats.add_internal_failure();
        stats.add_failed_delivery();

        let snapshot = stats.snapshot(4);
        assert_eq!(snapshot.check_count, 2);
        assert_eq!(snapshot.good_api_responses, 1);
        assert_eq!(snapshot.bad_api_responses, 1);
        assert_eq!(snapshot.internal_failures, 1);
        assert_eq!(snapshot.failed_deliveries, 1);
        assert_eq!(snapshot.tracked_slots, 4);
        assert_eq!(snapshot.last_publish_time, None);
    }

    #[test]
    fn test_last_publish_time_never_moves_backwards() {
        let stats = TrackerStats::new(start());
        let later = start() + Duration::hours(2);
        stats.record_publish(later);
        stats.record_publish(start() + Duration::hours(1));

        let snapshot = stats.snapshot(0);
        assert_eq!(snapshot.published_centers, 2);
        assert_eq!(snapshot.last_publish_time, Some(later));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(TrackerStats::new(start()));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    stats.add_check_count();
                    stats.add_good_response();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = stats.snapshot(0);
        assert_eq!(snapshot.check_count, 8000);
        assert_eq!(snapshot.good_api_responses, 8000);
    }

    #[test]
    fn test_report_text() {
        let stats = TrackerStats::new(start());
        stats.add_check_count();
        let text = stats.snapshot(3).to_string();
        assert!(text.starts_with("Checking since: Jun 1, 2021 08:00:00\n"));
        assert!(text.contains("Check count: 1\n"));
        assert!(text.ends_with("Tracked slots: 3"));
    }
}
