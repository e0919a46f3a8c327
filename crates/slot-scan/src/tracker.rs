use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::publish_gate::{GateDecision, decide};
use crate::slot_types::{Center, Session, TrackerError};

/// Upstream date format for sessions, e.g. `5-06-2021`
pub const SESSION_DATE_FORMAT: &str = "%d-%m-%Y";

/// Identity of a trackable slot across polling cycles
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    /// Upstream center identifier
    pub center_id: i64,
    /// Center postal code
    pub pincode: i64,
    /// Session date as sent by the upstream API
    pub date: String,
    /// Vaccine name
    pub vaccine: String,
    /// Minimum eligible age of the session
    pub min_age_limit: u32,
}

impl SlotKey {
    /// Build the key for a session offered by `center`
    pub fn new(center: &Center, session: &Session) -> Self {
        Self {
            center_id: center.center_id,
            pincode: center.pincode,
            date: session.date.clone(),
            vaccine: session.vaccine.clone(),
            min_age_limit: session.min_age_limit,
        }
    }

    /// Session date, if it parses
    pub fn session_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, SESSION_DATE_FORMAT).ok()
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.center_id, self.pincode, self.date, self.vaccine, self.min_age_limit
        )
    }
}

/// Last known state of one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSlot {
    /// Capacity at the most recent observation
    pub last_known_capacity: u32,
    /// Time of the most recent observation
    pub last_check_time: DateTime<Utc>,
    /// Time of the most recent successful notification, if any
    pub last_publish_time: Option<DateTime<Utc>>,
}

/// In-memory record of every slot seen by this process.
///
/// Shared between city pollers through an `Arc`; every access goes through a
/// single mutex, which is never held across a network call.
#[derive(Debug, Default)]
pub struct TrackerStore {
    slots: Mutex<HashMap<SlotKey, TrackedSlot>>,
}

impl TrackerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the entry for `key`, if tracked
    pub async fn get(&self, key: &SlotKey) -> Option<TrackedSlot> {
        self.slots.lock().await.get(key).cloned()
    }

    /// Number of tracked slots
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// True when nothing is tracked yet
    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Record an observation of `key`.
    ///
    /// Existing entries get their capacity and check time refreshed. Absent
    /// entries are only created when `force` is set. Returns whether the key
    /// is tracked afterwards.
    pub async fn record_observation(
        &self,
        key: &SlotKey,
        capacity: u32,
        now: DateTime<Utc>,
        force: bool,
    ) -> bool {
        let mut slots = self.slots.lock().await;
        upsert(&mut slots, key, capacity, now, force)
    }

    /// Gate and record one observation under a single lock acquisition.
    ///
    /// Eligible observations are checked against the gate and then recorded
    /// with force; ineligible ones only refresh an existing entry and always
    /// suppress.
    pub async fn observe(
        &self,
        key: &SlotKey,
        capacity: u32,
        eligible: bool,
        now: DateTime<Utc>,
        publish_interval: Duration,
    ) -> GateDecision {
        let mut slots = self.slots.lock().await;

        let decision = if eligible {
            decide(slots.get(key), capacity, now, publish_interval)
        } else {
            GateDecision::Suppress
        };

        upsert(&mut slots, key, capacity, now, eligible);

        if let GateDecision::Qualify(reason) = decision {
            debug!("Slot {} qualified ({:?}) with capacity {}", key, reason, capacity);
        }

        decision
    }

    /// Mark `key` as published at `now`
    pub async fn record_publish(&self, key: &SlotKey, now: DateTime<Utc>) -> Result<(), TrackerError> {
        let mut slots = self.slots.lock().await;

        match slots.get_mut(key) {
            Some(slot) => {
                slot.last_publish_time = Some(now);
                Ok(())
            }
            None => Err(TrackerError::MissingEntry(key.to_string())),
        }
    }

    /// Drop entries whose session date is before `today`.
    ///
    /// Entries with an unparseable date are kept. Returns the number removed.
    pub async fn evict_before(&self, today: NaiveDate) -> usize {
        let mut slots = self.slots.lock().await;
        let before = slots.len();

        slots.retain(|key, _| key.session_date().is_none_or(|date| date >= today));

        let removed = before - slots.len();
        if removed > 0 {
            info!("Evicted {} past slots from tracker", removed);
        }
        removed
    }
}

fn upsert(
    slots: &mut HashMap<SlotKey, TrackedSlot>,
    key: &SlotKey,
    capacity: u32,
    now: DateTime<Utc>,
    force: bool,
) -> bool {
    if let Some(slot) = slots.get_mut(key) {
        slot.last_known_capacity = capacity;
        slot.last_check_time = now;
        return true;
    }

    if force {
        slots.insert(
            key.clone(),
            TrackedSlot {
                last_known_capacity: capacity,
                last_check_time: now,
                last_publish_time: None,
            },
        );
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish_gate::{DEFAULT_PUBLISH_INTERVAL, QualifyReason};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 1, 8, 0, 0).unwrap()
    }

    fn key(center_id: i64, date: &str) -> SlotKey {
        SlotKey {
            center_id,
            pincode: 560043,
            date: date.to_string(),
            vaccine: "COVISHIELD".to_string(),
            min_age_limit: 18,
        }
    }

    #[test]
    fn test_key_distinguishes_sessions_within_center() {
        let base = key(1, "5-06-2021");
        let mut other_vaccine = base.clone();
        other_vaccine.vaccine = "COVAXIN".to_string();
        let mut other_age = base.clone();
        other_age.min_age_limit = 45;

        assert_ne!(base, key(1, "6-06-2021"));
        assert_ne!(base, other_vaccine);
        assert_ne!(base, other_age);
        assert_eq!(base.to_string(), "1:560043:5-06-2021:COVISHIELD:18");
        assert_eq!(base.session_date(), NaiveDate::from_ymd_opt(2021, 6, 5));
    }

    #[tokio::test]
    async fn test_lookup_of_unknown_key_is_absent() {
        let store = TrackerStore::new();
        assert_eq!(store.get(&key(1, "5-06-2021")).await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_lazy_recording_skips_unknown_keys() {
        let store = TrackerStore::new();
        let k = key(1, "5-06-2021");

        assert!(!store.record_observation(&k, 4, t0(), false).await);
        assert_eq!(store.get(&k).await, None);

        assert!(store.record_observation(&k, 4, t0(), true).await);
        assert!(store.record_observation(&k, 2, t0(), false).await);
        assert_eq!(store.get(&k).await.unwrap().last_known_capacity, 2);
    }

    #[tokio::test]
    async fn test_repeated_observation_is_idempotent() {
        let store = TrackerStore::new();
        let k = key(1, "5-06-2021");

        store.observe(&k, 7, true, t0(), DEFAULT_PUBLISH_INTERVAL).await;
        let first = store.get(&k).await;
        store.observe(&k, 7, true, t0(), DEFAULT_PUBLISH_INTERVAL).await;
        assert_eq!(store.get(&k).await, first);
    }

    #[tokio::test]
    async fn test_operations_on_one_key_leave_others_untouched() {
        let store = TrackerStore::new();
        let a = key(1, "5-06-2021");
        let b = key(2, "5-06-2021");

        store.observe(&b, 3, true, t0(), DEFAULT_PUBLISH_INTERVAL).await;
        let b_before = store.get(&b).await;

        store.observe(&a, 9, true, t0() + Duration::hours(1), DEFAULT_PUBLISH_INTERVAL).await;
        store.record_publish(&a, t0() + Duration::hours(1)).await.unwrap();
        store.record_observation(&a, 1, t0() + Duration::hours(2), true).await;

        assert_eq!(store.get(&b).await, b_before);
    }

    #[tokio::test]
    async fn test_record_publish_without_entry_is_an_error() {
        let store = TrackerStore::new();
        let result = store.record_publish(&key(1, "5-06-2021"), t0()).await;
        assert!(matches!(result, Err(TrackerError::MissingEntry(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_ineligible_observation_never_qualifies() {
        let store = TrackerStore::new();
        let k = key(1, "5-06-2021");

        let decision = store.observe(&k, 0, false, t0(), DEFAULT_PUBLISH_INTERVAL).await;
        assert_eq!(decision, GateDecision::Suppress);
        assert_eq!(store.get(&k).await, None);
    }

    #[tokio::test]
    async fn test_capacity_drop_to_zero_then_reopening_requalifies() {
        let store = TrackerStore::new();
        let k = key(1, "5-06-2021");
        let interval = DEFAULT_PUBLISH_INTERVAL;

        store.observe(&k, 5, true, t0(), interval).await;
        store.record_publish(&k, t0()).await.unwrap();

        store.observe(&k, 0, false, t0() + Duration::minutes(1), interval).await;
        assert_eq!(store.get(&k).await.unwrap().last_known_capacity, 0);

        let decision = store.observe(&k, 2, true, t0() + Duration::minutes(2), interval).await;
        assert_eq!(decision, GateDecision::Qualify(QualifyReason::CapacityIncreased));
    }

    #[tokio::test]
    async fn test_publish_cycle_scenario() {
        let store = TrackerStore::new();
        let k = key(1, "5-06-2021");
        let interval = Duration::hours(12);

        let decision = store.observe(&k, 5, true, t0(), interval).await;
        assert_eq!(decision, GateDecision::Qualify(QualifyReason::FirstSighting));
        store.record_publish(&k, t0()).await.unwrap();
        assert_eq!(
            store.get(&k).await,
            Some(TrackedSlot {
                last_known_capacity: 5,
                last_check_time: t0(),
                last_publish_time: Some(t0()),
            })
        );

        let one_hour = t0() + Duration::hours(1);
        let decision = store.observe(&k, 3, true, one_hour, interval).await;
        assert_eq!(decision, GateDecision::Suppress);
        let entry = store.get(&k).await.unwrap();
        assert_eq!(entry.last_known_capacity, 3);
        assert_eq!(entry.last_check_time, one_hour);
        assert_eq!(entry.last_publish_time, Some(t0()));

        let thirteen_hours = t0() + Duration::hours(13);
        let decision = store.observe(&k, 3, true, thirteen_hours, interval).await;
        assert_eq!(decision, GateDecision::Qualify(QualifyReason::Stale));
        store.record_publish(&k, thirteen_hours).await.unwrap();
        assert_eq!(
            store.get(&k).await.unwrap().last_publish_time,
            Some(thirteen_hours)
        );
    }

    #[tokio::test]
    async fn test_evict_before_drops_only_past_dates() {
        let store = TrackerStore::new();
        let past = key(1, "31-05-2021");
        let today = key(1, "1-06-2021");
        let garbled = key(1, "not-a-date");

        for k in [&past, &today, &garbled] {
            store.record_observation(k, 1, t0(), true).await;
        }

        let removed = store
            .evict_before(NaiveDate::from_ymd_opt(2021, 6, 1).unwrap())
            .await;
        assert_eq!(removed, 1);
        assert_eq!(store.get(&past).await, None);
        assert!(store.get(&today).await.is_some());
        assert!(store.get(&garbled).await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pollers_on_disjoint_keys() {
        let store = Arc::new(TrackerStore::new());
        let mut handles = Vec::new();

        for worker in 0..8i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for day in 1..=20 {
                    let k = key(worker, &format!("{}-06-2021", day));
                    let decision = store.observe(&k, 4, true, t0(), DEFAULT_PUBLISH_INTERVAL).await;
                    assert!(decision.qualifies());
                    store.record_publish(&k, t0()).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len().await, 160);
        for worker in 0..8i64 {
            for day in 1..=20 {
                let entry = store.get(&key(worker, &format!("{}-06-2021", day))).await.unwrap();
                assert_eq!(entry.last_known_capacity, 4);
                assert_eq!(entry.last_publish_time, Some(t0()));
            }
        }
    }
}
