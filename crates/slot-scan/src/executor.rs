use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use futures_util::FutureExt;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, warn};

use crate::config::{Channel, City};
use crate::cowin_client::CowinClient;
use crate::eligibility::EligibilityFilter;
use crate::publish_gate::DEFAULT_PUBLISH_INTERVAL;
use crate::slot_types::{Center, Session};
use crate::stats::{StatsSnapshot, TrackerStats};
use crate::tracker::{SlotKey, TrackerStore};

/// Outcome of publishing one center to its channels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Slots delivered to at least one channel
    pub delivered: Vec<SlotKey>,
    /// Channels that received the message
    pub delivered_channels: usize,
    /// Channels whose delivery failed
    pub failed_channels: usize,
}

/// Trait for notification sinks (chat channels)
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Announce `center`, numbered `position` within its batch, to `channels`
    async fn publish_center(
        &self,
        position: usize,
        center: &Center,
        channels: &[Channel],
    ) -> DeliveryReport;

    /// Send a statistics report to `chat_id`
    async fn publish_stats(
        &self,
        chat_id: &str,
        snapshot: &StatsSnapshot,
    ) -> Result<(), NotificationError>;
}

/// Errors raised while delivering notifications
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The chat provider rejected the message
    #[error("Telegram error: {0}")]
    Telegram(String),
    /// The chat provider could not be reached
    #[error("Network error: {0}")]
    Network(String),
    /// The chat service is misconfigured
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Tunables shared by every city poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Pause between cycles when the city has no override (default: 60 seconds)
    pub polling_interval: Duration,

    /// Minimum spacing between notifications of an unchanged slot (default: 12 hours)
    pub publish_interval: chrono::Duration,

    /// Which sessions may be announced at all
    pub eligibility: EligibilityFilter,

    /// Pause before restarting a poller that panicked (default: 5 seconds)
    pub restart_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(60),
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            eligibility: EligibilityFilter::default(),
            restart_delay: Duration::from_secs(5),
        }
    }
}

/// What one polling cycle saw and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Centers returned by all districts that answered
    pub centers_seen: usize,
    /// Districts whose fetch failed
    pub failed_districts: usize,
    /// Centers that qualified for a notification
    pub qualified_centers: usize,
    /// Qualified centers delivered to at least one channel
    pub published_centers: usize,
}

/// Polls one city's districts and publishes newly available slots
pub struct CityPoller {
    city: City,
    cowin_client: Arc<CowinClient>,
    tracker: Arc<TrackerStore>,
    stats: Arc<TrackerStats>,
    notification_sink: Arc<dyn NotificationSink>,
    config: PollerConfig,
}

impl CityPoller {
    /// Create a poller for `city`
    pub fn new(
        city: City,
        cowin_client: Arc<CowinClient>,
        tracker: Arc<TrackerStore>,
        stats: Arc<TrackerStats>,
        notification_sink: Arc<dyn NotificationSink>,
        config: Option<PollerConfig>,
    ) -> Self {
        Self {
            city,
            cowin_client,
            tracker,
            stats,
            notification_sink,
            config: config.unwrap_or_default(),
        }
    }

    /// Poll forever, restarting the loop if a cycle panics
    pub async fn run_supervised(self: Arc<Self>) {
        loop {
            let poller = self.clone();
            if AssertUnwindSafe(poller.start()).catch_unwind().await.is_ok() {
                return;
            }

            error!(
                "Poller for {} panicked, restarting in {:?}",
                self.city.name, self.config.restart_delay
            );
            self.stats.add_internal_failure();
            sleep(self.config.restart_delay).await;
        }
    }

    /// Run polling cycles forever
    pub async fn start(&self) {
        let cadence = self.city.polling_interval_or(self.config.polling_interval);
        info!(
            "Starting poller for {} ({} districts, every {:?})",
            self.city.name,
            self.city.district_id.len(),
            cadence
        );

        run_paced(cadence, move |cycle| async move {
            info!("Check for city {} #{}", self.city.name, cycle);
            let summary = self.run_cycle(Utc::now(), Local::now().date_naive()).await;
            debug!("Cycle #{} for {}: {:?}", cycle, self.city.name, summary);
        })
        .await
    }

    /// Fetch, gate and publish once, as of `now` with `today` as the first calendar day
    pub async fn run_cycle(&self, now: DateTime<Utc>, today: NaiveDate) -> CycleSummary {
        self.tracker.evict_before(today).await;

        let (centers, failed_districts) = self.fetch_centers(today).await;
        let centers_seen = centers.len();

        let qualified = self.evaluate_centers(centers, now).await;
        let published_centers = if qualified.is_empty() {
            debug!("No qualified centers for {}", self.city.name);
            0
        } else {
            info!(
                "Found {} qualified centers in {}",
                qualified.len(),
                self.city.name
            );
            self.publish_qualified(&qualified, now).await
        };

        self.stats.add_check_count();

        CycleSummary {
            centers_seen,
            failed_districts,
            qualified_centers: qualified.len(),
            published_centers,
        }
    }

    /// Fetch every district of the city; failed districts are counted and skipped
    async fn fetch_centers(&self, date: NaiveDate) -> (Vec<Center>, usize) {
        let mut centers = Vec::new();
        let mut failed = 0;

        for district_id in &self.city.district_id {
            match self
                .cowin_client
                .get_centers_by_district(*district_id, date)
                .await
            {
                Ok(found) => {
                    self.stats.add_good_response();
                    centers.extend(found);
                }
                Err(e) => {
                    warn!(
                        "Failed to fetch district {} for {}: {}",
                        district_id, self.city.name, e
                    );
                    self.stats.add_bad_response();
                    failed += 1;
                }
            }
        }

        (centers, failed)
    }

    /// Record every observation and return the centers worth announcing.
    ///
    /// A center qualifies when any of its eligible sessions passes the publish
    /// gate; the returned center then carries all of its eligible sessions.
    pub async fn evaluate_centers(&self, centers: Vec<Center>, now: DateTime<Utc>) -> Vec<Center> {
        let mut qualified = Vec::new();

        for mut center in centers {
            let mut eligible_sessions = Vec::new();
            let mut center_qualifies = false;

            let raw_sessions = std::mem::take(&mut center.sessions);
            let sessions = merge_duplicate_slots(&center, raw_sessions);
            for session in sessions {
                let key = SlotKey::new(&center, &session);
                let eligible = self.config.eligibility.is_eligible(&session);

                let decision = self
                    .tracker
                    .observe(
                        &key,
                        session.capacity(),
                        eligible,
                        now,
                        self.config.publish_interval,
                    )
                    .await;

                center_qualifies |= decision.qualifies();
                if eligible {
                    eligible_sessions.push(session);
                }
            }

            if center_qualifies {
                center.sessions = eligible_sessions;
                qualified.push(center);
            }
        }

        qualified
    }

    /// Hand qualified centers to the sink and record what was delivered.
    ///
    /// Each center is stamped with the time its delivery finished, measured
    /// from `now`. Returns the number of centers delivered to at least one
    /// channel.
    pub async fn publish_qualified(&self, centers: &[Center], now: DateTime<Utc>) -> usize {
        let started = Instant::now();
        let mut published = 0;

        for (index, center) in centers.iter().enumerate() {
            let report = self
                .notification_sink
                .publish_center(index + 1, center, &self.city.channels)
                .await;
            let delivered_at =
                now + chrono::Duration::from_std(started.elapsed())
                    .unwrap_or_else(|_| chrono::Duration::zero());

            for _ in 0..report.failed_channels {
                self.stats.add_failed_delivery();
            }

            if report.delivered.is_empty() {
                continue;
            }

            published += 1;
            self.stats.record_publish(delivered_at);

            for key in &report.delivered {
                if let Err(e) = self.tracker.record_publish(key, delivered_at).await {
                    error!("Internal error recording publish: {}", e);
                    self.stats.add_internal_failure();
                }
            }
        }

        published
    }
}

/// Run `cycle` forever, sleeping `cadence` after each one completes
async fn run_paced<F, Fut>(cadence: Duration, mut cycle: F)
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut count: u64 = 0;
    loop {
        cycle(count).await;
        count += 1;
        sleep(cadence).await;
    }
}

/// Collapse sessions of one center that share a slot key, keeping the larger capacity
fn merge_duplicate_slots(center: &Center, sessions: Vec<Session>) -> Vec<Session> {
    let mut merged: Vec<Session> = Vec::with_capacity(sessions.len());
    let mut positions: HashMap<SlotKey, usize> = HashMap::new();

    for session in sessions {
        let key = SlotKey::new(center, &session);
        match positions.get(&key) {
            Some(&position) => {
                warn!("Duplicate slot {} in one response, keeping larger capacity", key);
                if session.capacity() > merged[position].capacity() {
                    merged[position] = session;
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(session);
            }
        }
    }

    merged
}

/// Periodically sends a statistics snapshot to a chat
pub struct StatsReporter {
    chat_id: String,
    report_interval: Duration,
    tracker: Arc<TrackerStore>,
    stats: Arc<TrackerStats>,
    notification_sink: Arc<dyn NotificationSink>,
}

impl StatsReporter {
    /// Report to `chat_id` every `report_interval`
    pub fn new(
        chat_id: String,
        report_interval: Duration,
        tracker: Arc<TrackerStore>,
        stats: Arc<TrackerStats>,
        notification_sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            chat_id,
            report_interval,
            tracker,
            stats,
            notification_sink,
        }
    }

    /// Report forever
    pub async fn start(&self) {
        let mut ticker = interval(self.report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.report_once().await {
                error!("Failed to send stats report: {}", e);
            }
        }
    }

    /// Send one snapshot now
    pub async fn report_once(&self) -> Result<(), NotificationError> {
        let snapshot = self.stats.snapshot(self.tracker.len().await);
        self.notification_sink
            .publish_stats(&self.chat_id, &snapshot)
            .await
    }
}
