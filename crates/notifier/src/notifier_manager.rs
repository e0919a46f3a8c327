use std::sync::Arc;

use slot_scan::{
    CityPoller, CowinClient, EligibilityFilter, FleetConfig, NotificationSink, NotifierConfig,
    PollerConfig, StatsReporter, StatsSnapshot, TrackerError, TrackerStats, TrackerStore,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Owns the background city pollers and the stats reporter
pub struct NotifierManager {
    tracker: Arc<TrackerStore>,
    stats: Arc<TrackerStats>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl NotifierManager {
    /// Create a manager around shared tracker state
    pub fn new(tracker: Arc<TrackerStore>, stats: Arc<TrackerStats>) -> Self {
        Self {
            tracker,
            stats,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one poller per city, plus the reporter when a stats chat is configured
    pub async fn start(
        &self,
        fleet: &FleetConfig,
        config: &NotifierConfig,
        notification_sink: Arc<dyn NotificationSink>,
    ) -> Result<(), TrackerError> {
        info!("Starting {} city pollers", fleet.cities.len());
        let mut handles = self.handles.lock().await;

        let cowin_client = Arc::new(CowinClient::new(config.cowin_base_url.as_str())?);
        let poller_config = PollerConfig {
            polling_interval: config.polling_interval,
            publish_interval: config.publish_interval,
            eligibility: EligibilityFilter::new(config.min_age_limit),
            ..PollerConfig::default()
        };

        for city in &fleet.cities {
            if city.channels.is_empty() {
                warn!("City {} has no channels; slots will be tracked but not announced", city.name);
            }

            let poller = Arc::new(CityPoller::new(
                city.clone(),
                cowin_client.clone(),
                self.tracker.clone(),
                self.stats.clone(),
                notification_sink.clone(),
                Some(poller_config.clone()),
            ));

            handles.push(tokio::spawn(poller.run_supervised()));
        }

        match &config.stats_chat_id {
            Some(chat_id) => {
                let reporter = StatsReporter::new(
                    chat_id.clone(),
                    config.stats_interval,
                    self.tracker.clone(),
                    self.stats.clone(),
                    notification_sink,
                );
                handles.push(tokio::spawn(async move { reporter.start().await }));
            }
            None => warn!("TELEGRAM_STATS_GROUP not set, stats reporting disabled"),
        }

        info!("Notifier started with {} background tasks", handles.len());
        Ok(())
    }

    /// Abort every background task and wait for them to wind down
    pub async fn stop(&self) {
        info!("Stopping notifier");

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }

        info!("Notifier stopped");
    }

    /// Current statistics
    pub async fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.tracker.len().await)
    }
}

impl Drop for NotifierManager {
    fn drop(&mut self) {
        for handle in self.handles.get_mut().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slot_scan::{ChannelNotifier, MockChatService};

    const FLEET: &str = r#"
cities:
  - name: Bangalore
    districtId: [294]
    channels:
      - channelName: blr
        chatId: "-1"
  - name: Pune
    districtId: [363]
"#;

    fn config(stats_chat: Option<&str>) -> NotifierConfig {
        let mut vars = vec![
            ("DRY_RUN", "true"),
            ("COWIN_BASE_URL", "http://127.0.0.1:9"),
            ("POLLING_INTERVAL_SECS", "3600"),
        ];
        if let Some(chat) = stats_chat {
            vars.push(("TELEGRAM_STATS_GROUP", chat));
        }
        NotifierConfig::from_lookup(|name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        })
        .unwrap()
    }

    async fn running_tasks(manager: &NotifierManager) -> usize {
        manager
            .handles
            .lock()
            .await
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    #[tokio::test]
    async fn test_start_spawns_one_task_per_city_and_reporter() {
        let fleet = FleetConfig::from_yaml_str(FLEET).unwrap();
        let manager = NotifierManager::new(
            Arc::new(TrackerStore::new()),
            Arc::new(TrackerStats::new(chrono::Utc::now())),
        );
        let sink: Arc<dyn NotificationSink> =
            Arc::new(ChannelNotifier::new(Arc::new(MockChatService)));

        manager.start(&fleet, &config(Some("-42")), sink).await.unwrap();
        assert_eq!(running_tasks(&manager).await, 3);

        manager.stop().await;
        assert_eq!(running_tasks(&manager).await, 0);
    }

    #[tokio::test]
    async fn test_reporter_is_skipped_without_stats_chat() {
        let fleet = FleetConfig::from_yaml_str(FLEET).unwrap();
        let manager = NotifierManager::new(
            Arc::new(TrackerStore::new()),
            Arc::new(TrackerStats::new(chrono::Utc::now())),
        );
        let sink: Arc<dyn NotificationSink> =
            Arc::new(ChannelNotifier::new(Arc::new(MockChatService)));

        manager.start(&fleet, &config(None), sink).await.unwrap();
        assert_eq!(running_tasks(&manager).await, 2);
        assert_eq!(manager.get_stats().await.tracked_slots, 0);

        manager.stop().await;
    }
}
