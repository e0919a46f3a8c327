use chrono::{DateTime, Duration, Utc};

use crate::tracker::TrackedSlot;

/// Minimum spacing between two notifications of an unchanged slot (12 hours)
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::hours(12);

/// Why an observation was judged worth a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualifyReason {
    /// The slot has never been tracked
    FirstSighting,
    /// More doses than last time
    CapacityIncreased,
    /// Tracked but never announced
    NeverPublished,
    /// Last announcement is older than the publish interval
    Stale,
}

/// Outcome of the publish gate for one eligible observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Send a fresh notification
    Qualify(QualifyReason),
    /// Already announced recently at equal or lower capacity
    Suppress,
}

impl GateDecision {
    /// True for any `Qualify` outcome
    pub fn qualifies(&self) -> bool {
        matches!(self, GateDecision::Qualify(_))
    }
}

/// Decide whether an eligible observation of `capacity` at `now` warrants a notification
pub fn decide(
    entry: Option<&TrackedSlot>,
    capacity: u32,
    now: DateTime<Utc>,
    publish_interval: Duration,
) -> GateDecision {
    let Some(entry) = entry else {
        return GateDecision::Qualify(QualifyReason::FirstSighting);
    };

    if capacity > entry.last_known_capacity {
        return GateDecision::Qualify(QualifyReason::CapacityIncreased);
    }

    match entry.last_publish_time {
        None => GateDecision::Qualify(QualifyReason::NeverPublished),
        Some(published) if now - published > publish_interval => {
            GateDecision::Qualify(QualifyReason::Stale)
        }
        Some(_) => GateDecision::Suppress,
    }
}
