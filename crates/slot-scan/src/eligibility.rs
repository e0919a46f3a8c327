use crate::slot_types::Session;

/// Minimum age the fleet notifies for unless configured otherwise
pub const DEFAULT_MIN_AGE_LIMIT: u32 = 18;

/// Decides whether an observed session could ever be worth a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityFilter {
    min_age_limit: u32,
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_AGE_LIMIT)
    }
}

impl EligibilityFilter {
    /// Create a filter accepting sessions for exactly `min_age_limit`
    pub fn new(min_age_limit: u32) -> Self {
        Self { min_age_limit }
    }

    /// True when the session has open capacity for the configured age bracket.
    ///
    /// When the upstream reports a per-dose breakdown, at least one dose must
    /// have capacity as well.
    pub fn is_eligible(&self, session: &Session) -> bool {
        if session.capacity() == 0 {
            return false;
        }

        if let Some((dose1, dose2)) = session.dose_capacities() {
            if dose1 == 0 && dose2 == 0 {
                return false;
            }
        }

        session.min_age_limit == self.min_age_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(capacity: i64, doses: Option<(i64, i64)>, min_age: u32) -> Session {
        Session {
            session_id: String::new(),
            date: "10-06-2021".to_string(),
            available_capacity: capacity,
            available_capacity_dose1: doses.map(|d| d.0),
            available_capacity_dose2: doses.map(|d| d.1),
            min_age_limit: min_age,
            vaccine: "COVISHIELD".to_string(),
            slots: Vec::new(),
        }
    }

    #[test]
    fn test_open_capacity_for_threshold_is_eligible() {
        let filter = EligibilityFilter::default();
        assert!(filter.is_eligible(&session(5, None, 18)));
        assert!(filter.is_eligible(&session(5, Some((0, 5)), 18)));
        assert!(filter.is_eligible(&session(5, Some((5, 0)), 18)));
    }

    #[test]
    fn test_exhausted_sessions_are_not_eligible() {
        let filter = EligibilityFilter::default();
        assert!(!filter.is_eligible(&session(0, None, 18)));
        assert!(!filter.is_eligible(&session(-4, None, 18)));
        assert!(!filter.is_eligible(&session(3, Some((0, 0)), 18)));
    }

    #[test]
    fn test_other_age_brackets_are_not_eligible() {
        let filter = EligibilityFilter::default();
        assert!(!filter.is_eligible(&session(10, None, 45)));

        let seniors = EligibilityFilter::new(45);
        assert!(seniors.is_eligible(&session(10, None, 45)));
        assert!(!seniors.is_eligible(&session(10, None, 18)));
    }
}
