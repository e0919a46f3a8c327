use serde::{Deserialize, Serialize};

/// Response body of the CoWIN `calendarByDistrict` endpoint
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CentersResponse {
    /// Vaccination centers in the requested district
    #[serde(default)]
    pub centers: Vec<Center>,
}

/// A vaccination center together with the sessions it offers
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Center {
    /// Upstream center identifier
    pub center_id: i64,

    /// Display name of the center
    pub name: String,

    /// Street address
    #[serde(default)]
    pub address: String,

    /// State the center belongs to
    #[serde(default)]
    pub state_name: String,

    /// District the center belongs to
    #[serde(default)]
    pub district_name: String,

    /// Block (sub-district) name
    #[serde(default)]
    pub block_name: String,

    /// Postal code
    pub pincode: i64,

    /// Opening time
    #[serde(default)]
    pub from: String,

    /// Closing time
    #[serde(default)]
    pub to: String,

    /// "Free" or "Paid"
    #[serde(default)]
    pub fee_type: String,

    /// Sessions offered by this center, one per date/vaccine/age bracket
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// A single session (date, vaccine, age bracket) at a center
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Session {
    /// Upstream session identifier
    #[serde(default)]
    pub session_id: String,

    /// Session date in `D-MM-YYYY` form, as sent by the upstream API
    pub date: String,

    /// Total available capacity
    pub available_capacity: i64,

    /// Capacity reserved for first doses, when the upstream reports it
    #[serde(default)]
    pub available_capacity_dose1: Option<i64>,

    /// Capacity reserved for second doses, when the upstream reports it
    #[serde(default)]
    pub available_capacity_dose2: Option<i64>,

    /// Minimum age eligible for this session
    pub min_age_limit: u32,

    /// Vaccine name, e.g. COVISHIELD
    pub vaccine: String,

    /// Time slots offered during the day
    #[serde(default)]
    pub slots: Vec<String>,
}

impl Session {
    /// Total capacity with negative upstream values treated as zero
    pub fn capacity(&self) -> u32 {
        clamp_capacity(self.available_capacity)
    }

    /// Dose-1/dose-2 capacities, if the upstream sent any breakdown
    pub fn dose_capacities(&self) -> Option<(u32, u32)> {
        match (self.available_capacity_dose1, self.available_capacity_dose2) {
            (None, None) => None,
            (dose1, dose2) => Some((
                clamp_capacity(dose1.unwrap_or(0)),
                clamp_capacity(dose2.unwrap_or(0)),
            )),
        }
    }
}

fn clamp_capacity(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

/// Custom error type for slot tracking operations
#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    /// Upstream responded with a non-success status
    #[error("API error: {0}")]
    ApiError(String),

    /// Rate limited by external API
    #[error("Rate limited by external API")]
    RateLimited,

    /// Upstream refused the request
    #[error("Authentication failed with external service")]
    AuthenticationFailed,

    /// Data format error
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// A slot that was just published has no tracker entry
    #[error("No tracker entry for slot {0}")]
    MissingEntry(String),
}
