use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;
use validator::Validate;

use crate::eligibility::DEFAULT_MIN_AGE_LIMIT;
use crate::slot_types::TrackerError;

/// Default CoWIN public API root
pub const DEFAULT_COWIN_BASE_URL: &str = "https://cdn-api.co-vin.in/api";

/// Default Telegram Bot API root
pub const DEFAULT_TELEGRAM_BASE_URL: &str = "https://api.telegram.org";

/// Process settings read from the environment
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Telegram bot token (required unless `dry_run`)
    pub telegram_token: String,

    /// Log messages instead of sending them (default: false)
    pub dry_run: bool,

    /// Chat receiving periodic statistics; reporting is off when unset
    pub stats_chat_id: Option<String>,

    /// YAML file describing the monitored cities (default: config.yaml)
    pub config_file: PathBuf,

    /// Polling cadence for cities without their own (default: 60 seconds)
    pub polling_interval: Duration,

    /// Minimum spacing between notifications of an unchanged slot (default: 12 hours)
    pub publish_interval: chrono::Duration,

    /// How often statistics are reported (default: 5 minutes)
    pub stats_interval: Duration,

    /// Age bracket the eligibility filter accepts (default: 18)
    pub min_age_limit: u32,

    /// Upstream API root
    pub cowin_base_url: String,

    /// Telegram API root
    pub telegram_base_url: String,

    /// Address of the status HTTP server (default: 0.0.0.0:8080)
    pub bind_address: String,
}

impl NotifierConfig {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, TrackerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable if set
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TrackerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dry_run = match lookup("DRY_RUN").as_deref().map(str::trim) {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(other) => {
                return Err(TrackerError::ConfigError(format!(
                    "DRY_RUN must be true or false, got {:?}",
                    other
                )));
            }
        };

        let telegram_token = match lookup("TELEGRAM_TOKEN").filter(|token| !token.trim().is_empty()) {
            Some(token) => token,
            None if dry_run => String::new(),
            None => {
                return Err(TrackerError::ConfigError(
                    "TELEGRAM_TOKEN environment variable not set".to_string(),
                ));
            }
        };

        let polling_secs = parse_number(&lookup, "POLLING_INTERVAL_SECS", 60)?;
        let publish_minutes = parse_number(&lookup, "PUBLISH_INTERVAL_MINUTES", 12 * 60)?;
        let stats_secs = parse_number(&lookup, "STATS_INTERVAL_SECS", 5 * 60)?;
        let min_age_limit = parse_number(&lookup, "MIN_AGE_LIMIT", DEFAULT_MIN_AGE_LIMIT as u64)?;

        if polling_secs == 0 || stats_secs == 0 {
            return Err(TrackerError::ConfigError(
                "polling and stats intervals must be positive".to_string(),
            ));
        }

        let publish_interval = i64::try_from(publish_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .ok_or_else(|| {
                TrackerError::ConfigError(format!(
                    "PUBLISH_INTERVAL_MINUTES out of range: {}",
                    publish_minutes
                ))
            })?;

        let min_age_limit = u32::try_from(min_age_limit).map_err(|_| {
            TrackerError::ConfigError(format!("MIN_AGE_LIMIT out of range: {}", min_age_limit))
        })?;

        Ok(Self {
            telegram_token,
            dry_run,
            stats_chat_id: lookup("TELEGRAM_STATS_GROUP").filter(|id| !id.trim().is_empty()),
            config_file: lookup("CONFIG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.yaml")),
            polling_interval: Duration::from_secs(polling_secs),
            publish_interval,
            stats_interval: Duration::from_secs(stats_secs),
            min_age_limit,
            cowin_base_url: lookup("COWIN_BASE_URL")
                .unwrap_or_else(|| DEFAULT_COWIN_BASE_URL.to_string()),
            telegram_base_url: lookup("TELEGRAM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_BASE_URL.to_string()),
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        })
    }
}

fn parse_number<F>(lookup: &F, name: &str, default: u64) -> Result<u64, TrackerError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            TrackerError::ConfigError(format!("{} must be a non-negative integer, got {:?}", name, raw))
        }),
        None => Ok(default),
    }
}

/// Monitored cities, loaded once at startup
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FleetConfig {
    /// Cities to poll, one worker each
    #[validate(length(min = 1, message = "At least one city is required"))]
    #[validate(nested)]
    pub cities: Vec<City>,
}

/// A monitored city and the channels interested in it
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct City {
    /// Display name
    #[validate(length(min = 1, message = "City name is required"))]
    pub name: String,

    /// Upstream district ids polled for this city
    #[validate(length(min = 1, message = "At least one district id is required"))]
    pub district_id: Vec<u32>,

    /// Polling cadence override in seconds
    #[serde(default)]
    #[validate(range(min = 1, message = "Polling interval must be positive"))]
    pub polling_interval: Option<u64>,

    /// Destinations for this city's notifications
    #[serde(default)]
    #[validate(nested)]
    pub channels: Vec<Channel>,
}

impl City {
    /// Cadence for this city, falling back to `default`
    pub fn polling_interval_or(&self, default: Duration) -> Duration {
        self.polling_interval
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

/// A chat destination and the age brackets it subscribes to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Human-readable channel name
    #[serde(default)]
    pub channel_name: String,

    /// Telegram chat id
    #[serde(deserialize_with = "string_or_number")]
    #[validate(length(min = 1, message = "Chat id is required"))]
    pub chat_id: String,

    /// Age brackets this channel wants; empty means all
    #[serde(default)]
    pub min_age: Vec<u32>,
}

impl Channel {
    /// True when sessions for `min_age_limit` should go to this channel
    pub fn accepts_age(&self, min_age_limit: u32) -> bool {
        self.min_age.is_empty() || self.min_age.contains(&min_age_limit)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

impl FleetConfig {
    /// Parse and validate a fleet description
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TrackerError> {
        let config: FleetConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TrackerError::ConfigError(format!("Invalid fleet config: {}", e)))?;

        config
            .validate()
            .map_err(|e| TrackerError::ConfigError(e.to_string()))?;

        Ok(config)
    }

    /// Read, parse and validate the fleet file at `path`
    pub fn load(path: &Path) -> Result<Self, TrackerError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            TrackerError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let config = Self::from_yaml_str(&yaml)
            .map_err(|e| TrackerError::ConfigError(format!("In file {}: {}", path.display(), e)))?;

        info!(
            "Loaded {} cities from {}",
            config.cities.len(),
            path.display()
        );
        Ok(config)
    }
}
