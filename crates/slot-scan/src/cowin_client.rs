use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use tracing::{debug, warn};

use crate::slot_types::{Center, CentersResponse, TrackerError};

/// Date format the calendar endpoints expect, e.g. `05-06-2021`
const QUERY_DATE_FORMAT: &str = "%d-%m-%Y";

/// Client for the CoWIN public appointment API
pub struct CowinClient {
    client: Client,
    base_url: String,
}

impl CowinClient {
    /// Create a new client rooted at `base_url` (e.g. `https://cdn-api.co-vin.in/api`)
    pub fn new(base_url: impl Into<String>) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_4) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.93 Safari/537.36")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TrackerError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Centers in `district_id` with sessions for the 7 days starting at `date`
    pub async fn get_centers_by_district(
        &self,
        district_id: u32,
        date: NaiveDate,
    ) -> Result<Vec<Center>, TrackerError> {
        let url = format!(
            "{}/v2/appointment/sessions/public/calendarByDistrict",
            self.base_url
        );
        let params = [
            ("district_id", district_id.to_string()),
            ("date", date.format(QUERY_DATE_FORMAT).to_string()),
        ];

        debug!("Fetching calendar for district {} from {}", district_id, date);

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| TrackerError::Network(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            warn!(
                "Calendar request for district {} failed with status {}: {}",
                district_id, status, body
            );

            return Err(match status.as_u16() {
                429 => TrackerError::RateLimited,
                401 | 403 => TrackerError::AuthenticationFailed,
                _ => TrackerError::ApiError(format!("HTTP {}", status)),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TrackerError::Network(format!("Failed to read response: {}", e)))?;

        let calendar: CentersResponse = serde_json::from_str(&body)
            .map_err(|e| TrackerError::DataFormat(format!("Failed to parse response: {}", e)))?;

        debug!(
            "District {} returned {} centers",
            district_id,
            calendar.centers.len()
        );

        Ok(calendar.centers)
    }
}
