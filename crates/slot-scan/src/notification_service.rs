use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::future::join_all;
use tracing::{error, info};

use crate::config::Channel;
use crate::executor::{DeliveryReport, NotificationError, NotificationSink};
use crate::slot_types::{Center, Session};
use crate::stats::StatsSnapshot;
use crate::tracker::{SESSION_DATE_FORMAT, SlotKey};

/// Booking site appended to every availability message
pub const BOOKING_URL: &str = "https://selfregistration.cowin.gov.in";

/// Trait for chat service implementations
#[async_trait::async_trait]
pub trait ChatService: Send + Sync {
    /// Send `text` (MarkdownV2) to `chat_id`, returning the provider's message id
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<String, NotificationError>;
}

/// Publishes availability to chat channels, honoring each channel's age filter
pub struct ChannelNotifier {
    chat_service: Arc<dyn ChatService>,
}

impl ChannelNotifier {
    /// Deliver through `chat_service`
    pub fn new(chat_service: Arc<dyn ChatService>) -> Self {
        Self { chat_service }
    }
}

#[async_trait::async_trait]
impl NotificationSink for ChannelNotifier {
    async fn publish_center(
        &self,
        position: usize,
        center: &Center,
        channels: &[Channel],
    ) -> DeliveryReport {
        let deliveries = channels.iter().filter_map(|channel| {
            let sessions: Vec<&Session> = center
                .sessions
                .iter()
                .filter(|session| channel.accepts_age(session.min_age_limit))
                .collect();

            if sessions.is_empty() {
                return None;
            }

            let message = create_center_message(position, center, &sessions);
            let chat_service = self.chat_service.clone();

            Some(async move {
                let result = chat_service.send_message(&channel.chat_id, &message).await;
                (channel, sessions, result)
            })
        });

        let mut report = DeliveryReport::default();

        for (channel, sessions, result) in join_all(deliveries).await {
            match result {
                Ok(message_id) => {
                    info!(
                        "Published center {} to channel {} (message {})",
                        center.center_id, channel.channel_name, message_id
                    );
                    report.delivered_channels += 1;
                    for session in sessions {
                        let key = SlotKey::new(center, session);
                        if !report.delivered.contains(&key) {
                            report.delivered.push(key);
                        }
                    }
                }
                Err(e) => {
                    error!(
                        "Failed to publish center {} to channel {}: {}",
                        center.center_id, channel.channel_name, e
                    );
                    report.failed_channels += 1;
                }
            }
        }

        report
    }

    async fn publish_stats(
        &self,
        chat_id: &str,
        snapshot: &StatsSnapshot,
    ) -> Result<(), NotificationError> {
        let message = escape_markdown(&snapshot.to_string());
        self.chat_service.send_message(chat_id, &message).await?;
        Ok(())
    }
}

/// Create the MarkdownV2 message announcing `sessions` of `center`
pub fn create_center_message(position: usize, center: &Center, sessions: &[&Session]) -> String {
    let mut message = format!(
        "*{}\\.* *{}*, {}\n",
        position,
        escape_markdown(&center.name),
        center.pincode
    );

    for session in sessions {
        message.push_str(&create_session_line(session));
        message.push('\n');
    }

    message.push_str(&escape_markdown(BOOKING_URL));
    message
}

fn create_session_line(session: &Session) -> String {
    let doses = match session.dose_capacities() {
        Some((dose1, dose2)) => format!(" \\(Dose 1: {}, Dose 2: {}\\)", dose1, dose2),
        None => String::new(),
    };

    format!(
        "{}: *{}* slots {}{}",
        escape_markdown(&format_session_date(&session.date)),
        session.capacity(),
        escape_markdown(&session.vaccine),
        doses
    )
}

/// Render an upstream `D-MM-YYYY` date as `Jun 5, 2021`, or return it unchanged
pub fn format_session_date(date: &str) -> String {
    NaiveDate::parse_from_str(date, SESSION_DATE_FORMAT)
        .map(|parsed| parsed.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|_| date.to_string())
}

/// Escape every character Telegram's MarkdownV2 reserves
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|'
                | '{' | '}' | '.' | '!' | '\\'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
