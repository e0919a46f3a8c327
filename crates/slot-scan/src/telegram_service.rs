use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{ChatService, NotificationError};

/// Telegram Bot API chat service
pub struct TelegramBot {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramBot {
    /// Create a bot client for `token` against the API rooted at `base_url`
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, NotificationError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(NotificationError::Config(
                "Telegram token must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotificationError::Network(format!("Failed to create HTTP client: {}", e)))?;

        info!("Telegram bot client initialized");

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl ChatService for TelegramBot {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<String, NotificationError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "MarkdownV2",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotificationError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body: SendMessageResponse = response.json().await.map_err(|e| {
            NotificationError::Telegram(format!("HTTP {} with unreadable body: {}", status, e.without_url()))
        })?;

        match (body.ok, body.result) {
            (true, Some(sent)) => {
                debug!("Message {} delivered to chat {}", sent.message_id, chat_id);
                Ok(sent.message_id.to_string())
            }
            _ => {
                let reason = body
                    .description
                    .unwrap_or_else(|| format!("HTTP {}", status));
                warn!("Telegram rejected message for chat {}: {}", chat_id, reason);
                Err(NotificationError::Telegram(reason))
            }
        }
    }
}

/// Chat service that only logs, for running without a bot
pub struct MockChatService;

#[async_trait]
impl ChatService for MockChatService {
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<String, NotificationError> {
        info!("💬 [MOCK CHAT] To: {}", chat_id);
        info!("💬 [MOCK CHAT] Message: {}", text);

        Ok(format!("mock-{}", chat_id))
    }
}
