use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{DeliveryError, Notifier};
use crate::chat::ChatId;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_RETRIES: u8 = 3;
pub const MAX_RETRIES: u8 = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Sends through the Bot API `sendMessage` method.
///
/// Transport errors, 429 and 5xx are retried with exponential backoff up to
/// `max_retries` attempts; other 4xx answers fail immediately.
#[derive(Clone)]
pub struct TelegramNotifier {
    api_base: String,
    token: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff: Duration,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize, Default)]
struct ApiReply {
    #[serde(default)]
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(token: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            client: Client::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_RETRIES,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Total attempts per message, clamped to `1..=MAX_RETRIES`.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.clamp(1, MAX_RETRIES);
        self
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff = base;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }

    /// `backoff * 2^(attempt-1)`, saturating.
    fn backoff_for(&self, attempt: u8) -> Duration {
        let factor = 1u32
            .checked_shl(u32::from(attempt.saturating_sub(1)))
            .unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor)
    }

    async fn pause(&self, attempt: u8) {
        tokio::time::sleep(self.backoff_for(attempt)).await;
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat: ChatId, text: &str) -> Result<(), DeliveryError> {
        let payload = SendMessage {
            chat_id: chat.0,
            text,
            disable_web_page_preview: true,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(self.endpoint())
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) => {
                    let status = rsp.status();
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if retryable && attempt < self.max_retries {
                        tracing::debug!(%status, attempt, "sendMessage retry");
                        self.pause(attempt).await;
                        continue;
                    }
                    let reply: ApiReply = rsp.json().await.unwrap_or_default();
                    return Err(DeliveryError::Rejected {
                        status: status.as_u16(),
                        description: reply.description.unwrap_or_default(),
                    });
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tracing::debug!(error = %e, attempt, "sendMessage retry");
                        self.pause(attempt).await;
                        continue;
                    }
                    return Err(DeliveryError::Http(e));
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
