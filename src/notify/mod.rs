// src/notify/mod.rs
//! Outbound delivery of alerts and window summaries.

pub mod log;
pub mod telegram;

use async_trait::async_trait;

use crate::chat::ChatId;

pub use self::log::LogNotifier;
pub use self::telegram::TelegramNotifier;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform rejected message (HTTP {status}): {description}")]
    Rejected { status: u16, description: String },
}

/// Plain-text send to a chat. Implementations report failure instead of
/// retrying forever; the caller logs it and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat: ChatId, text: &str) -> Result<(), DeliveryError>;
    fn name(&self) -> &'static str;
}
