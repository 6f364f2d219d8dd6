use async_trait::async_trait;
use parking_lot::Mutex;

use super::{DeliveryError, Notifier};
use crate::chat::ChatId;

/// Writes messages to the log instead of the platform. Keeps a copy of each
/// send so callers can inspect what would have gone out.
#[derive(Debug, Default)]
pub struct LogNotifier {
    sent: Mutex<Vec<(ChatId, String)>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, chat: ChatId, text: &str) -> Result<(), DeliveryError> {
        tracing::info!(target: "notify", chat_id = %chat, "{text}");
        self.sent.lock().push((chat, text.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
