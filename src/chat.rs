//! Chat identifiers: where messages come from and where alerts go.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform chat identifier (Telegram ids are signed 64-bit integers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChatId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(ChatId)
    }
}

/// Source chat plus the chat that receives its alerts and summaries.
/// Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatIdentity {
    chat_id: ChatId,
    alert_chat_id: ChatId,
}

impl ChatIdentity {
    /// `alert_chat_id` falls back to `chat_id` when unset.
    pub fn new(chat_id: ChatId, alert_chat_id: Option<ChatId>) -> Self {
        Self {
            chat_id,
            alert_chat_id: alert_chat_id.unwrap_or(chat_id),
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn alert_chat_id(&self) -> ChatId {
        self.alert_chat_id
    }
}
