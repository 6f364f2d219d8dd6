// src/ingest/telegram.rs
//! Bot API long-polling source (`getUpdates`).
//!
//! Only `message` and `channel_post` updates are requested. A media caption
//! counts as the message text. The offset advances past every update seen,
//! including the ones without a usable message.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{MessageEvent, MessageSource};
use crate::chat::ChatId;
use crate::notify::telegram::DEFAULT_API_BASE;

pub struct TelegramPoller {
    api_base: String,
    token: String,
    client: Client,
    long_poll_secs: u64,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    channel_post: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    date: i64,
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

impl TelegramPoller {
    pub fn new(token: String) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            client: Client::new(),
            long_poll_secs: 25,
            offset: None,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// `0` turns long polling into short polling.
    pub fn with_long_poll(mut self, secs: u64) -> Self {
        self.long_poll_secs = secs;
        self
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    fn convert(update: Update) -> Option<MessageEvent> {
        let msg = update.message.or(update.channel_post)?;
        let received_at = Utc
            .timestamp_opt(msg.date, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Some(MessageEvent {
            chat_id: ChatId(msg.chat.id),
            text: msg.text.or(msg.caption),
            received_at,
        })
    }
}

#[async_trait]
impl MessageSource for TelegramPoller {
    async fn poll(&mut self) -> Result<Option<Vec<MessageEvent>>> {
        let mut query = vec![
            ("timeout", self.long_poll_secs.to_string()),
            (
                "allowed_updates",
                r#"["message","channel_post"]"#.to_string(),
            ),
        ];
        if let Some(off) = self.offset {
            query.push(("offset", off.to_string()));
        }

        let reply: Reply = self
            .client
            .get(format!("{}/bot{}/getUpdates", self.api_base, self.token))
            .query(&query)
            .timeout(Duration::from_secs(self.long_poll_secs + 10))
            .send()
            .await
            .context("getUpdates request")?
            .json()
            .await
            .context("getUpdates body")?;

        if !reply.ok {
            bail!(
                "getUpdates refused: {}",
                reply.description.unwrap_or_default()
            );
        }

        if let Some(last) = reply.result.iter().map(|u| u.update_id).max() {
            self.offset = Some(last + 1);
        }
        Ok(Some(
            reply.result.into_iter().filter_map(Self::convert).collect(),
        ))
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
