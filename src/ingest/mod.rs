// src/ingest/mod.rs
//! Inbound message events and the loop that routes them to aggregators.

pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::chat::ChatId;
use crate::registry::MonitorRegistry;

pub use telegram::TelegramPoller;

/// Delay before polling again after a source error.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageEvent {
    pub chat_id: ChatId,
    /// Absent for stickers, photos without caption, service messages.
    pub text: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl MessageEvent {
    pub fn new(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: Some(text.into()),
            received_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait MessageSource: Send {
    /// Next batch of events. `Ok(None)` means the source is finished.
    async fn poll(&mut self) -> anyhow::Result<Option<Vec<MessageEvent>>>;
    fn name(&self) -> &'static str;
}

/// Events pushed through a tokio channel; finishes when every sender is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<MessageEvent>,
}

impl ChannelSource {
    pub fn new(buffer: usize) -> (mpsc::Sender<MessageEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn poll(&mut self) -> anyhow::Result<Option<Vec<MessageEvent>>> {
        let Some(first) = self.rx.recv().await else {
            return Ok(None);
        };
        let mut batch = vec![first];
        while let Ok(ev) = self.rx.try_recv() {
            batch.push(ev);
        }
        Ok(Some(batch))
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Poll `source` until it finishes, recording every event in its chat's
/// aggregator. Each message is handled in its own task so slow analysis never
/// holds up polling. Returns once the source is finished and all in-flight
/// messages are recorded.
pub async fn run_ingest<S: MessageSource>(mut source: S, registry: Arc<MonitorRegistry>) {
    let mut inflight = JoinSet::new();

    loop {
        match source.poll().await {
            Ok(Some(batch)) => {
                for ev in batch {
                    let Some(agg) = registry.get(ev.chat_id) else {
                        debug!(chat_id = %ev.chat_id, "message from unmonitored chat ignored");
                        continue;
                    };
                    let text = ev.text.unwrap_or_default();
                    inflight.spawn(async move { agg.record_message(&text).await });
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(source = source.name(), error = %format!("{e:#}"), "poll failed");
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
            }
        }

        while let Some(done) = inflight.try_join_next() {
            if let Err(e) = done {
                warn!(error = %e, "message task failed");
            }
        }
    }

    while let Some(done) = inflight.join_next().await {
        if let Err(e) = done {
            warn!(error = %e, "message task failed");
        }
    }
}
