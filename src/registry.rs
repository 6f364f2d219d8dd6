//! One aggregator per monitored chat, looked up by chat id.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::aggregator::{AggregatorConfig, WindowedMetricsAggregator};
use crate::analyze::TextAnalyzer;
use crate::chat::{ChatId, ChatIdentity};
use crate::metrics::MetricsSink;

#[derive(Default, Clone)]
pub struct MonitorRegistry {
    chats: BTreeMap<ChatId, Arc<WindowedMetricsAggregator>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one aggregator per identity, all sharing the analyzer and sink.
    /// A repeated chat id replaces the earlier entry.
    pub fn build(
        identities: &[ChatIdentity],
        config: &AggregatorConfig,
        analyzer: Arc<TextAnalyzer>,
        sink: Arc<dyn MetricsSink>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let mut reg = Self::new();
        for id in identities {
            reg.insert(Arc::new(WindowedMetricsAggregator::new(
                *id,
                config.clone(),
                analyzer.clone(),
                sink.clone(),
                started_at,
            )));
        }
        reg
    }

    pub fn insert(&mut self, agg: Arc<WindowedMetricsAggregator>) -> Option<Arc<WindowedMetricsAggregator>> {
        self.chats.insert(agg.identity().chat_id(), agg)
    }

    pub fn get(&self, chat: ChatId) -> Option<Arc<WindowedMetricsAggregator>> {
        self.chats.get(&chat).cloned()
    }

    pub fn contains(&self, chat: ChatId) -> bool {
        self.chats.contains_key(&chat)
    }

    pub fn chat_ids(&self) -> Vec<ChatId> {
        self.chats.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WindowedMetricsAggregator>> {
        self.chats.values()
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }
}
