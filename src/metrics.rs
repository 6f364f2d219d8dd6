//! # Metrics
//! `MetricsSink` is what the aggregator reports to. `PrometheusSink` forwards
//! to the `metrics` facade (rendered by `metrics-exporter-prometheus` on
//! `/metrics`); `RecordingSink` keeps the latest values in memory.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use metrics_util::MetricKindMask;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::info;

use crate::analyze::{Classification, Signal, TopicWeight};
use crate::chat::ChatId;

/// Gauge updates are delivered while the aggregator holds its state lock:
/// implementations must be quick, must not block on I/O, and must not call
/// back into the aggregator.
pub trait MetricsSink: Send + Sync {
    fn message_processed(&self, chat: ChatId);
    fn alert_sent(&self, chat: ChatId);
    fn summary_sent(&self, chat: ChatId);
    fn analysis_failed(&self, chat: ChatId, signal: Signal);
    /// Full replacement of the tracked entity set, not a delta.
    fn entities(&self, chat: ChatId, ranked: &[(String, u64)]);
    fn emotion(&self, chat: ChatId, reading: &Classification);
    fn sentiment(&self, chat: ChatId, reading: &Classification);
    fn topics(&self, chat: ChatId, topics: &[TopicWeight]);
}

/// One-time metric descriptions (so series carry HELP text on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("chatwatch_messages_total", "Total number of messages processed.");
        describe_counter!("chatwatch_alerts_total", "Total number of alerts delivered.");
        describe_counter!(
            "chatwatch_summaries_total",
            "Total number of window summaries delivered."
        );
        describe_counter!(
            "chatwatch_analysis_failures_total",
            "Analysis steps that failed, by signal."
        );
        describe_gauge!(
            "chatwatch_entity_frequency",
            "Observed count of each currently tracked entity."
        );
        describe_gauge!(
            "chatwatch_emotion_score",
            "Confidence of the most recent emotion label."
        );
        describe_gauge!(
            "chatwatch_sentiment_score",
            "Confidence of the most recent sentiment label."
        );
        describe_gauge!(
            "chatwatch_topic_weight",
            "Weight of each topic in the most recent message."
        );
    });
}

/// Publishes through the global `metrics` recorder.
///
/// Label-per-value gauges (entity, emotion, sentiment, topic) are rewritten on
/// every update: values that dropped out of the latest reading are zeroed, and
/// the exporter's gauge idle timeout removes them from the exposition.
#[derive(Debug, Default)]
pub struct PrometheusSink {
    published: Mutex<HashMap<(ChatId, &'static str), HashSet<String>>>,
}

impl PrometheusSink {
    pub fn new() -> Self {
        ensure_metrics_described();
        Self::default()
    }

    /// Set `name{chat_id, <label>=value}` for every pair and zero the labels
    /// published last time but absent now.
    fn rewrite(&self, chat: ChatId, name: &'static str, label: &'static str, values: &[(String, f64)]) {
        let current: HashSet<String> = values.iter().map(|(v, _)| v.clone()).collect();
        let stale: Vec<String> = {
            let mut published = self.published.lock();
            let prev = published.entry((chat, name)).or_default();
            let stale = prev.difference(&current).cloned().collect();
            *prev = current;
            stale
        };

        let chat_label = chat.to_string();
        for v in stale {
            gauge!(name, "chat_id" => chat_label.clone(), label => v).set(0.0);
        }
        for (v, x) in values {
            gauge!(name, "chat_id" => chat_label.clone(), label => v.clone()).set(*x);
        }
    }
}

impl MetricsSink for PrometheusSink {
    fn message_processed(&self, chat: ChatId) {
        counter!("chatwatch_messages_total", "chat_id" => chat.to_string()).increment(1);
    }

    fn alert_sent(&self, chat: ChatId) {
        counter!("chatwatch_alerts_total", "chat_id" => chat.to_string()).increment(1);
    }

    fn summary_sent(&self, chat: ChatId) {
        counter!("chatwatch_summaries_total", "chat_id" => chat.to_string()).increment(1);
    }

    fn analysis_failed(&self, chat: ChatId, signal: Signal) {
        counter!(
            "chatwatch_analysis_failures_total",
            "chat_id" => chat.to_string(),
            "signal" => signal.as_str()
        )
        .increment(1);
    }

    fn entities(&self, chat: ChatId, ranked: &[(String, u64)]) {
        let values: Vec<(String, f64)> = ranked.iter().map(|(e, c)| (e.clone(), *c as f64)).collect();
        self.rewrite(chat, "chatwatch_entity_frequency", "entity", &values);
    }

    fn emotion(&self, chat: ChatId, reading: &Classification) {
        let values = [(reading.label.clone(), reading.score as f64)];
        self.rewrite(chat, "chatwatch_emotion_score", "emotion", &values);
    }

    fn sentiment(&self, chat: ChatId, reading: &Classification) {
        let values = [(reading.label.clone(), reading.score as f64)];
        self.rewrite(chat, "chatwatch_sentiment_score", "sentiment", &values);
    }

    fn topics(&self, chat: ChatId, topics: &[TopicWeight]) {
        let values: Vec<(String, f64)> = topics.iter().map(|t| (t.topic.clone(), t.weight as f64)).collect();
        self.rewrite(chat, "chatwatch_topic_weight", "topic", &values);
    }
}

/// Latest values per chat, for tests and embedding.
#[derive(Debug, Default)]
pub struct RecordingSink {
    inner: Mutex<Recorded>,
}

#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub messages: HashMap<ChatId, u64>,
    pub alerts: HashMap<ChatId, u64>,
    pub summaries: HashMap<ChatId, u64>,
    pub failures: HashMap<(ChatId, Signal), u64>,
    pub entities: HashMap<ChatId, Vec<(String, u64)>>,
    pub entity_updates: HashMap<ChatId, u64>,
    pub emotion: HashMap<ChatId, Classification>,
    pub sentiment: HashMap<ChatId, Classification>,
    pub topics: HashMap<ChatId, Vec<TopicWeight>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Recorded {
        self.inner.lock().clone()
    }

    pub fn messages(&self, chat: ChatId) -> u64 {
        self.inner.lock().messages.get(&chat).copied().unwrap_or(0)
    }

    pub fn alerts(&self, chat: ChatId) -> u64 {
        self.inner.lock().alerts.get(&chat).copied().unwrap_or(0)
    }
}

impl MetricsSink for RecordingSink {
    fn message_processed(&self, chat: ChatId) {
        *self.inner.lock().messages.entry(chat).or_default() += 1;
    }

    fn alert_sent(&self, chat: ChatId) {
        *self.inner.lock().alerts.entry(chat).or_default() += 1;
    }

    fn summary_sent(&self, chat: ChatId) {
        *self.inner.lock().summaries.entry(chat).or_default() += 1;
    }

    fn analysis_failed(&self, chat: ChatId, signal: Signal) {
        *self.inner.lock().failures.entry((chat, signal)).or_default() += 1;
    }

    fn entities(&self, chat: ChatId, ranked: &[(String, u64)]) {
        let mut g = self.inner.lock();
        g.entities.insert(chat, ranked.to_vec());
        *g.entity_updates.entry(chat).or_default() += 1;
    }

    fn emotion(&self, chat: ChatId, reading: &Classification) {
        self.inner.lock().emotion.insert(chat, reading.clone());
    }

    fn sentiment(&self, chat: ChatId, reading: &Classification) {
        self.inner.lock().sentiment.insert(chat, reading.clone());
    }

    fn topics(&self, chat: ChatId, topics: &[TopicWeight]) {
        self.inner.lock().topics.insert(chat, topics.to_vec());
    }
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Gauges not touched for
    /// `gauge_idle` are dropped from the exposition.
    pub fn init(gauge_idle: Option<Duration>) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .idle_timeout(MetricKindMask::GAUGE, gauge_idle)
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` (Prometheus text format) and `/health`.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route(
                "/metrics",
                get(move || {
                    let h = handle.clone();
                    async move { h.render() }
                }),
            )
    }

    pub async fn serve(&self, port: u16) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind metrics endpoint on {addr}"))?;
        info!(%addr, "metrics endpoint listening");
        axum::serve(listener, self.router())
            .await
            .context("metrics server")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prometheus_sink_zeroes_evicted_entities() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let sink = PrometheusSink::default();
        let chat = ChatId(7);

        metrics::with_local_recorder(&recorder, || {
            sink.message_processed(chat);
            sink.entities(chat, &[("Paris".into(), 1), ("Oslo".into(), 1)]);
            sink.entities(chat, &[("Oslo".into(), 2), ("Rome".into(), 1)]);
        });

        let out = handle.render();
        assert!(out.contains(r#"chatwatch_messages_total{chat_id="7"} 1"#), "{out}");
        assert!(out.contains(r#"entity="Paris"} 0"#), "{out}");
        assert!(out.contains(r#"entity="Oslo"} 2"#), "{out}");
        assert!(out.contains(r#"entity="Rome"} 1"#), "{out}");
    }

    #[test]
    fn recording_sink_replaces_entities() {
        let sink = RecordingSink::new();
        let chat = ChatId(1);
        sink.entities(chat, &[("a".into(), 3)]);
        sink.entities(chat, &[("b".into(), 1)]);
        let snap = sink.snapshot();
        assert_eq!(snap.entities[&chat], vec![("b".to_string(), 1)]);
        assert_eq!(snap.entity_updates[&chat], 2);
    }
}
