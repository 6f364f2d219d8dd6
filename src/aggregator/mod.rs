//! # Windowed metrics aggregator
//! Per-chat rolling state: a message counter evaluated on every tick (alert
//! window), a top-K entity table summarized on its own clock (summary window),
//! and the most recent emotion / sentiment / topic readings.
//!
//! `record_message` and `on_tick` may run concurrently. The state mutex is
//! only held for short read-modify-write sections and never across analysis
//! awaits, so slow inference cannot hold up the tick, and the tick cannot
//! reset counters in the middle of a merge.

pub mod policy;
pub mod tracker;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analyze::{AnalysisError, Classification, Signal, TextAnalyzer, TopicWeight};
use crate::chat::{ChatId, ChatIdentity};
use crate::metrics::MetricsSink;

pub use policy::{should_alert, AlertThreshold};
pub use tracker::TopEntityTracker;

pub const DEFAULT_ALERT_TEMPLATE: &str =
    "Attention: {count} messages in the last window exceeded the threshold of {threshold}.";

/// What happens to entity counts when a summary window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRetention {
    /// Counts keep growing across windows (bounded by top-K eviction).
    #[default]
    Accumulate,
    /// The table is cleared right after each summary.
    ResetEachWindow,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub threshold: AlertThreshold,
    pub summary_window: Duration,
    pub top_k: usize,
    pub retention: EntityRetention,
    /// Alert text; `{threshold}` and `{count}` are substituted.
    pub alert_template: String,
}

#[derive(Debug, Clone)]
pub struct AggregatorState {
    /// Messages since the last tick.
    pub total_messages: u64,
    /// Messages since `window_start`, reported in the summary.
    pub window_messages: u64,
    pub entities: TopEntityTracker,
    pub last_emotion: Option<Classification>,
    pub last_sentiment: Option<Classification>,
    pub last_topics: Vec<TopicWeight>,
    pub window_start: DateTime<Utc>,
    pub window_duration: Duration,
    last_tick: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub chat: ChatId,
    pub threshold: u64,
    pub observed: u64,
    pub fired_at: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSummary {
    pub chat: ChatId,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub messages: u64,
    pub ranked_entities: Vec<(String, u64)>,
    pub last_emotion: Option<Classification>,
    pub last_sentiment: Option<Classification>,
    pub last_topics: Vec<TopicWeight>,
}

impl WindowSummary {
    /// Multi-line plain text, one `entity: count` line per tracked entity.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Summary for chat {} ({} - {} UTC)\nMessages: {}\n",
            self.chat,
            self.window_start.format("%Y-%m-%d %H:%M:%S"),
            self.window_end.format("%Y-%m-%d %H:%M:%S"),
            self.messages
        );
        if self.ranked_entities.is_empty() {
            out.push_str("No entities observed.\n");
        } else {
            out.push_str("Top entities:\n");
            for (entity, count) in &self.ranked_entities {
                out.push_str(&format!("{entity}: {count}\n"));
            }
        }
        if let Some(e) = &self.last_emotion {
            out.push_str(&format!("Last emotion: {} ({:.2})\n", e.label, e.score));
        }
        if let Some(s) = &self.last_sentiment {
            out.push_str(&format!("Last sentiment: {} ({:.2})\n", s.label, s.score));
        }
        if !self.last_topics.is_empty() {
            let topics: Vec<String> = self
                .last_topics
                .iter()
                .map(|t| format!("{} {:.2}", t.topic, t.weight))
                .collect();
            out.push_str(&format!("Last topics: {}\n", topics.join(", ")));
        }
        out.trim_end().to_string()
    }
}

/// Result of one `on_tick`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub alert: Option<Alert>,
    pub summary: Option<WindowSummary>,
}

impl TickOutcome {
    pub fn alert_fired(&self) -> bool {
        self.alert.is_some()
    }

    pub fn summary_emitted(&self) -> bool {
        self.summary.is_some()
    }
}

pub struct WindowedMetricsAggregator {
    identity: ChatIdentity,
    config: AggregatorConfig,
    analyzer: Arc<TextAnalyzer>,
    sink: Arc<dyn MetricsSink>,
    state: Mutex<AggregatorState>,
}

impl WindowedMetricsAggregator {
    pub fn new(
        identity: ChatIdentity,
        config: AggregatorConfig,
        analyzer: Arc<TextAnalyzer>,
        sink: Arc<dyn MetricsSink>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let state = AggregatorState {
            total_messages: 0,
            window_messages: 0,
            entities: TopEntityTracker::new(config.top_k),
            last_emotion: None,
            last_sentiment: None,
            last_topics: Vec::new(),
            window_start: started_at,
            window_duration: config.summary_window,
            last_tick: None,
        };
        Self {
            identity,
            config,
            analyzer,
            sink,
            state: Mutex::new(state),
        }
    }

    pub fn identity(&self) -> ChatIdentity {
        self.identity
    }

    pub fn snapshot(&self) -> AggregatorState {
        self.state.lock().clone()
    }

    /// Count the message, then run every analysis step.
    ///
    /// The count always lands, blank text included. Analysis steps run
    /// concurrently; each failure is logged and skipped without affecting the
    /// others.
    pub async fn record_message(&self, text: &str) {
        let chat = self.identity.chat_id();
        {
            let mut st = self.state.lock();
            st.total_messages += 1;
            st.window_messages += 1;
        }
        self.sink.message_processed(chat);

        if text.trim().is_empty() {
            debug!(chat_id = %chat, "blank message counted, analysis skipped");
            return;
        }

        let with_topics = self.analyzer.has_topic_model();
        let (entities, emotion, sentiment, topics) = tokio::join!(
            self.analyzer.extract_entities(text),
            self.analyzer.classify_emotion(text),
            self.analyzer.classify_sentiment(text),
            async {
                if with_topics {
                    Some(self.analyzer.infer_topics(text).await)
                } else {
                    None
                }
            },
        );

        let entities = self.accept(Signal::Entities, entities);
        let emotion = self.accept(Signal::Emotion, emotion);
        let sentiment = self.accept(Signal::Sentiment, sentiment);
        let topics = topics.and_then(|t| self.accept(Signal::Topics, t));

        // Publish under the guard so gauges never lag behind the table.
        let mut st = self.state.lock();
        if let Some(found) = entities {
            for e in &found {
                st.entities.observe(e);
            }
            self.sink.entities(chat, &st.entities.ranked());
        }
        if let Some(e) = emotion {
            self.sink.emotion(chat, &e);
            st.last_emotion = Some(e);
        }
        if let Some(s) = sentiment {
            self.sink.sentiment(chat, &s);
            st.last_sentiment = Some(s);
        }
        if let Some(t) = topics {
            self.sink.topics(chat, &t);
            st.last_topics = t;
        }
    }

    fn accept<T>(&self, signal: Signal, res: Result<T, AnalysisError>) -> Option<T> {
        match res {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(chat_id = %self.identity.chat_id(), %signal, error = %e, "analysis step failed");
                self.sink.analysis_failed(self.identity.chat_id(), signal);
                None
            }
        }
    }

    /// Evaluate the alert window and, independently, the summary window.
    ///
    /// The message counter is reset on every effective tick whether or not
    /// the alert fired. A tick whose `now` is not later than the previous
    /// tick's is a no-op, so repeating a tick never double-fires or
    /// double-resets.
    pub fn on_tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let chat = self.identity.chat_id();
        let mut outcome = TickOutcome::default();
        {
            let mut st = self.state.lock();
            if st.last_tick.is_some_and(|prev| now <= prev) {
                return outcome;
            }
            st.last_tick = Some(now);

            let observed = st.total_messages;
            if should_alert(observed, self.config.threshold) {
                outcome.alert = Some(Alert {
                    chat,
                    threshold: self.config.threshold.get(),
                    observed,
                    fired_at: now,
                    text: self.alert_text(observed),
                });
            }
            st.total_messages = 0;

            let elapsed = now - st.window_start;
            if elapsed >= st.window_duration {
                outcome.summary = Some(WindowSummary {
                    chat,
                    window_start: st.window_start,
                    window_end: now,
                    messages: st.window_messages,
                    ranked_entities: st.entities.ranked(),
                    last_emotion: st.last_emotion.clone(),
                    last_sentiment: st.last_sentiment.clone(),
                    last_topics: st.last_topics.clone(),
                });
                st.window_start = advance(st.window_start, st.window_duration, now);
                st.window_messages = 0;
                if self.config.retention == EntityRetention::ResetEachWindow {
                    st.entities.clear();
                    self.sink.entities(chat, &[]);
                }
            }
        }

        debug!(
            chat_id = %chat,
            alert = outcome.alert_fired(),
            summary = outcome.summary_emitted(),
            "tick"
        );
        outcome
    }

    fn alert_text(&self, observed: u64) -> String {
        self.config
            .alert_template
            .replace("{threshold}", &self.config.threshold.get().to_string())
            .replace("{count}", &observed.to_string())
    }
}

/// Move `start` forward by whole windows so that `now` falls inside the new
/// window. Late ticks do not shift the window grid.
fn advance(start: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
    let window_ms = window.num_milliseconds().max(1);
    let elapsed_ms = (now - start).num_milliseconds().max(0);
    let windows = elapsed_ms / window_ms;
    start + Duration::milliseconds(windows * window_ms)
}
