// src/analyze/mod.rs
//! Text analysis: pluggable backends for entities, emotion, sentiment and topics.
//!
//! `TextAnalyzer` owns one backend per signal. Every call is independent and
//! fallible; callers decide what to do with a failed signal (the aggregator
//! logs and skips it). A missing topic model is not a failure: topic inference
//! then yields an empty distribution.

pub mod lexicon;
pub mod ner;
pub mod remote;
pub mod stub;
pub mod topics;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AnalysisConfig;

pub use lexicon::{LexiconEmotion, LexiconSentiment};
pub use ner::{ChainedExtractor, HeuristicEntityExtractor, PatternEntityExtractor};
pub use remote::RemoteClassifier;
pub use topics::KeywordTopicModel;

/// A discrete label with confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub score: f32,
}

impl Classification {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score: clamp01(score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicWeight {
    pub topic: String,
    pub weight: f32,
}

/// Which analysis step produced a result or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Entities,
    Emotion,
    Sentiment,
    Topics,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Emotion => "emotion",
            Self::Sentiment => "sentiment",
            Self::Topics => "topics",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("{backend} backend returned malformed output: {reason}")]
    Malformed {
        backend: &'static str,
        reason: String,
    },

    #[error("{signal} analysis timed out after {after:?}")]
    Timeout { signal: Signal, after: Duration },

    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Entity strings found in `text`. Duplicates are allowed; the analyzer collapses them.
    async fn extract(&self, text: &str) -> Result<Vec<String>, AnalysisError>;
    fn name(&self) -> &'static str;
}

/// Shared shape of the emotion and sentiment backends.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, AnalysisError>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait TopicInferer: Send + Sync {
    /// Weighted topics, heaviest first.
    async fn infer(&self, text: &str) -> Result<Vec<TopicWeight>, AnalysisError>;
    fn name(&self) -> &'static str;
}

pub type DynExtractor = Arc<dyn EntityExtractor>;
pub type DynClassifier = Arc<dyn Classifier>;
pub type DynTopics = Arc<dyn TopicInferer>;

pub struct TextAnalyzer {
    entities: DynExtractor,
    emotion: DynClassifier,
    sentiment: DynClassifier,
    topics: RwLock<Option<DynTopics>>,
    timeout: Option<Duration>,
}

impl TextAnalyzer {
    pub fn new(entities: DynExtractor, emotion: DynClassifier, sentiment: DynClassifier) -> Self {
        Self {
            entities,
            emotion,
            sentiment,
            topics: RwLock::new(None),
            timeout: None,
        }
    }

    pub fn with_topics(self, model: DynTopics) -> Self {
        *self.topics.write() = Some(model);
        self
    }

    /// Per-call upper bound on backend latency.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Swap (or remove) the topic model at runtime, e.g. after refitting.
    pub fn set_topic_model(&self, model: Option<DynTopics>) {
        *self.topics.write() = model;
    }

    pub fn has_topic_model(&self) -> bool {
        self.topics.read().is_some()
    }

    /// Distinct entities in first-seen order; blank strings are dropped.
    pub async fn extract_entities(&self, text: &str) -> Result<Vec<String>, AnalysisError> {
        let raw = self
            .guarded(Signal::Entities, self.entities.extract(text))
            .await?;
        let mut seen = HashSet::new();
        Ok(raw
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty() && seen.insert(e.clone()))
            .collect())
    }

    pub async fn classify_emotion(&self, text: &str) -> Result<Classification, AnalysisError> {
        let c = self
            .guarded(Signal::Emotion, self.emotion.classify(text))
            .await?;
        Ok(Classification::new(c.label, c.score))
    }

    pub async fn classify_sentiment(&self, text: &str) -> Result<Classification, AnalysisError> {
        let c = self
            .guarded(Signal::Sentiment, self.sentiment.classify(text))
            .await?;
        Ok(Classification::new(c.label, c.score))
    }

    /// Empty when no topic model has been fit.
    pub async fn infer_topics(&self, text: &str) -> Result<Vec<TopicWeight>, AnalysisError> {
        // Clone out of the lock; the guard must not live across the await.
        let model = self.topics.read().clone();
        match model {
            Some(m) => self.guarded(Signal::Topics, m.infer(text)).await,
            None => Ok(Vec::new()),
        }
    }

    async fn guarded<T, F>(&self, signal: Signal, fut: F) -> Result<T, AnalysisError>
    where
        F: Future<Output = Result<T, AnalysisError>>,
    {
        match self.timeout {
            Some(after) => tokio::time::timeout(after, fut)
                .await
                .map_err(|_| AnalysisError::Timeout { signal, after })?,
            None => fut.await,
        }
    }
}

/// Build the analyzer described by configuration.
///
/// * Entities: heuristic extractor, chained with regex patterns when
///   `entity_patterns_path` is set.
/// * Emotion / sentiment: remote endpoint when a URL is configured, otherwise
///   the embedded lexicons.
/// * Topics: loaded from `topic_model_path` if present; otherwise unfit.
pub fn build_from_config(cfg: &AnalysisConfig) -> anyhow::Result<TextAnalyzer> {
    let heuristic: DynExtractor = Arc::new(HeuristicEntityExtractor::default());
    let entities: DynExtractor = match &cfg.entity_patterns_path {
        Some(path) => {
            let patterns = PatternEntityExtractor::load(path)
                .with_context(|| format!("loading entity patterns from {}", path.display()))?;
            Arc::new(ChainedExtractor::new(vec![heuristic, Arc::new(patterns)]))
        }
        None => heuristic,
    };

    let emotion: DynClassifier = match &cfg.emotion_model_url {
        Some(url) => Arc::new(RemoteClassifier::new(
            "emotion-remote",
            url.clone(),
            cfg.inference_token.clone(),
        )?),
        None => Arc::new(LexiconEmotion::new()),
    };
    let sentiment: DynClassifier = match &cfg.sentiment_model_url {
        Some(url) => Arc::new(RemoteClassifier::new(
            "sentiment-remote",
            url.clone(),
            cfg.inference_token.clone(),
        )?),
        None => Arc::new(LexiconSentiment::new()),
    };

    let mut analyzer = TextAnalyzer::new(entities, emotion, sentiment);
    if let Some(path) = &cfg.topic_model_path {
        let model = KeywordTopicModel::load(path)
            .with_context(|| format!("loading topic model from {}", path.display()))?;
        info!(topics = model.len(), "topic model loaded");
        analyzer = analyzer.with_topics(Arc::new(model));
    }
    if let Some(t) = cfg.timeout {
        analyzer = analyzer.with_timeout(t);
    }

    info!(
        entities = analyzer.entities.name(),
        emotion = analyzer.emotion.name(),
        sentiment = analyzer.sentiment.name(),
        topics = analyzer.has_topic_model(),
        "text analyzer ready"
    );
    Ok(analyzer)
}

/// Lower-cased word tokens, Unicode aware.
pub(crate) fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// `keyword*` matches any token with that prefix; otherwise exact match.
pub(crate) fn keyword_matches(keyword: &str, token: &str) -> bool {
    match keyword.strip_suffix('*') {
        Some(prefix) => token.starts_with(prefix),
        None => keyword == token,
    }
}

fn clamp01(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
