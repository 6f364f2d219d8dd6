//! Deterministic backends for tests and for signals switched off in deployment.

use async_trait::async_trait;

use super::{AnalysisError, Classification, Classifier, EntityExtractor, TopicInferer, TopicWeight};

/// Never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExtractor;

#[async_trait]
impl EntityExtractor for NoopExtractor {
    async fn extract(&self, _text: &str) -> Result<Vec<String>, AnalysisError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Splits on whitespace and treats every word as an entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordsExtractor;

#[async_trait]
impl EntityExtractor for WordsExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>, AnalysisError> {
        Ok(text.split_whitespace().map(str::to_string).collect())
    }

    fn name(&self) -> &'static str {
        "words"
    }
}

/// Always answers with the same label.
#[derive(Debug, Clone)]
pub struct FixedClassifier {
    label: String,
    score: f32,
}

impl FixedClassifier {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _text: &str) -> Result<Classification, AnalysisError> {
        Ok(Classification {
            label: self.label.clone(),
            score: self.score,
        })
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Always fails, as an unreachable inference server would.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    async fn classify(&self, _text: &str) -> Result<Classification, AnalysisError> {
        Err(AnalysisError::Unavailable {
            backend: "failing",
            reason: "backend switched off".into(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedTopics {
    topics: Vec<TopicWeight>,
}

impl FixedTopics {
    pub fn new(topics: Vec<(&str, f32)>) -> Self {
        Self {
            topics: topics
                .into_iter()
                .map(|(t, w)| TopicWeight {
                    topic: t.to_string(),
                    weight: w,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl TopicInferer for FixedTopics {
    async fn infer(&self, _text: &str) -> Result<Vec<TopicWeight>, AnalysisError> {
        Ok(self.topics.clone())
    }

    fn name(&self) -> &'static str {
        "fixed-topics"
    }
}
