//! Lexicon backends for sentiment and emotion. No model files, no network:
//! both tables are embedded at compile time.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;

use super::{keyword_matches, tokenize, AnalysisError, Classification, Classifier};

static SENTIMENT: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

#[derive(Debug, Deserialize)]
struct EmotionEntry {
    label: String,
    keywords: Vec<String>,
}

static EMOTIONS: Lazy<Vec<EmotionEntry>> = Lazy::new(|| {
    let raw = include_str!("../emotion_lexicon.json");
    serde_json::from_str::<Vec<EmotionEntry>>(raw).expect("valid emotion lexicon")
});

/// Returned when no lexicon word matched, or positive and negative cancel out.
const UNINFORMED: f32 = 0.5;

/// Word-sum sentiment with negation.
///
/// A word's lexicon score is inverted when a negator appears within the
/// previous three tokens. The sign of the sum picks `positive` / `negative` /
/// `neutral`; confidence grows with the magnitude: `0.5 + 0.5 * |s| / (|s| + 2)`.
#[derive(Debug, Clone, Default)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *SENTIMENT.get(w).unwrap_or(&0)
    }

    /// Returns (score, token count).
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }

    pub fn classify_sync(&self, text: &str) -> Classification {
        let (score, _) = self.score_text(text);
        let magnitude = score.unsigned_abs() as f32;
        let confidence = 0.5 + 0.5 * magnitude / (magnitude + 2.0);
        match score {
            s if s > 0 => Classification::new("positive", confidence),
            s if s < 0 => Classification::new("negative", confidence),
            _ => Classification::new("neutral", UNINFORMED),
        }
    }
}

#[async_trait]
impl Classifier for LexiconSentiment {
    async fn classify(&self, text: &str) -> Result<Classification, AnalysisError> {
        Ok(self.classify_sync(text))
    }

    fn name(&self) -> &'static str {
        "lexicon-sentiment"
    }
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn"
            | "wasn"
            | "aren"
            | "won"
            | "don"
            | "doesn"
            | "cannot"
            | "without"
            | "не"
            | "нет"
            | "ни"
            | "никогда"
            | "без"
    )
}

/// Keyword-table emotion.
///
/// Each token votes for every emotion whose keyword list matches it (a
/// trailing `*` in a keyword is a prefix match). The label with most votes
/// wins, earlier table entries win ties, and confidence is its share of all
/// votes. No votes gives `neutral`.
#[derive(Debug, Clone, Default)]
pub struct LexiconEmotion;

impl LexiconEmotion {
    pub fn new() -> Self {
        Self
    }

    pub fn classify_sync(&self, text: &str) -> Classification {
        let mut votes = vec![0u32; EMOTIONS.len()];
        for tok in tokenize(text) {
            for (i, e) in EMOTIONS.iter().enumerate() {
                if e.keywords.iter().any(|k| keyword_matches(k, &tok)) {
                    votes[i] += 1;
                }
            }
        }

        let total: u32 = votes.iter().sum();
        if total == 0 {
            return Classification::new("neutral", UNINFORMED);
        }

        let mut best = 0;
        for (i, v) in votes.iter().enumerate() {
            if *v > votes[best] {
                best = i;
            }
        }
        Classification::new(
            EMOTIONS[best].label.clone(),
            votes[best] as f32 / total as f32,
        )
    }
}

#[async_trait]
impl Classifier for LexiconEmotion {
    async fn classify(&self, text: &str) -> Result<Classification, AnalysisError> {
        Ok(self.classify_sync(text))
    }

    fn name(&self) -> &'static str {
        "lexicon-emotion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_negative_neutral() {
        let s = LexiconSentiment::new();
        assert_eq!(s.classify_sync("This is great, thanks!").label, "positive");
        assert_eq!(s.classify_sync("Всё ужасно, кошмар").label, "negative");
        let n = s.classify_sync("the meeting is at noon");
        assert_eq!(n.label, "neutral");
        assert_eq!(n.score, UNINFORMED);
    }

    #[test]
    fn negation_flips_sign() {
        let s = LexiconSentiment::new();
        assert_eq!(s.score_text("good").0, 2);
        assert_eq!(s.score_text("not really that good").0, -2);
        assert_eq!(s.score_text("это не плохо").0, 2);
    }

    #[test]
    fn confidence_grows_with_magnitude() {
        let s = LexiconSentiment::new();
        let weak = s.classify_sync("fine");
        let strong = s.classify_sync("excellent amazing perfect");
        assert!(weak.score < strong.score);
        assert!(strong.score < 1.0 && weak.score > 0.5);
    }

    #[test]
    fn emotion_prefix_keywords() {
        let e = LexiconEmotion::new();
        let c = e.classify_sync("Я так рада, просто счастлива!");
        assert_eq!(c.label, "joy");
        assert_eq!(c.score, 1.0);
    }

    #[test]
    fn emotion_share_and_neutral() {
        let e = LexiconEmotion::new();
        let c = e.classify_sync("I hate this, so angry, but thanks");
        assert_eq!(c.label, "anger");
        assert!((c.score - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(e.classify_sync("schedule at 10").label, "neutral");
    }
}
