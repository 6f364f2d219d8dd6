//! Keyword topic model.
//!
//! A topic is a label plus keywords (`*` suffix = prefix match). Inference
//! counts keyword hits per topic and normalizes them into weights summing to
//! 1.0; topics without hits are omitted, heaviest topic first, ties in model
//! order.
//!
//! Models come from a file (TOML or JSON) or are fit from a labelled corpus.
//!
//! TOML:
//! ```toml
//! [[topic]]
//! label = "football"
//! keywords = ["goal", "match*", "матч*"]
//! ```
//! JSON: `[{"label": "football", "keywords": ["goal"]}]`

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{keyword_matches, tokenize, AnalysisError, TopicInferer, TopicWeight};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Topic {
    pub label: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KeywordTopicModel {
    topics: Vec<Topic>,
}

impl KeywordTopicModel {
    pub fn new(topics: Vec<Topic>) -> Self {
        let topics = topics
            .into_iter()
            .map(|t| Topic {
                label: t.label.trim().to_string(),
                keywords: t
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty() && k != "*")
                    .collect(),
            })
            .filter(|t| !t.label.is_empty() && !t.keywords.is_empty())
            .collect();
        Self { topics }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading topic model from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_model(&content, &ext)
    }

    /// Fit keywords from `(label, text)` samples.
    ///
    /// A token becomes a keyword of a label when it occurs more often under
    /// that label than under any other. Each label keeps its `per_topic` most
    /// frequent such tokens (ties alphabetical). Tokens shorter than three
    /// characters are ignored.
    pub fn fit<'a, I>(samples: I, per_topic: usize) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut order: Vec<String> = Vec::new();
        let mut freq: HashMap<String, BTreeMap<String, usize>> = HashMap::new();
        for (label, text) in samples {
            if !freq.contains_key(label) {
                order.push(label.to_string());
            }
            let bucket = freq.entry(label.to_string()).or_default();
            for tok in tokenize(text).filter(|t| t.chars().count() >= 3) {
                *bucket.entry(tok).or_default() += 1;
            }
        }

        let topics = order
            .iter()
            .map(|label| {
                let own = &freq[label];
                let mut picked: Vec<(&String, usize)> = own
                    .iter()
                    .filter(|(tok, n)| {
                        freq.iter()
                            .filter(|(other, _)| *other != label)
                            .all(|(_, f)| f.get(*tok).copied().unwrap_or(0) < **n)
                    })
                    .map(|(tok, n)| (tok, *n))
                    .collect();
                picked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
                Topic {
                    label: label.clone(),
                    keywords: picked
                        .into_iter()
                        .take(per_topic)
                        .map(|(t, _)| t.clone())
                        .collect(),
                }
            })
            .collect();
        Self::new(topics)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn infer_sync(&self, text: &str) -> Vec<TopicWeight> {
        let tokens: HashSet<String> = tokenize(text).collect();
        let hits: Vec<usize> = self
            .topics
            .iter()
            .map(|t| {
                t.keywords
                    .iter()
                    .filter(|k| tokens.iter().any(|tok| keyword_matches(k, tok)))
                    .count()
            })
            .collect();

        let total: usize = hits.iter().sum();
        if total == 0 {
            return Vec::new();
        }

        let mut out: Vec<TopicWeight> = self
            .topics
            .iter()
            .zip(hits)
            .filter(|(_, h)| *h > 0)
            .map(|(t, h)| TopicWeight {
                topic: t.label.clone(),
                weight: h as f32 / total as f32,
            })
            .collect();
        // Stable sort keeps model order among equal weights.
        out.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        out
    }
}

#[async_trait]
impl TopicInferer for KeywordTopicModel {
    async fn infer(&self, text: &str) -> Result<Vec<TopicWeight>, AnalysisError> {
        Ok(self.infer_sync(text))
    }

    fn name(&self) -> &'static str {
        "keyword-topics"
    }
}

fn parse_model(s: &str, hint_ext: &str) -> Result<KeywordTopicModel> {
    if hint_ext == "json" {
        return parse_json(s);
    }
    if let Ok(m) = parse_toml(s) {
        return Ok(m);
    }
    parse_json(s).map_err(|_| anyhow!("unsupported topic model format"))
}

fn parse_toml(s: &str) -> Result<KeywordTopicModel> {
    #[derive(Deserialize)]
    struct TomlModel {
        topic: Vec<Topic>,
    }
    let m: TomlModel = toml::from_str(s)?;
    Ok(KeywordTopicModel::new(m.topic))
}

fn parse_json(s: &str) -> Result<KeywordTopicModel> {
    let v: Vec<Topic> = serde_json::from_str(s).context("parse topic model JSON")?;
    Ok(KeywordTopicModel::new(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> KeywordTopicModel {
        KeywordTopicModel::new(vec![
            Topic {
                label: "football".into(),
                keywords: vec!["goal".into(), "match*".into(), "матч*".into()],
            },
            Topic {
                label: "weather".into(),
                keywords: vec!["rain*".into(), "snow".into(), "дожд*".into()],
            },
            Topic {
                label: " ".into(),
                keywords: vec!["dropped".into()],
            },
        ])
    }

    #[test]
    fn blank_topics_are_dropped() {
        assert_eq!(model().len(), 2);
    }

    #[test]
    fn weights_are_normalized_and_ordered() {
        let out = model().infer_sync("Rain delayed the match, then a late goal");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].topic, "football");
        assert!((out[0].weight - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(out[1].topic, "weather");
        let sum: f32 = out.iter().map(|t| t.weight).sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn no_hits_is_empty() {
        assert!(model().infer_sync("nothing relevant").is_empty());
    }

    #[test]
    fn toml_and_json_formats() {
        let toml = r#"
            [[topic]]
            label = "prices"
            keywords = ["price*", "цен*"]
        "#;
        let m = parse_model(toml, "toml").unwrap();
        assert_eq!(m.topics()[0].label, "prices");

        let json = r#"[{"label":"prices","keywords":["PRICE*"]}]"#;
        let m = parse_model(json, "json").unwrap();
        assert_eq!(m.topics()[0].keywords, vec!["price*".to_string()]);

        assert!(parse_model("not a model", "").is_err());
    }

    #[test]
    fn fit_picks_discriminative_tokens() {
        let m = KeywordTopicModel::fit(
            [
                ("football", "great goal in the match"),
                ("football", "another goal, what a match"),
                ("weather", "heavy rain and more rain in the evening"),
            ],
            2,
        );
        assert_eq!(m.len(), 2);
        assert_eq!(m.topics()[0].label, "football");
        assert_eq!(
            m.topics()[0].keywords,
            vec!["goal".to_string(), "match".to_string()]
        );
        assert_eq!(m.topics()[1].keywords[0], "rain");
        assert!(!m.topics()[1].keywords.contains(&"the".to_string()));
    }
}
