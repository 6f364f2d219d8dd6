// src/analyze/ner.rs
//! Entity extraction backends.
//!
//! - `HeuristicEntityExtractor`: runs of capitalized words (Latin or Cyrillic),
//!   `@mentions` and `#hashtags`. Common sentence starters are ignored.
//! - `PatternEntityExtractor`: regex patterns from a JSON file of the form
//!   `{ "patterns": [ { "regex": "(?i)\\bкремл", "entity": "Kremlin" } ] }`.
//!   Regexes must be compatible with the `regex` crate (no lookarounds) and are
//!   compiled once at load time.
//! - `ChainedExtractor`: concatenates the output of several extractors.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use super::{AnalysisError, DynExtractor, EntityExtractor};

/// Capitalized words that usually just start a sentence.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "i", "i'm", "it", "this", "that", "these", "those", "we", "you", "he",
    "she", "they", "my", "our", "your", "his", "her", "their", "and", "but", "or", "so", "if",
    "when", "what", "why", "how", "who", "where", "yes", "no", "ok", "okay", "hi", "hello",
    "thanks", "please", "in", "on", "at", "for", "to", "of", "is", "are", "was", "there",
    "yesterday", "today", "tomorrow", "tonight", "now", "then", "also", "however", "maybe",
    "perhaps", "still", "just", "anyway", "meanwhile", "finally", "actually", "really",
    "я", "мы", "ты", "вы", "он", "она", "они", "оно", "это", "эта", "этот", "эти", "то", "так",
    "как", "что", "кто", "где", "когда", "почему", "зачем", "и", "а", "но", "или", "если", "да",
    "нет", "ну", "вот", "в", "во", "на", "с", "со", "к", "по", "о", "об", "от", "из", "за",
    "для", "привет", "спасибо", "пожалуйста", "все", "всё", "мой", "моя", "наш", "ваш",
    "вчера", "сегодня", "завтра", "сейчас", "потом", "тогда", "также", "тоже", "ещё", "еще",
    "уже", "может", "наверное", "кстати",
];

#[derive(Debug, Clone, Default)]
pub struct HeuristicEntityExtractor;

impl HeuristicEntityExtractor {
    pub fn extract_sync(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut phrase: Vec<&str> = Vec::new();

        for raw in text.split_whitespace() {
            if let Some(tag) = handle_or_tag(raw) {
                flush(&mut phrase, &mut out);
                out.push(tag.to_string());
                continue;
            }

            if raw.starts_with(['(', '"', '«', '\'', '[']) {
                flush(&mut phrase, &mut out);
            }

            let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
            if is_capitalized(word) && !is_stopword(word) {
                phrase.push(word);
            } else {
                flush(&mut phrase, &mut out);
            }

            if raw.ends_with(['.', ',', '!', '?', ';', ':', ')', '"', '»', '\'', ']']) {
                flush(&mut phrase, &mut out);
            }
        }
        flush(&mut phrase, &mut out);
        out
    }
}

#[async_trait]
impl EntityExtractor for HeuristicEntityExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>, AnalysisError> {
        Ok(self.extract_sync(text))
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

fn flush(phrase: &mut Vec<&str>, out: &mut Vec<String>) {
    if !phrase.is_empty() {
        out.push(phrase.join(" "));
        phrase.clear();
    }
}

/// `@handle` or `#tag` with at least one word character after the sigil.
fn handle_or_tag(raw: &str) -> Option<&str> {
    let trimmed = raw.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_');
    let mut chars = trimmed.chars();
    let sigil = chars.next()?;
    if !matches!(sigil, '@' | '#') {
        return None;
    }
    let rest = chars.as_str();
    if !rest.is_empty() && rest.chars().all(|c| c.is_alphanumeric() || c == '_') {
        Some(trimmed)
    } else {
        None
    }
}

fn is_capitalized(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.is_uppercase() && chars.next().is_some(),
        None => false,
    }
}

fn is_stopword(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOPWORDS.contains(&lower.as_str())
}

#[derive(Debug, Deserialize)]
struct PatternSpec {
    regex: String,
    #[serde(alias = "keyword")]
    entity: String,
}

#[derive(Debug, Deserialize)]
struct PatternFile {
    #[serde(default)]
    patterns: Vec<PatternSpec>,
}

#[derive(Debug, Clone)]
pub struct PatternEntityExtractor {
    patterns: Vec<(Regex, String)>,
}

impl PatternEntityExtractor {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading entity patterns from {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let file: PatternFile = serde_json::from_str(s).context("parse entity pattern JSON")?;
        let mut patterns = Vec::with_capacity(file.patterns.len());
        for p in file.patterns {
            let re = Regex::new(&p.regex)
                .with_context(|| format!("invalid entity regex {:?}", p.regex))?;
            patterns.push((re, p.entity));
        }
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[async_trait]
impl EntityExtractor for PatternEntityExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>, AnalysisError> {
        Ok(self
            .patterns
            .iter()
            .filter(|(re, _)| re.is_match(text))
            .map(|(_, entity)| entity.clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "patterns"
    }
}

/// Runs extractors in order. One failing member is logged and skipped; the
/// chain only fails when every member fails.
pub struct ChainedExtractor {
    members: Vec<DynExtractor>,
}

impl ChainedExtractor {
    pub fn new(members: Vec<DynExtractor>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl EntityExtractor for ChainedExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>, AnalysisError> {
        let mut out = Vec::new();
        let mut last_err = None;
        let mut any_ok = self.members.is_empty();
        for m in &self.members {
            match m.extract(text).await {
                Ok(mut found) => {
                    any_ok = true;
                    out.append(&mut found);
                }
                Err(e) => {
                    warn!(backend = m.name(), error = %e, "entity extractor failed");
                    last_err = Some(e);
                }
            }
        }
        match (any_ok, last_err) {
            (false, Some(e)) => Err(e),
            _ => Ok(out),
        }
    }

    fn name(&self) -> &'static str {
        "chained"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_multiword_proper_nouns() {
        let out = HeuristicEntityExtractor.extract_sync(
            "Yesterday Vladimir Putin met Emmanuel Macron in Paris. The talks ended.",
        );
        assert_eq!(out, vec!["Vladimir Putin", "Emmanuel Macron", "Paris"]);
    }

    #[test]
    fn sentence_start_adverbs_are_not_glued_to_names() {
        let out = HeuristicEntityExtractor.extract_sync("Today Angela Merkel spoke. Сегодня Москва ответила.");
        assert_eq!(out, vec!["Angela Merkel", "Москва"]);
    }

    #[test]
    fn cyrillic_capitals_and_sentence_starters() {
        let out = HeuristicEntityExtractor.extract_sync("Это Москва, а там Санкт-Петербург.");
        assert_eq!(out, vec!["Москва", "Санкт-Петербург"]);
    }

    #[test]
    fn mentions_and_hashtags() {
        let out = HeuristicEntityExtractor.extract_sync("ping @durov about #Telegram_news!");
        assert_eq!(out, vec!["@durov", "#Telegram_news"]);
    }

    #[test]
    fn lone_sigils_and_single_letters_ignored() {
        let out = HeuristicEntityExtractor.extract_sync("@ # A b c");
        assert!(out.is_empty(), "{out:?}");
    }

    #[tokio::test]
    async fn patterns_match_case_insensitive() {
        let p = PatternEntityExtractor::from_json(
            r#"{"patterns":[{"regex":"(?i)\\bкремл","entity":"Kremlin"},{"regex":"NATO","keyword":"NATO"}]}"#,
        )
        .unwrap();
        assert_eq!(p.len(), 2);
        let out = p.extract("В Кремле заявили").await.unwrap();
        assert_eq!(out, vec!["Kremlin".to_string()]);
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = PatternEntityExtractor::from_json(r#"{"patterns":[{"regex":"(","entity":"x"}]}"#)
            .unwrap_err();
        assert!(format!("{err:#}").contains("invalid entity regex"));
    }

    #[tokio::test]
    async fn chain_concatenates() {
        let chain = ChainedExtractor::new(vec![
            std::sync::Arc::new(HeuristicEntityExtractor),
            std::sync::Arc::new(
                PatternEntityExtractor::from_json(r#"{"patterns":[{"regex":"euro","entity":"EUR"}]}"#)
                    .unwrap(),
            ),
        ]);
        let out = chain.extract("the euro fell against Tokyo markets").await.unwrap();
        assert_eq!(out, vec!["Tokyo".to_string(), "EUR".to_string()]);
    }
}
