// src/config/mod.rs
//! Environment configuration.
//!
//! Read once at startup (after `.env` is loaded). Anything missing or
//! malformed is an error, and the binary refuses to start rather than run
//! with undefined chat ids or credentials.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::aggregator::{AggregatorConfig, AlertThreshold, EntityRetention, DEFAULT_ALERT_TEMPLATE};
use crate::chat::{ChatId, ChatIdentity};
use crate::notify::telegram::{DEFAULT_API_BASE, DEFAULT_RETRIES, DEFAULT_TIMEOUT_SECS, MAX_RETRIES};

pub const DEFAULT_THRESHOLD: u64 = 5;
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_TOP_K: usize = 6;
pub const DEFAULT_METRICS_PORT: u16 = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Telegram,
    /// Log alerts and summaries instead of sending them.
    Log,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisConfig {
    pub entity_patterns_path: Option<PathBuf>,
    pub topic_model_path: Option<PathBuf>,
    pub emotion_model_url: Option<String>,
    pub sentiment_model_url: Option<String>,
    pub inference_token: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    pub chats: Vec<ChatIdentity>,
    pub threshold: AlertThreshold,
    pub monitor_interval: Duration,
    pub summary_interval: chrono::Duration,
    pub top_k: usize,
    pub retention: EntityRetention,
    pub alert_template: String,
    pub metrics_port: u16,
    pub delivery: DeliveryMode,
    /// Attempts per outgoing message, `1..=MAX_RETRIES`.
    pub delivery_retries: u8,
    pub delivery_timeout_secs: u64,
    pub api_base: String,
    pub analysis: AnalysisConfig,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env` over an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = var("TELEGRAM_BOT_TOKEN")
            .or_else(|| var("BOT_TOKEN"))
            .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN (or BOT_TOKEN) is not set"))?;

        let sources = var("TELEGRAM_CHAT_ID").ok_or_else(|| anyhow!("TELEGRAM_CHAT_ID is not set"))?;
        let alert_chat = var("TELEGRAM_ALERT_CHAT_ID")
            .map(|v| v.parse::<ChatId>().context("TELEGRAM_ALERT_CHAT_ID"))
            .transpose()?;
        let mut chats = Vec::new();
        for part in sources.split(',').filter(|p| !p.trim().is_empty()) {
            let id = part
                .parse::<ChatId>()
                .with_context(|| format!("TELEGRAM_CHAT_ID entry {part:?}"))?;
            chats.push(ChatIdentity::new(id, alert_chat));
        }
        if chats.is_empty() {
            bail!("TELEGRAM_CHAT_ID lists no chats");
        }

        let threshold_raw: u64 = parse_or(&var, "MESSAGE_THRESHOLD", DEFAULT_THRESHOLD)?;
        let threshold = AlertThreshold::new(threshold_raw)
            .ok_or_else(|| anyhow!("MESSAGE_THRESHOLD must be positive"))?;

        let monitor_secs: u64 = parse_or(&var, "MONITOR_INTERVAL_SECS", DEFAULT_MONITOR_INTERVAL_SECS)?;
        if monitor_secs == 0 {
            bail!("MONITOR_INTERVAL_SECS must be positive");
        }
        let summary_secs: u64 = parse_or(&var, "SUMMARY_INTERVAL_SECS", monitor_secs)?;
        if summary_secs == 0 {
            bail!("SUMMARY_INTERVAL_SECS must be positive");
        }
        let summary_interval = chrono::Duration::from_std(Duration::from_secs(summary_secs))
            .context("SUMMARY_INTERVAL_SECS out of range")?;

        let top_k: usize = parse_or(&var, "TOP_K_ENTITIES", DEFAULT_TOP_K)?;
        if top_k == 0 {
            bail!("TOP_K_ENTITIES must be positive");
        }

        let retention = match var("ENTITY_RETENTION").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("accumulate") => EntityRetention::Accumulate,
            Some("reset") | Some("reset_each_window") => EntityRetention::ResetEachWindow,
            Some(other) => bail!("ENTITY_RETENTION must be `accumulate` or `reset`, got {other:?}"),
        };

        let delivery = match var("DELIVERY").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("telegram") => DeliveryMode::Telegram,
            Some("log") => DeliveryMode::Log,
            Some(other) => bail!("DELIVERY must be `telegram` or `log`, got {other:?}"),
        };

        let delivery_retries: u8 = parse_or(&var, "DELIVERY_RETRIES", DEFAULT_RETRIES)?;
        if !(1..=MAX_RETRIES).contains(&delivery_retries) {
            bail!("DELIVERY_RETRIES must be between 1 and {MAX_RETRIES}");
        }
        let delivery_timeout_secs: u64 = parse_or(&var, "DELIVERY_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if delivery_timeout_secs == 0 {
            bail!("DELIVERY_TIMEOUT_SECS must be positive");
        }

        let timeout = var("ANALYSIS_TIMEOUT_MS")
            .map(|v| v.parse::<u64>().context("ANALYSIS_TIMEOUT_MS"))
            .transpose()?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Ok(Self {
            bot_token,
            chats,
            threshold,
            monitor_interval: Duration::from_secs(monitor_secs),
            summary_interval,
            top_k,
            retention,
            alert_template: var("ALERT_TEMPLATE").unwrap_or_else(|| DEFAULT_ALERT_TEMPLATE.to_string()),
            metrics_port: parse_or(&var, "METRICS_PORT", DEFAULT_METRICS_PORT)?,
            delivery,
            delivery_retries,
            delivery_timeout_secs,
            api_base: var("TELEGRAM_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            analysis: AnalysisConfig {
                entity_patterns_path: var("ENTITY_PATTERNS_PATH").map(PathBuf::from),
                topic_model_path: var("TOPIC_MODEL_PATH").map(PathBuf::from),
                emotion_model_url: var("EMOTION_MODEL_URL"),
                sentiment_model_url: var("SENTIMENT_MODEL_URL"),
                inference_token: var("INFERENCE_API_TOKEN"),
                timeout,
            },
        })
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            threshold: self.threshold,
            summary_window: self.summary_interval,
            top_k: self.top_k,
            retention: self.retention,
            alert_template: self.alert_template.clone(),
        }
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(v) => v
            .parse::<T>()
            .with_context(|| format!("{key} has invalid value {v:?}")),
        None => Ok(default),
    }
}
