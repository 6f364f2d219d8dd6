// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregator;
pub mod analyze;
pub mod chat;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod registry;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::aggregator::{
    should_alert, AggregatorConfig, Alert, AlertThreshold, EntityRetention, TopEntityTracker,
    WindowSummary, WindowedMetricsAggregator,
};
pub use crate::analyze::TextAnalyzer;
pub use crate::chat::{ChatId, ChatIdentity};
pub use crate::config::BotConfig;
pub use crate::registry::MonitorRegistry;
