//! chatwatch binary entrypoint.
//! Loads configuration, builds one aggregator per monitored chat, then runs
//! the metrics endpoint, the monitor loop and the Bot API poller until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chatwatch::config::{BotConfig, DeliveryMode};
use chatwatch::ingest::{run_ingest, TelegramPoller};
use chatwatch::metrics::{Metrics, MetricsSink, PrometheusSink};
use chatwatch::notify::{LogNotifier, Notifier, TelegramNotifier};
use chatwatch::scheduler::{spawn_monitor, SystemClock};
use chatwatch::{analyze, MonitorRegistry};

/// Evicted label series linger on /metrics this long (at zero) before the
/// exporter drops them.
const GAUGE_IDLE: Duration = Duration::from_secs(600);

/// Compact logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatwatch=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = match BotConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %format!("{e:#}"), "invalid configuration");
            return Err(e);
        }
    };

    let metrics = Metrics::init(Some(GAUGE_IDLE))?;
    let analyzer = Arc::new(analyze::build_from_config(&cfg.analysis).context("text analyzer")?);
    let sink: Arc<dyn MetricsSink> = Arc::new(PrometheusSink::new());

    let registry = Arc::new(MonitorRegistry::build(
        &cfg.chats,
        &cfg.aggregator_config(),
        analyzer,
        sink.clone(),
        Utc::now(),
    ));

    let notifier: Arc<dyn Notifier> = match cfg.delivery {
        DeliveryMode::Telegram => {
            Arc::new(
                TelegramNotifier::new(cfg.bot_token.clone())
                    .with_api_base(cfg.api_base.clone())
                    .with_retries(cfg.delivery_retries)
                    .with_timeout(cfg.delivery_timeout_secs),
            )
        }
        DeliveryMode::Log => Arc::new(LogNotifier::new()),
    };

    info!(
        chats = registry.len(),
        threshold = cfg.threshold.get(),
        interval_secs = cfg.monitor_interval.as_secs(),
        summary_secs = cfg.summary_interval.num_seconds(),
        top_k = cfg.top_k,
        retention = ?cfg.retention,
        notifier = notifier.name(),
        "chatwatch starting"
    );

    let port = cfg.metrics_port;
    let server = tokio::spawn(async move {
        if let Err(e) = metrics.serve(port).await {
            error!(error = %format!("{e:#}"), "metrics endpoint stopped");
        }
    });

    let monitor = spawn_monitor(
        registry.clone(),
        notifier,
        sink,
        Arc::new(SystemClock),
        cfg.monitor_interval,
    );

    let poller = TelegramPoller::new(cfg.bot_token.clone()).with_api_base(cfg.api_base.clone());
    let ingest = tokio::spawn(run_ingest(poller, registry));

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "ctrl-c handler failed");
            }
            info!("shutting down");
        }
        res = ingest => {
            if let Err(e) = res {
                error!(error = %e, "ingest task ended unexpectedly");
            }
        }
    }

    monitor.abort();
    server.abort();
    Ok(())
}
