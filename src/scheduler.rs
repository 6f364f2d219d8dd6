// src/scheduler.rs
//! Periodic monitor: ticks every aggregator on a fixed interval and delivers
//! alerts and summaries. The interval does not react to message volume.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::metrics::MetricsSink;
use crate::notify::Notifier;
use crate::registry::MonitorRegistry;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) -> DateTime<Utc> {
        let mut g = self.now.lock();
        *g += by;
        *g
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub alerts_fired: usize,
    pub alerts_delivered: usize,
    pub summaries_emitted: usize,
    pub summaries_delivered: usize,
}

/// Tick every chat once at `now` and deliver the results.
///
/// Delivery failures are logged and dropped: nothing is queued for the next
/// tick. Only delivered alerts count towards the alerts metric.
pub async fn run_tick(
    registry: &MonitorRegistry,
    notifier: &dyn Notifier,
    sink: &dyn MetricsSink,
    now: DateTime<Utc>,
) -> TickReport {
    let mut report = TickReport::default();

    for agg in registry.iter() {
        let outcome = agg.on_tick(now);
        let chat = agg.identity().chat_id();
        let dest = agg.identity().alert_chat_id();

        if let Some(alert) = outcome.alert {
            report.alerts_fired += 1;
            match notifier.send(dest, &alert.text).await {
                Ok(()) => {
                    report.alerts_delivered += 1;
                    sink.alert_sent(chat);
                    info!(chat_id = %chat, observed = alert.observed, threshold = alert.threshold, "alert sent");
                }
                Err(e) => {
                    warn!(chat_id = %chat, notifier = notifier.name(), error = %e, "alert delivery failed");
                }
            }
        }

        if let Some(summary) = outcome.summary {
            report.summaries_emitted += 1;
            match notifier.send(dest, &summary.render()).await {
                Ok(()) => {
                    report.summaries_delivered += 1;
                    sink.summary_sent(chat);
                    info!(chat_id = %chat, entities = summary.ranked_entities.len(), "summary sent");
                }
                Err(e) => {
                    warn!(chat_id = %chat, notifier = notifier.name(), error = %e, "summary delivery failed");
                }
            }
        }
    }

    report
}

/// Spawn the monitor loop. The first tick fires one full `interval` after start.
pub fn spawn_monitor(
    registry: Arc<MonitorRegistry>,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // `interval` completes its first tick immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = run_tick(&registry, notifier.as_ref(), sink.as_ref(), clock.now()).await;
            tracing::trace!(target: "monitor", ?report, "monitor tick");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_moves_only_on_demand() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let c = ManualClock::new(t0);
        assert_eq!(c.now(), t0);
        let t1 = c.advance(chrono::Duration::seconds(15));
        assert_eq!(t1, t0 + chrono::Duration::seconds(15));
        assert_eq!(c.now(), t1);
        c.set(t0);
        assert_eq!(c.now(), t0);
    }
}
