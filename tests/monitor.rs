// tests/monitor.rs
//
// Monitor loop and delivery: run_tick over a registry, delivery failures,
// the spawned loop with an injected clock, and the Bot API notifier wired in.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chatwatch::aggregator::{AggregatorConfig, AlertThreshold, EntityRetention, DEFAULT_ALERT_TEMPLATE};
use chatwatch::analyze::stub::{FixedClassifier, WordsExtractor};
use chatwatch::analyze::TextAnalyzer;
use chatwatch::chat::{ChatId, ChatIdentity};
use chatwatch::metrics::{MetricsSink, RecordingSink};
use chatwatch::notify::{DeliveryError, LogNotifier, Notifier, TelegramNotifier};
use chatwatch::scheduler::{run_tick, spawn_monitor, Clock, ManualClock};
use chatwatch::MonitorRegistry;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
}

fn config(threshold: u64, window_secs: i64) -> AggregatorConfig {
    AggregatorConfig {
        threshold: AlertThreshold::new(threshold).unwrap(),
        summary_window: Duration::seconds(window_secs),
        top_k: 6,
        retention: EntityRetention::Accumulate,
        alert_template: DEFAULT_ALERT_TEMPLATE.to_string(),
    }
}

fn registry(identities: &[ChatIdentity], cfg: AggregatorConfig, sink: Arc<dyn MetricsSink>) -> MonitorRegistry {
    let analyzer = Arc::new(TextAnalyzer::new(
        Arc::new(WordsExtractor),
        Arc::new(FixedClassifier::new("joy", 0.9)),
        Arc::new(FixedClassifier::new("positive", 0.8)),
    ));
    MonitorRegistry::build(identities, &cfg, analyzer, sink, t0())
}

/// Refuses every send to one destination, accepts (and remembers) the rest.
struct RefusingNotifier {
    refuse: ChatId,
    sent: Mutex<Vec<(ChatId, String)>>,
}

#[async_trait]
impl Notifier for RefusingNotifier {
    async fn send(&self, chat: ChatId, text: &str) -> Result<(), DeliveryError> {
        if chat == self.refuse {
            return Err(DeliveryError::Rejected {
                status: 403,
                description: "Forbidden: bot was kicked".into(),
            });
        }
        self.sent.lock().push((chat, text.to_string()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "refusing"
    }
}

#[tokio::test]
async fn failed_delivery_does_not_block_other_chats_or_replay() {
    let a = ChatIdentity::new(ChatId(1), None);
    let b = ChatIdentity::new(ChatId(2), None);
    let sink = Arc::new(RecordingSink::new());
    let reg = registry(&[a, b], config(1, 3600), sink.clone());
    let notifier = RefusingNotifier {
        refuse: ChatId(1),
        sent: Mutex::new(Vec::new()),
    };

    for chat in [ChatId(1), ChatId(2)] {
        let agg = reg.get(chat).unwrap();
        agg.record_message("x").await;
        agg.record_message("y").await;
    }

    let report = run_tick(&reg, &notifier, sink.as_ref(), t0() + Duration::seconds(15)).await;
    assert_eq!(report.alerts_fired, 2);
    assert_eq!(report.alerts_delivered, 1);
    assert_eq!(sink.alerts(ChatId(1)), 0);
    assert_eq!(sink.alerts(ChatId(2)), 1);
    assert_eq!(notifier.sent.lock().len(), 1);
    assert_eq!(notifier.sent.lock()[0].0, ChatId(2));

    // Counters were reset regardless of delivery; nothing is queued.
    let report = run_tick(&reg, &notifier, sink.as_ref(), t0() + Duration::seconds(30)).await;
    assert_eq!(report.alerts_fired, 0);
    assert_eq!(reg.get(ChatId(1)).unwrap().snapshot().total_messages, 0);
}

#[tokio::test]
async fn alerts_and_summaries_go_to_alert_chat() {
    let id = ChatIdentity::new(ChatId(-100), Some(ChatId(42)));
    let sink = Arc::new(RecordingSink::new());
    let reg = registry(&[id], config(1, 15), sink.clone());
    let notifier = LogNotifier::new();

    let agg = reg.get(ChatId(-100)).unwrap();
    agg.record_message("Paris").await;
    agg.record_message("Paris").await;

    let report = run_tick(&reg, &notifier, sink.as_ref(), t0() + Duration::seconds(15)).await;
    assert_eq!(report.alerts_delivered, 1);
    assert_eq!(report.summaries_delivered, 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(chat, _)| *chat == ChatId(42)));
    assert!(sent[0].1.starts_with("Attention: 2 messages"));
    assert!(sent[1].1.contains("Paris: 2"));
    assert_eq!(sink.snapshot().summaries[&ChatId(-100)], 1);
}

#[tokio::test]
async fn telegram_notifier_delivers_alert_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .and(body_partial_json(serde_json::json!({ "chat_id": 7 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::new());
    let reg = registry(&[ChatIdentity::new(ChatId(7), None)], config(2, 3600), sink.clone());
    for _ in 0..3 {
        reg.get(ChatId(7)).unwrap().record_message("hi").await;
    }

    let notifier = TelegramNotifier::new("TOKEN".into()).with_api_base(server.uri());
    let report = run_tick(&reg, &notifier, sink.as_ref(), t0() + Duration::seconds(15)).await;
    assert_eq!(report.alerts_delivered, 1);
    assert_eq!(sink.alerts(ChatId(7)), 1);
}

/// Lets spawned tasks run until they park on a timer again.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn spawned_monitor_ticks_on_interval() {
    let sink = Arc::new(RecordingSink::new());
    let reg = Arc::new(registry(&[ChatIdentity::new(ChatId(5), None)], config(1, 3600), sink.clone()));
    let notifier = Arc::new(LogNotifier::new());
    let clock = Arc::new(ManualClock::new(t0()));

    let agg = reg.get(ChatId(5)).unwrap();
    agg.record_message("a").await;
    agg.record_message("b").await;
    clock.advance(Duration::seconds(15));

    let handle = spawn_monitor(
        reg.clone(),
        notifier.clone(),
        sink.clone(),
        clock.clone() as Arc<dyn Clock>,
        StdDuration::from_millis(20),
    );
    // Start the loop and let it swallow the immediate first tick.
    settle().await;
    assert!(notifier.sent().is_empty());

    tokio::time::advance(StdDuration::from_millis(20)).await;
    settle().await;
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, ChatId(5));
    assert_eq!(sink.alerts(ChatId(5)), 1);
    assert_eq!(agg.snapshot().total_messages, 0);

    // The clock did not move, so the next ticks are no-ops.
    tokio::time::advance(StdDuration::from_millis(100)).await;
    settle().await;
    assert_eq!(notifier.sent().len(), 1);

    agg.record_message("c").await;
    agg.record_message("d").await;
    clock.advance(Duration::seconds(15));
    tokio::time::advance(StdDuration::from_millis(30)).await;
    settle().await;
    assert_eq!(notifier.sent().len(), 2);
    assert_eq!(sink.alerts(ChatId(5)), 2);

    handle.abort();
}
