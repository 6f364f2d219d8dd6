// tests/ingest.rs
//
// Inbound routing: events from a source land in the right chat's aggregator;
// unmonitored chats and text-less messages are handled without errors.

use std::sync::Arc;

use chatwatch::aggregator::{AggregatorConfig, AlertThreshold, EntityRetention, DEFAULT_ALERT_TEMPLATE};
use chatwatch::analyze::stub::{FixedClassifier, WordsExtractor};
use chatwatch::analyze::TextAnalyzer;
use chatwatch::chat::{ChatId, ChatIdentity};
use chatwatch::ingest::{run_ingest, ChannelSource, MessageEvent};
use chatwatch::metrics::RecordingSink;
use chatwatch::MonitorRegistry;
use chrono::{Duration, Utc};

fn registry(sink: Arc<RecordingSink>) -> Arc<MonitorRegistry> {
    let cfg = AggregatorConfig {
        threshold: AlertThreshold::new(5).unwrap(),
        summary_window: Duration::minutes(15),
        top_k: 6,
        retention: EntityRetention::Accumulate,
        alert_template: DEFAULT_ALERT_TEMPLATE.to_string(),
    };
    let analyzer = Arc::new(TextAnalyzer::new(
        Arc::new(WordsExtractor),
        Arc::new(FixedClassifier::new("joy", 0.9)),
        Arc::new(FixedClassifier::new("positive", 0.8)),
    ));
    let ids = [
        ChatIdentity::new(ChatId(-1), None),
        ChatIdentity::new(ChatId(-2), None),
    ];
    Arc::new(MonitorRegistry::build(&ids, &cfg, analyzer, sink, Utc::now()))
}

#[tokio::test]
async fn events_are_routed_per_chat() {
    let sink = Arc::new(RecordingSink::new());
    let reg = registry(sink.clone());
    let (tx, source) = ChannelSource::new(16);

    let ingest = tokio::spawn(run_ingest(source, reg.clone()));

    tx.send(MessageEvent::new(ChatId(-1), "Moscow Paris")).await.unwrap();
    tx.send(MessageEvent::new(ChatId(-1), "Moscow")).await.unwrap();
    tx.send(MessageEvent::new(ChatId(-2), "Oslo")).await.unwrap();
    tx.send(MessageEvent::new(ChatId(-99), "ignored")).await.unwrap();
    tx.send(MessageEvent {
        chat_id: ChatId(-2),
        text: None,
        received_at: Utc::now(),
    })
    .await
    .unwrap();
    drop(tx);

    ingest.await.unwrap();

    let a = reg.get(ChatId(-1)).unwrap().snapshot();
    assert_eq!(a.total_messages, 2);
    assert_eq!(a.entities.count("Moscow"), Some(2));
    assert_eq!(a.entities.count("Paris"), Some(1));

    let b = reg.get(ChatId(-2)).unwrap().snapshot();
    assert_eq!(b.total_messages, 2);
    assert_eq!(b.entities.count("Oslo"), Some(1));

    assert!(!reg.contains(ChatId(-99)));
    assert_eq!(sink.messages(ChatId(-99)), 0);
    assert_eq!(sink.messages(ChatId(-1)), 2);
}

#[tokio::test]
async fn finished_source_with_no_events_returns() {
    let reg = registry(Arc::new(RecordingSink::new()));
    let (tx, source) = ChannelSource::new(1);
    drop(tx);
    run_ingest(source, reg.clone()).await;
    assert_eq!(reg.len(), 2);
    assert_eq!(reg.chat_ids(), vec![ChatId(-2), ChatId(-1)]);
}
