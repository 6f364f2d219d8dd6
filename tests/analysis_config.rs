// tests/analysis_config.rs
//
// Building the analyzer from configuration, using the sample files shipped
// under config/ and deliberately broken temp files.

use std::io::Write as _;
use std::path::PathBuf;

use chatwatch::analyze::build_from_config;
use chatwatch::config::AnalysisConfig;

fn sample(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config").join(name)
}

#[tokio::test]
async fn sample_models_load_and_analyze() {
    let cfg = AnalysisConfig {
        entity_patterns_path: Some(sample("entities.json")),
        topic_model_path: Some(sample("topics.toml")),
        ..AnalysisConfig::default()
    };
    let analyzer = build_from_config(&cfg).unwrap();
    assert!(analyzer.has_topic_model());

    let text = "Great match in Moscow tonight, what a goal!";
    let entities = analyzer.extract_entities(text).await.unwrap();
    assert_eq!(entities.iter().filter(|e| e.as_str() == "Moscow").count(), 1, "{entities:?}");

    let topics = analyzer.infer_topics(text).await.unwrap();
    assert_eq!(topics[0].topic, "football");
    assert!((topics.iter().map(|t| t.weight).sum::<f32>() - 1.0).abs() < 1e-4);

    let sentiment = analyzer.classify_sentiment(text).await.unwrap();
    assert!((0.0..=1.0).contains(&sentiment.score));
}

#[test]
fn default_config_is_lexicon_only() {
    let analyzer = build_from_config(&AnalysisConfig::default()).unwrap();
    assert!(!analyzer.has_topic_model());
}

#[test]
fn broken_pattern_file_fails_startup() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, r#"{{"patterns":[{{"regex":"(unclosed","entity":"X"}}]}}"#).unwrap();

    let cfg = AnalysisConfig {
        entity_patterns_path: Some(f.path().to_path_buf()),
        ..AnalysisConfig::default()
    };
    let err = build_from_config(&cfg).err().expect("invalid regex must be rejected");
    assert!(format!("{err:#}").contains("invalid entity regex"));
}

#[test]
fn missing_topic_model_file_fails_startup() {
    let cfg = AnalysisConfig {
        topic_model_path: Some(PathBuf::from("/nonexistent/topics.toml")),
        ..AnalysisConfig::default()
    };
    assert!(build_from_config(&cfg).is_err());
}
