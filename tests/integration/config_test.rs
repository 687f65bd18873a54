//! Configuration loading

use momentum_radar::config::{Config, SourceMode};
use std::io::Write;

#[test]
fn test_example_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml.example");
    let config = Config::load(path).unwrap();

    assert_eq!(config.source.mode, SourceMode::Synthetic);
    assert_eq!(config.worker.fast_interval_secs, 30);
    assert_eq!(config.clustering.seed, 42);
    assert_eq!(config.scoring.bounds.price_momentum, (-20.0, 20.0));
    assert!(config.alerts.telegram.is_none());
}

#[test]
fn test_partial_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        [worker]
        fast_top_n = 7

        [broadcast]
        epsilon = 0.5
        "#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.worker.fast_top_n, 7);
    assert_eq!(config.worker.page_size, 100);
    assert_eq!(config.broadcast.epsilon, 0.5);
}

#[test]
fn test_config_round_trips_through_toml_without_secrets() {
    let mut config = Config::default();
    config.source.api_key = Some("secret-key".to_string());

    let rendered = toml::to_string_pretty(&config).unwrap();
    assert!(!rendered.contains("secret-key"));

    let parsed: Config = toml::from_str(&rendered).unwrap();
    assert_eq!(parsed.worker.full_interval_secs, config.worker.full_interval_secs);
    assert!(parsed.source.api_key.is_none());
}
