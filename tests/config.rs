use std::time::Duration;

use assert_matches::assert_matches;

use hybrid_finder::config::{Config, ConfigLoader};
use hybrid_finder::error::HybridError;
use hybrid_finder::query::PlatformBias;

#[test]
fn parse_config_with_search_section() {
    let config: Config = serde_json::from_str(
        r#"{
            "email": "lab@example.org",
            "workers": 8,
            "checkpoint": "out/progress.json",
            "retry": { "max_attempts": 5, "backoff_secs": 1 },
            "search": {
                "environment": "wastewater",
                "pathogens": ["Klebsiella"],
                "bias": "long-read",
                "target": 10,
                "checkpoint": "out/search.json"
            }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.email, "lab@example.org");
    assert_eq!(resolved.orchestrator.workers, 8);
    assert_eq!(resolved.orchestrator.checkpoint_every, 5);
    assert_eq!(resolved.retry.max_attempts, 5);
    assert_eq!(resolved.retry.backoff, Duration::from_secs(1));
    assert_eq!(resolved.checkpoint_path.as_str(), "out/progress.json");
    assert_eq!(resolved.search_checkpoint_path.as_str(), "out/search.json");
    assert_eq!(resolved.filters.environment.as_deref(), Some("wastewater"));
    assert_eq!(resolved.filters.pathogens, vec!["Klebsiella".to_string()]);
    assert_eq!(resolved.filters.bias, PlatformBias::LongRead);
    assert_eq!(resolved.target, 10);
    assert_eq!(resolved.page_size, 50);
}

#[test]
fn zero_workers_rejected() {
    let config = Config {
        workers: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(HybridError::InvalidSetting { name, .. }) if name == "workers"
    );
}

#[test]
fn blank_api_key_is_ignored() {
    let config = Config {
        api_key: Some("   ".to_string()),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert!(resolved.api_key.is_none());
}

#[test]
fn missing_config_file_is_an_error() {
    assert_matches!(
        ConfigLoader::resolve(Some("/nonexistent/hybrid-finder.json")),
        Err(HybridError::ConfigRead(_))
    );
}
