use super::*;
use crate::model::MatchSignal;

fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("sync.yaml");
    std::fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn missing_path_yields_defaults() {
    let config = load_config(None).expect("default config");
    assert_eq!(config, SyncConfig::default());
    assert_eq!(config.min_score, 0.50);
    assert_eq!(config.noise_tokens, vec!["helm", "chart", "opendesk"]);
    assert_eq!(config.signal_scores.score(MatchSignal::ExactChart), 1.00);
    assert_eq!(config.signal_scores.score(MatchSignal::AppInstance), 0.50);
}

#[test]
fn partial_config_keeps_other_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_config(
        dir.path(),
        "min_score: 0.7\nnoise_tokens: [helm, chart]\nfuzzy:\n  max_edit_distance: 1\n",
    );
    let config = load_config(Some(&path)).expect("load config");
    assert_eq!(config.min_score, 0.7);
    assert_eq!(config.noise_tokens, vec!["helm", "chart"]);
    assert_eq!(config.fuzzy.max_edit_distance, 1);
    assert_eq!(config.fuzzy.min_token_len, 4);
    assert_eq!(config.document_file_name, DEFAULT_DOCUMENT_FILE_NAME);
    assert!(config.aliases.contains_key("collabora-online"));
}

#[test]
fn json_config_is_accepted() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_config(dir.path(), r#"{"min_score": 0.6, "semver_versions": true}"#);
    let config = load_config(Some(&path)).expect("load config");
    assert_eq!(config.min_score, 0.6);
    assert!(config.semver_versions);
}

#[test]
fn out_of_range_threshold_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_config(dir.path(), "min_score: 1.5\n");
    let err = load_config(Some(&path)).expect_err("threshold out of range");
    assert!(err.to_string().contains("min_score"), "{err}");
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = write_config(dir.path(), "threshold: 0.5\n");
    assert!(load_config(Some(&path)).is_err());
}

#[test]
fn document_file_name_must_be_bare() {
    let config = SyncConfig {
        document_file_name: "../escape.yaml".to_string(),
        ..SyncConfig::default()
    };
    assert!(validate_config(&config).is_err());
}

#[test]
fn stub_round_trips_through_loader() {
    let dir = tempfile::tempdir().expect("temp dir");
    let stub = config_stub().expect("stub");
    let path = write_config(dir.path(), &stub);
    let config = load_config(Some(&path)).expect("load stub");
    assert_eq!(config, SyncConfig::default());
}
