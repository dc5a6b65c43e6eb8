//! Scenario: layered config hash is stable
//!
//! GREEN when:
//! - Loading the same YAML twice yields the same hash.
//! - Reordering keys within YAML does not change the hash.
//! - An overlay that changes a value changes the hash and wins the merge.

use kdw_config::{load_layered_yaml, load_layered_yaml_from_strings};

const BASE_YAML: &str = r#"
scheduler:
  poll_interval_secs: 600
  run_on_start: false
reconcile:
  ratio_threshold: 1.0
  call_timeout_secs: 10
riot:
  keys_env:
    api_key: "RIOT_API_KEY"
"#;

const BASE_YAML_REORDERED: &str = r#"
riot:
  keys_env:
    api_key: "RIOT_API_KEY"
reconcile:
  call_timeout_secs: 10
  ratio_threshold: 1.0
scheduler:
  run_on_start: false
  poll_interval_secs: 600
"#;

const FAST_OVERLAY: &str = r#"
scheduler:
  poll_interval_secs: 10
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        a.config_hash, b.config_hash,
        "canonicalisation must sort keys before hashing"
    );
}

#[test]
fn overlay_changes_hash_and_overrides_value() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, FAST_OVERLAY]).unwrap();
    assert_ne!(base.config_hash, layered.config_hash);

    let settings = layered.settings().unwrap();
    assert_eq!(settings.scheduler.poll_interval_secs, 10);
    // untouched keys survive the merge
    assert_eq!(settings.reconcile.call_timeout_secs, 10);
    assert_eq!(settings.riot.keys_env.api_key, "RIOT_API_KEY");
}

#[test]
fn loads_from_files_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let fast = dir.path().join("fast.yaml");
    std::fs::write(&base, BASE_YAML).unwrap();
    std::fs::write(&fast, FAST_OVERLAY).unwrap();

    let base_s = base.to_str().unwrap();
    let fast_s = fast.to_str().unwrap();
    let from_files = load_layered_yaml(&[base_s, fast_s]).unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, FAST_OVERLAY]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);
}

#[test]
fn missing_file_reports_path() {
    let err = load_layered_yaml(&["/definitely/not/here.yaml"]).unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.yaml"));
}
