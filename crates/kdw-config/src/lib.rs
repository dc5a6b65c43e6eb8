//! kdw-config
//!
//! Layered YAML configuration for the watcher.
//!
//! - Documents merge in order: earlier docs are the base, later docs override.
//! - The merged document is canonicalised to JSON and hashed (SHA-256) so a run
//!   can be tied to the exact configuration it used.
//! - Literal secrets are refused. YAML carries env var NAMES only; values are
//!   resolved once at startup by [`secrets::resolve_secrets_for_mode`].

pub mod secrets;
pub mod settings;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub use secrets::{resolve_secrets_for_mode, resolve_secrets_with, ResolvedSecrets, RunMode};
pub use settings::{
    DaemonSettings, NotifySettings, ReconcileSettings, RiotSettings, SchedulerSettings,
    WatchSettings,
};

/// Known secret-like prefixes. A leaf string value starting with one of these
/// aborts loading with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "RGAPI-",     // Riot developer / production keys
    "sk-",        // generic bearer keys
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "xoxb-",      // Slack bot token
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Extract the typed settings with defaults applied, then validate them.
    pub fn settings(&self) -> Result<WatchSettings> {
        WatchSettings::from_config_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty document parses as null; treat it as "no overrides".
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Serialize with keys sorted at every level so key order in the YAML never
/// changes the hash.
fn canonicalize_json(v: &Value) -> Result<String> {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).context("canonical json serialize failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    // Twilio SIDs are a two-letter prefix followed by 32 hex chars. Env var
    // names such as "ACCOUNT_SID" must not trip the short prefixes.
    let twilio_sid = t.len() == 34
        && (t.starts_with("AC") || t.starts_with("SK"))
        && t[2..].chars().all(|c| c.is_ascii_hexdigit());
    if twilio_sid {
        return true;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_names_are_not_secrets() {
        assert!(!looks_like_secret("TWILIO_ACCOUNT_SID"));
        assert!(!looks_like_secret("ACCOUNT_SID_MAIN"));
        assert!(!looks_like_secret("RIOT_API_KEY"));
    }

    #[test]
    fn riot_key_literal_is_a_secret() {
        assert!(looks_like_secret("RGAPI-0000-1111-2222-3333"));
    }

    #[test]
    fn twilio_sid_literal_is_a_secret() {
        assert!(looks_like_secret("AC0123456789abcdef0123456789abcdef"));
    }

    #[test]
    fn empty_overlay_document_is_ignored() {
        let a = load_layered_yaml_from_strings(&["scheduler:\n  poll_interval_secs: 5\n"]).unwrap();
        let b =
            load_layered_yaml_from_strings(&["scheduler:\n  poll_interval_secs: 5\n", ""]).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
    }
}
