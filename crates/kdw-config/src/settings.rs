//! Typed view over the merged config JSON.
//!
//! Every key is optional in YAML; absent keys take the defaults below.
//! `validate()` rejects values that would make the scheduler or engine
//! misbehave (zero interval, zero timeout, NaN threshold, ...).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use kdw_reconcile::DEFAULT_RATIO_THRESHOLD;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:8899";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub scheduler: SchedulerSettings,
    pub reconcile: ReconcileSettings,
    pub riot: RiotSettings,
    pub notify: NotifySettings,
    pub daemon: DaemonSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub poll_interval_secs: u64,
    /// Fire the first cycle immediately instead of after one interval.
    pub run_on_start: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            run_on_start: false,
        }
    }
}

impl SchedulerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Exclusive upper bound: a ratio strictly below this is a crossing.
    pub ratio_threshold: f64,
    /// Bound on every outbound provider / notification call.
    pub call_timeout_secs: u64,
    /// Subjects processed concurrently within one cycle.
    pub max_concurrency: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl ReconcileSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiotSettings {
    /// Overrides `https://{region}.api.riotgames.com`. Used by tests and proxies.
    pub base_url: Option<String>,
    pub keys_env: RiotKeysEnv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiotKeysEnv {
    pub api_key: String,
}

impl Default for RiotKeysEnv {
    fn default() -> Self {
        Self {
            api_key: "RIOT_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub base_url: Option<String>,
    pub keys_env: NotifyKeysEnv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyKeysEnv {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    /// Fallback recipient when a subject's owner has no phone number.
    pub to_number: String,
}

impl Default for NotifyKeysEnv {
    fn default() -> Self {
        Self {
            account_sid: "TWILIO_ACCOUNT_SID".to_string(),
            auth_token: "TWILIO_AUTH_TOKEN".to_string(),
            from_number: "TWILIO_MY_NUMBER".to_string(),
            to_number: "TWILIO_VIRTUAL_NUMBER".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub addr: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            addr: DEFAULT_DAEMON_ADDR.to_string(),
        }
    }
}

impl DaemonSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.addr
            .parse()
            .with_context(|| format!("daemon.addr is not a socket address: {}", self.addr))
    }
}

impl WatchSettings {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let settings: WatchSettings = serde_json::from_value(config_json.clone())
            .context("config does not match the settings schema")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.poll_interval_secs == 0 {
            bail!("CONFIG_INVALID scheduler.poll_interval_secs must be > 0");
        }
        if self.reconcile.call_timeout_secs == 0 {
            bail!("CONFIG_INVALID reconcile.call_timeout_secs must be > 0");
        }
        if self.reconcile.max_concurrency == 0 {
            bail!("CONFIG_INVALID reconcile.max_concurrency must be >= 1");
        }
        let t = self.reconcile.ratio_threshold;
        if !t.is_finite() || t < 0.0 {
            bail!("CONFIG_INVALID reconcile.ratio_threshold must be finite and >= 0 (got {t})");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_yields_defaults() {
        let s = WatchSettings::from_config_json(&json!({})).unwrap();
        assert_eq!(s, WatchSettings::default());
        assert_eq!(s.scheduler.poll_interval(), Duration::from_secs(600));
        assert_eq!(s.reconcile.ratio_threshold, 1.0);
        assert_eq!(s.reconcile.call_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn threshold_default_matches_engine_default() {
        assert_eq!(
            ReconcileSettings::default().ratio_threshold,
            kdw_reconcile::EngineSettings::default().ratio_threshold
        );
        assert_eq!(DEFAULT_RATIO_THRESHOLD, kdw_reconcile::DEFAULT_RATIO_THRESHOLD);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let s = WatchSettings::from_config_json(&json!({
            "scheduler": { "poll_interval_secs": 10 }
        }))
        .unwrap();
        assert_eq!(s.scheduler.poll_interval_secs, 10);
        assert!(!s.scheduler.run_on_start);
        assert_eq!(s.reconcile.max_concurrency, DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    fn zero_interval_rejected() {
        let err = WatchSettings::from_config_json(&json!({
            "scheduler": { "poll_interval_secs": 0 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn negative_threshold_rejected() {
        let err = WatchSettings::from_config_json(&json!({
            "reconcile": { "ratio_threshold": -0.5 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("ratio_threshold"));
    }

    #[test]
    fn zero_concurrency_rejected() {
        assert!(WatchSettings::from_config_json(&json!({
            "reconcile": { "max_concurrency": 0 }
        }))
        .is_err());
    }

    #[test]
    fn daemon_addr_parses() {
        let s = DaemonSettings::default();
        assert_eq!(s.socket_addr().unwrap().port(), 8899);
        let bad = DaemonSettings {
            addr: "nope".to_string(),
        };
        assert!(bad.socket_addr().is_err());
    }
}
