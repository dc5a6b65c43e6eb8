//! kdw-daemon library target.
//!
//! Exposes the router, state, scheduler and adapter wiring for integration
//! tests and for the `kdw` CLI. The binary `main.rs` depends on this target.

pub mod api_types;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod wiring;

use anyhow::{Context, Result};
use kdw_config::{RunMode, WatchSettings};

/// Comma-separated YAML paths, base first.
pub const ENV_CONFIG_PATHS: &str = "KDW_CONFIG_PATHS";
/// `LIVE` or `DRY_RUN`; unset means `DRY_RUN`.
pub const ENV_RUN_MODE: &str = "KDW_RUN_MODE";
/// Overrides `daemon.addr`.
pub const ENV_DAEMON_ADDR: &str = "KDW_DAEMON_ADDR";

/// Settings from the layered YAML named by `KDW_CONFIG_PATHS`, or built-in
/// defaults when the variable is unset. Returns the config hash when files
/// were loaded.
pub fn settings_from_env() -> Result<(WatchSettings, Option<String>)> {
    let Some(raw) = std::env::var(ENV_CONFIG_PATHS).ok().filter(|v| !v.trim().is_empty())
    else {
        return Ok((WatchSettings::default(), None));
    };
    let paths: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let loaded = kdw_config::load_layered_yaml(&paths)?;
    let settings = loaded.settings()?;
    Ok((settings, Some(loaded.config_hash)))
}

pub fn run_mode_from_env() -> Result<RunMode> {
    match std::env::var(ENV_RUN_MODE) {
        Ok(v) if !v.trim().is_empty() => {
            RunMode::parse(&v).with_context(|| format!("invalid {ENV_RUN_MODE}"))
        }
        _ => Ok(RunMode::DryRun),
    }
}
