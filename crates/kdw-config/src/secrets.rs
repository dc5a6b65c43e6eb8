//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"RIOT_API_KEY"`).
//! - At startup, callers invoke [`resolve_secrets_for_mode`] once and pass the
//!   returned [`ResolvedSecrets`] into constructors.
//! - `Debug` output redacts every value.
//! - Error messages reference the env var NAME, never the value.
//!
//! # Mode-aware enforcement
//! | Mode      | Required                                              |
//! |-----------|-------------------------------------------------------|
//! | `LIVE`    | Riot api key, Twilio account sid, auth token, from number |
//! | `DRY_RUN` | Riot api key (notifications are logged, not sent)     |
//!
//! The fallback recipient number is optional in both modes: owners with a
//! phone number on file are notified directly.

use anyhow::{bail, Result};

use crate::settings::WatchSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Live,
    DryRun,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Live => "LIVE",
            RunMode::DryRun => "DRY_RUN",
        }
    }

    /// Case-insensitive; accepts `DRY-RUN` and `DRYRUN` as spellings of `DRY_RUN`.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIVE" => Ok(RunMode::Live),
            "DRY_RUN" | "DRY-RUN" | "DRYRUN" => Ok(RunMode::DryRun),
            other => bail!(
                "SECRETS_UNKNOWN_MODE: unrecognised mode '{}'; expected one of: LIVE | DRY_RUN",
                other
            ),
        }
    }
}

/// Twilio credentials. Present only when every required piece resolved.
#[derive(Clone)]
pub struct TwilioSecrets {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl std::fmt::Debug for TwilioSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioSecrets")
            .field("account_sid", &"<REDACTED>")
            .field("auth_token", &"<REDACTED>")
            .field("from_number", &"<REDACTED>")
            .finish()
    }
}

/// All runtime-resolved secrets for one process.
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub mode: RunMode,
    pub riot_api_key: String,
    /// `None` in `DRY_RUN` when the Twilio variables are not all set.
    pub twilio: Option<TwilioSecrets>,
    pub default_recipient: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("mode", &self.mode)
            .field("riot_api_key", &"<REDACTED>")
            .field("twilio", &self.twilio)
            .field(
                "default_recipient",
                &self.default_recipient.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Resolve against the process environment.
pub fn resolve_secrets_for_mode(settings: &WatchSettings, mode: RunMode) -> Result<ResolvedSecrets> {
    resolve_secrets_with(settings, mode, |name| std::env::var(name).ok())
}

/// Resolve against an arbitrary lookup. Blank values count as unset.
pub fn resolve_secrets_with<F>(
    settings: &WatchSettings,
    mode: RunMode,
    lookup: F,
) -> Result<ResolvedSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let resolve = |var: &str| -> Option<String> {
        lookup(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let riot_var = settings.riot.keys_env.api_key.as_str();
    let Some(riot_api_key) = resolve(riot_var) else {
        bail!(
            "SECRETS_MISSING mode={}: required env var '{}' (riot api_key) is not set or empty",
            mode.as_str(),
            riot_var
        );
    };

    let names = &settings.notify.keys_env;
    let account_sid = resolve(&names.account_sid);
    let auth_token = resolve(&names.auth_token);
    let from_number = resolve(&names.from_number);

    let twilio = match (account_sid, auth_token, from_number) {
        (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioSecrets {
            account_sid,
            auth_token,
            from_number,
        }),
        (sid, token, from) => {
            if mode == RunMode::Live {
                let missing = [
                    (sid.is_none(), names.account_sid.as_str()),
                    (token.is_none(), names.auth_token.as_str()),
                    (from.is_none(), names.from_number.as_str()),
                ]
                .into_iter()
                .find(|(absent, _)| *absent)
                .map(|(_, name)| name)
                .unwrap_or_default();
                bail!(
                    "SECRETS_MISSING mode=LIVE: required env var '{}' (twilio) is not set or empty",
                    missing
                );
            }
            None
        }
    };

    Ok(ResolvedSecrets {
        mode,
        riot_api_key,
        twilio,
        default_recipient: resolve(&names.to_number),
    })
}
