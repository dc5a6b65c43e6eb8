//! Turn settings + resolved secrets into a live engine.
//!
//! Shared by the daemon binary and `kdw cycle`.

use std::sync::Arc;

use kdw_config::{ResolvedSecrets, RunMode, WatchSettings};
use kdw_notify::{TracingSender, TwilioSender};
use kdw_reconcile::{
    EngineSettings, MatchInfoProvider, NotificationSender, ReconciliationEngine, SubjectStore,
};
use kdw_riot::RiotMatchProvider;
use tracing::info;

pub fn engine_settings(settings: &WatchSettings, secrets: &ResolvedSecrets) -> EngineSettings {
    EngineSettings {
        ratio_threshold: settings.reconcile.ratio_threshold,
        call_timeout: settings.reconcile.call_timeout(),
        max_concurrency: settings.reconcile.max_concurrency,
        sender_from: secrets
            .twilio
            .as_ref()
            .map(|t| t.from_number.clone())
            .unwrap_or_default(),
        default_recipient: secrets.default_recipient.clone(),
    }
}

pub fn match_provider(settings: &WatchSettings, secrets: &ResolvedSecrets) -> Arc<dyn MatchInfoProvider> {
    let key = secrets.riot_api_key.clone();
    match &settings.riot.base_url {
        Some(base) => Arc::new(RiotMatchProvider::new_with_base_url(key, base.clone())),
        None => Arc::new(RiotMatchProvider::new(key)),
    }
}

/// `LIVE` sends through Twilio. `DRY_RUN` only logs, even when Twilio
/// credentials happen to be present.
pub fn notification_sender(
    settings: &WatchSettings,
    secrets: &ResolvedSecrets,
) -> Arc<dyn NotificationSender> {
    match (secrets.mode, &secrets.twilio) {
        (RunMode::Live, Some(t)) => {
            let (sid, token) = (t.account_sid.clone(), t.auth_token.clone());
            match &settings.notify.base_url {
                Some(base) => Arc::new(TwilioSender::new_with_base_url(sid, token, base.clone())),
                None => Arc::new(TwilioSender::new(sid, token)),
            }
        }
        _ => Arc::new(TracingSender),
    }
}

pub fn build_engine(
    settings: &WatchSettings,
    secrets: &ResolvedSecrets,
    store: Arc<dyn SubjectStore>,
) -> ReconciliationEngine {
    let provider = match_provider(settings, secrets);
    let sender = notification_sender(settings, secrets);
    info!(
        mode = secrets.mode.as_str(),
        provider = provider.name(),
        sender = sender.name(),
        ratio_threshold = settings.reconcile.ratio_threshold,
        "engine wired"
    );
    ReconciliationEngine::new(provider, store, sender, engine_settings(settings, secrets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(mode: RunMode, vars: &[(&str, &str)]) -> ResolvedSecrets {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        kdw_config::resolve_secrets_with(&WatchSettings::default(), mode, |k| env.get(k).cloned())
            .unwrap()
    }

    const FULL: &[(&str, &str)] = &[
        ("RIOT_API_KEY", "key"),
        ("TWILIO_ACCOUNT_SID", "AC1"),
        ("TWILIO_AUTH_TOKEN", "tok"),
        ("TWILIO_MY_NUMBER", "+15550000001"),
        ("TWILIO_VIRTUAL_NUMBER", "+15550000002"),
    ];

    #[test]
    fn dry_run_never_uses_twilio() {
        let secrets = resolve(RunMode::DryRun, FULL);
        let sender = notification_sender(&WatchSettings::default(), &secrets);
        assert_eq!(sender.name(), "dry-run");
    }

    #[test]
    fn live_uses_twilio() {
        let secrets = resolve(RunMode::Live, FULL);
        let sender = notification_sender(&WatchSettings::default(), &secrets);
        assert_eq!(sender.name(), "twilio");
    }

    #[test]
    fn engine_settings_follow_config_and_secrets() {
        let mut settings = WatchSettings::default();
        settings.reconcile.ratio_threshold = 2.5;
        settings.reconcile.max_concurrency = 8;
        let es = engine_settings(&settings, &resolve(RunMode::Live, FULL));
        assert_eq!(es.ratio_threshold, 2.5);
        assert_eq!(es.max_concurrency, 8);
        assert_eq!(es.sender_from, "+15550000001");
        assert_eq!(es.default_recipient.as_deref(), Some("+15550000002"));
    }

    #[test]
    fn dry_run_without_twilio_has_empty_sender_number() {
        let es = engine_settings(
            &WatchSettings::default(),
            &resolve(RunMode::DryRun, &[("RIOT_API_KEY", "key")]),
        );
        assert!(es.sender_from.is_empty());
        assert!(es.default_recipient.is_none());
    }
}
