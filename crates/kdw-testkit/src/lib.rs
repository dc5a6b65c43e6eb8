//! kdw-testkit
//!
//! In-process fakes for every collaborator of the reconciliation engine, so
//! scenario tests run without Postgres, Riot or Twilio.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use kdw_reconcile::{EngineSettings, ReconciliationEngine};
use kdw_schemas::MatchResult;

mod memory_store;
mod recording_sender;
mod scripted_provider;

pub use memory_store::{CommitFault, InMemoryStore};
pub use recording_sender::RecordingSender;
pub use scripted_provider::ScriptedProvider;

pub const TEST_FROM_NUMBER: &str = "+15550000000";

/// Fixed match timestamp so assertions on `observed_at` are stable.
pub fn match_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 20, 30, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn match_result(puuid: &str, match_id: &str, kills: u32, deaths: u32, assists: u32) -> MatchResult {
    MatchResult {
        puuid: puuid.to_string(),
        match_id: match_id.to_string(),
        kills,
        deaths,
        assists,
        observed_at: match_time(),
    }
}

/// The three fakes plus an engine wired to them.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub sender: Arc<RecordingSender>,
    pub engine: Arc<ReconciliationEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new());
        let sender = Arc::new(RecordingSender::new());
        let engine = Arc::new(ReconciliationEngine::new(
            provider.clone(),
            store.clone(),
            sender.clone(),
            settings,
        ));
        Self {
            store,
            provider,
            sender,
            engine,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine settings with short timeouts for tests.
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        call_timeout: Duration::from_millis(500),
        sender_from: TEST_FROM_NUMBER.to_string(),
        ..EngineSettings::default()
    }
}
