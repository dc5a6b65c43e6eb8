//! Deterministic `MatchInfoProvider` driven by a per-identity script.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use kdw_reconcile::{MatchInfoProvider, ProviderError};
use kdw_schemas::{GameIdentity, MatchResult};

#[derive(Default)]
struct Script {
    puuids: HashMap<String, Result<String, ProviderError>>,
    matches: HashMap<String, Result<MatchResult, ProviderError>>,
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    fetch_calls: HashMap<String, usize>,
}

/// Identities are keyed by `name#tag`. An identity with no script answers
/// `ProviderError::NotFound`.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn key(identity: &GameIdentity) -> String {
    identity.display_name()
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_puuid(&self, identity: &GameIdentity, puuid: &str) {
        self.lock()
            .puuids
            .insert(key(identity), Ok(puuid.to_string()));
    }

    pub fn fail_puuid(&self, identity: &GameIdentity, err: ProviderError) {
        self.lock().puuids.insert(key(identity), Err(err));
    }

    /// Script both the account lookup and the latest match.
    pub fn set_match(&self, identity: &GameIdentity, result: MatchResult) {
        let mut g = self.lock();
        g.puuids
            .entry(key(identity))
            .or_insert_with(|| Ok(result.puuid.clone()));
        g.matches.insert(key(identity), Ok(result));
    }

    pub fn fail_match(&self, identity: &GameIdentity, err: ProviderError) {
        self.lock().matches.insert(key(identity), Err(err));
    }

    /// Every call for `identity` sleeps this long before answering.
    pub fn delay_for(&self, identity: &GameIdentity, delay: Duration) {
        self.lock().delays.insert(key(identity), delay);
    }

    pub fn set_default_delay(&self, delay: Duration) {
        self.lock().default_delay = Some(delay);
    }

    pub fn fetch_calls(&self, identity: &GameIdentity) -> usize {
        self.lock()
            .fetch_calls
            .get(&key(identity))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetch_calls(&self) -> usize {
        self.lock().fetch_calls.values().sum()
    }

    /// Highest number of concurrently running `latest_match` calls seen.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn delay(&self, k: &str) -> Option<Duration> {
        let g = self.lock();
        g.delays.get(k).copied().or(g.default_delay)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MatchInfoProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn resolve_puuid(&self, identity: &GameIdentity) -> Result<String, ProviderError> {
        let k = key(identity);
        if let Some(d) = self.delay(&k) {
            tokio::time::sleep(d).await;
        }
        let answer = self.lock().puuids.get(&k).cloned();
        answer.unwrap_or_else(|| Err(ProviderError::NotFound(k)))
    }

    async fn latest_match(&self, identity: &GameIdentity) -> Result<MatchResult, ProviderError> {
        let k = key(identity);
        *self.lock().fetch_calls.entry(k.clone()).or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(d) = self.delay(&k) {
            tokio::time::sleep(d).await;
        }
        let answer = self.lock().matches.get(&k).cloned();
        answer.unwrap_or_else(|| Err(ProviderError::NotFound(k)))
    }
}
