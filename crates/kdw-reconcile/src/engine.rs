//! ReconciliationEngine: one pass over every active subject.
//!
//! Per subject: fetch latest match, derive ratio, commit log + `last_checked`
//! atomically (the commit also yields the log it replaced), then hand any
//! crossing to the [`Notifier`].
//! Subjects run on a bounded fan-out and never see each other's failures.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use kdw_schemas::{GameIdentity, MatchResult, Observation, Subject, SubjectId};
use tracing::{debug, error, info, warn};

use crate::error::{CycleError, ProviderError, StoreError, SubjectError};
use crate::notifier::Notifier;
use crate::policy::{detect_crossing, kda_ratio, DEFAULT_RATIO_THRESHOLD};
use crate::ports::{MatchInfoProvider, NotificationSender, SubjectStore};
use crate::report::{CycleReport, NotificationOutcome, SubjectOutcome, SubjectUpdate};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Exclusive: ratios strictly below this are crossings.
    pub ratio_threshold: f64,
    /// Bound on each provider fetch and each notification send.
    pub call_timeout: Duration,
    pub max_concurrency: usize,
    pub sender_from: String,
    pub default_recipient: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            call_timeout: Duration::from_secs(10),
            max_concurrency: 4,
            sender_from: String::new(),
            default_recipient: None,
        }
    }
}

pub struct ReconciliationEngine {
    provider: Arc<dyn MatchInfoProvider>,
    store: Arc<dyn SubjectStore>,
    notifier: Notifier,
    ratio_threshold: f64,
    call_timeout: Duration,
    max_concurrency: usize,
}

impl ReconciliationEngine {
    pub fn new(
        provider: Arc<dyn MatchInfoProvider>,
        store: Arc<dyn SubjectStore>,
        sender: Arc<dyn NotificationSender>,
        settings: EngineSettings,
    ) -> Self {
        let notifier = Notifier::new(
            sender,
            settings.sender_from,
            settings.default_recipient,
            settings.call_timeout,
        );
        Self {
            provider,
            store,
            notifier,
            ratio_threshold: settings.ratio_threshold,
            call_timeout: settings.call_timeout,
            max_concurrency: settings.max_concurrency.max(1),
        }
    }

    pub fn ratio_threshold(&self) -> f64 {
        self.ratio_threshold
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Run one full cycle.
    ///
    /// Only a failure to list active subjects is returned as `Err`; every
    /// per-subject failure is recorded in the report and logged.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();

        let subjects = self.store.list_active().await.map_err(|e| {
            error!(error = %e, "cycle aborted: could not list active subjects");
            CycleError::ListActive(e)
        })?;

        debug!(subjects = subjects.len(), "cycle started");

        let mut outcomes: Vec<SubjectOutcome> = stream::iter(subjects)
            .map(|subject| async move {
                let result = self.reconcile_subject(&subject).await;
                if let Err(e) = &result {
                    warn!(subject_id = subject.id, error = %e, "subject skipped this cycle");
                }
                SubjectOutcome {
                    subject_id: subject.id,
                    result,
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        outcomes.sort_by_key(|o| o.subject_id);

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };

        info!(
            subjects = report.outcomes.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            notified = report.notified(),
            "cycle complete"
        );

        Ok(report)
    }

    /// Refresh one subject by id, whether or not it is active.
    pub async fn reconcile_subject_by_id(&self, id: SubjectId) -> Result<SubjectUpdate, SubjectError> {
        let subject = self
            .store
            .get_subject(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("subject {id}")))?;
        self.reconcile_subject(&subject).await
    }

    /// The per-subject pipeline. Nothing is written unless the fetch
    /// succeeds, and notification runs only after the commit.
    pub async fn reconcile_subject(&self, subject: &Subject) -> Result<SubjectUpdate, SubjectError> {
        let latest = self.fetch_latest(&subject.identity).await?;
        if latest.puuid != subject.puuid {
            return Err(ProviderError::IdentityMismatch {
                expected: subject.puuid.clone(),
                got: latest.puuid,
            }
            .into());
        }

        let observation = Observation {
            ratio: kda_ratio(latest.kills, latest.deaths, latest.assists),
            match_id: latest.match_id,
            observed_at: latest.observed_at,
        };

        let checked_at = Utc::now();
        // The gate compares against the log this commit replaced, never an
        // earlier read: a concurrent cycle may have written in between.
        let committed = self
            .store
            .commit_observation(subject.id, &observation, checked_at)
            .await?;

        let previous_ratio = committed.previous.as_ref().map(|log| log.ratio);
        debug!(
            subject_id = subject.id,
            match_id = %observation.match_id,
            ratio = observation.ratio,
            previous_ratio = ?previous_ratio,
            "observation committed"
        );

        let notification =
            match detect_crossing(previous_ratio, observation.ratio, self.ratio_threshold) {
                Some(crossing) => self.notifier.deliver(subject, &observation, &crossing).await,
                None => NotificationOutcome::NotTriggered,
            };

        Ok(SubjectUpdate {
            previous_ratio,
            ratio: observation.ratio,
            match_id: observation.match_id,
            observed_at: observation.observed_at,
            created_log: committed.previous.is_none(),
            checked_at,
            notification,
        })
    }

    /// Provider identity lookup under the same call timeout as fetches.
    pub async fn resolve_puuid(&self, identity: &GameIdentity) -> Result<String, ProviderError> {
        match tokio::time::timeout(self.call_timeout, self.provider.resolve_puuid(identity)).await {
            Ok(r) => r,
            Err(_) => Err(ProviderError::Timeout(self.call_timeout)),
        }
    }

    async fn fetch_latest(&self, identity: &GameIdentity) -> Result<MatchResult, ProviderError> {
        match tokio::time::timeout(self.call_timeout, self.provider.latest_match(identity)).await {
            Ok(r) => r,
            Err(_) => Err(ProviderError::Timeout(self.call_timeout)),
        }
    }
}
