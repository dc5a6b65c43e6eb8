//! Subject registration: resolve, dedupe, insert, seed.

use std::sync::Arc;

use kdw_schemas::{GameIdentity, NewSubject, PerformanceLog, Subject};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::ReconciliationEngine;
use crate::error::{ProviderError, RegistrationError};
use crate::ports::SubjectAdmin;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub auth_id: String,
    #[serde(flatten)]
    pub identity: GameIdentity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registered {
    pub subject: Subject,
    /// `None` when seeding failed; the next successful cycle creates it.
    pub log: Option<PerformanceLog>,
}

pub struct Registrar {
    admin: Arc<dyn SubjectAdmin>,
    engine: Arc<ReconciliationEngine>,
}

impl Registrar {
    pub fn new(admin: Arc<dyn SubjectAdmin>, engine: Arc<ReconciliationEngine>) -> Self {
        Self { admin, engine }
    }

    pub async fn register(&self, req: &Registration) -> Result<Registered, RegistrationError> {
        let owner = self
            .admin
            .find_user_by_auth_id(&req.auth_id)
            .await?
            .ok_or_else(|| RegistrationError::UnknownOwner(req.auth_id.clone()))?;

        let puuid = self
            .engine
            .resolve_puuid(&req.identity)
            .await
            .map_err(|e| match e {
                ProviderError::NotFound(_) => RegistrationError::IdentityNotFound(e),
                other => RegistrationError::Provider(other),
            })?;

        if let Some(existing) = self.admin.find_subject_by_puuid(&puuid).await? {
            return Err(RegistrationError::AlreadyTracked {
                puuid,
                subject_id: existing.id,
            });
        }

        let mut subject = self
            .admin
            .insert_subject(&NewSubject {
                owner_id: Some(owner.id),
                puuid,
                identity: req.identity.clone(),
            })
            .await?;

        info!(
            subject_id = subject.id,
            owner_id = owner.id,
            player = %subject.identity.display_name(),
            "subject registered"
        );

        // A brand-new subject has no log, so the notification gate cannot fire.
        let log = match self.engine.reconcile_subject(&subject).await {
            Ok(update) => {
                subject.last_checked = Some(update.checked_at);
                Some(PerformanceLog {
                    subject_id: subject.id,
                    match_id: update.match_id,
                    ratio: update.ratio,
                    observed_at: update.observed_at,
                })
            }
            Err(e) => {
                warn!(subject_id = subject.id, error = %e, "seeding performance log failed");
                None
            }
        };

        Ok(Registered { subject, log })
    }
}
