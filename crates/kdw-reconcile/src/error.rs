//! Error taxonomy for the reconciliation core.
//!
//! Recovery policy per type:
//! - [`ProviderError`]: skip the subject this cycle; next cycle retries.
//! - [`StoreError`]: on listing, abort the cycle; per subject, abort only that
//!   subject with nothing committed.
//! - [`DeliveryError`]: logged and swallowed, never retried within a cycle.

use std::time::Duration;

use kdw_schemas::SubjectId;
use thiserror::Error;

/// The match provider failed or returned unusable data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("provider returned http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider payload malformed: {0}")]
    Malformed(String),

    #[error("provider has no record of {0}")]
    NotFound(String),

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// The provider resolved the display identity to a different account than
    /// the one bound to the subject. PUUIDs never change once assigned.
    #[error("provider reported puuid {got} but subject is bound to {expected}")]
    IdentityMismatch { expected: String, got: String },
}

/// The subject store failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store query failed: {0}")]
    Query(String),
}

/// The notification transport failed. Always best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("delivery transport error: {0}")]
    Transport(String),

    #[error("delivery rejected with http {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// Why one subject's pipeline stopped. Never escapes `run_cycle`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubjectError {
    #[error(transparent)]
    Fetch(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The only failure `run_cycle` surfaces: the active set could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
    #[error("listing active subjects failed: {0}")]
    ListActive(StoreError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("no owner with auth id {0}")]
    UnknownOwner(String),

    #[error("player identity could not be resolved: {0}")]
    IdentityNotFound(ProviderError),

    /// Provider failed for a reason other than an unknown identity.
    #[error("identity lookup failed: {0}")]
    Provider(ProviderError),

    #[error("puuid {puuid} is already tracked by subject {subject_id}")]
    AlreadyTracked { puuid: String, subject_id: SubjectId },

    #[error(transparent)]
    Store(#[from] StoreError),
}
