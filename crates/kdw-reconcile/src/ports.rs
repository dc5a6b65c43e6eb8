//! Collaborator boundaries consumed by the engine.
//!
//! All traits are object safe and `Send + Sync` so the engine can hold
//! `Arc<dyn ...>` across tokio tasks. Concrete adapters live in their own
//! crates (`kdw-db`, `kdw-riot`, `kdw-notify`); in-memory fakes live in
//! `kdw-testkit`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kdw_schemas::{
    GameIdentity, MatchResult, NewSubject, NewUser, Observation, PerformanceLog, Subject,
    SubjectId, User,
};

use crate::error::{DeliveryError, ProviderError, StoreError};

/// Upstream match-data provider.
#[async_trait]
pub trait MatchInfoProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolve `name#tag` on a region to the stable account id.
    async fn resolve_puuid(&self, identity: &GameIdentity) -> Result<String, ProviderError>;

    /// Most recent match of the player behind `identity`, with raw K/D/A.
    async fn latest_match(&self, identity: &GameIdentity) -> Result<MatchResult, ProviderError>;
}

/// One outbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub body: String,
}

/// Fire-and-forget message delivery.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

/// Result of one atomic commit: the log it replaced and the log it wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub previous: Option<PerformanceLog>,
    pub current: PerformanceLog,
}

/// The engine's view of persistence.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Subject>, StoreError>;

    async fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>, StoreError>;

    async fn get_log(&self, id: SubjectId) -> Result<Option<PerformanceLog>, StoreError>;

    /// Read the current log, upsert it AND set `last_checked`, as one atomic
    /// unit. Concurrent commits for the same subject serialize, so each one
    /// sees the log the previous one wrote. On error nothing is visible.
    async fn commit_observation(
        &self,
        id: SubjectId,
        observation: &Observation,
        checked_at: DateTime<Utc>,
    ) -> Result<Committed, StoreError>;
}

/// Administrative view used by registration and the HTTP surface.
#[async_trait]
pub trait SubjectAdmin: Send + Sync {
    async fn create_user(&self, new: &NewUser) -> Result<User, StoreError>;

    async fn find_user_by_auth_id(&self, auth_id: &str) -> Result<Option<User>, StoreError>;

    async fn find_subject_by_puuid(&self, puuid: &str) -> Result<Option<Subject>, StoreError>;

    /// `StoreError::Conflict` when the puuid is already tracked.
    async fn insert_subject(&self, new: &NewSubject) -> Result<Subject, StoreError>;

    /// Flip `active`. `StoreError::NotFound` when the subject does not exist.
    async fn toggle_active(&self, id: SubjectId) -> Result<Subject, StoreError>;

    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError>;
}
