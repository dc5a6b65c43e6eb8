//! Request and response types for the kdw-daemon HTTP endpoints.
//!
//! No business logic lives here.

use chrono::{DateTime, Utc};
use kdw_reconcile::{CycleSummary, SubjectUpdate};
use kdw_schemas::{GameIdentity, PerformanceLog, Subject, SubjectId, UserId};
use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerState;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status, /v1/scheduler/*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub scheduler: SchedulerState,
    pub poll_interval_secs: u64,
    pub ratio_threshold: f64,
    pub provider: String,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_cycle: Option<CycleSummary>,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. "ALREADY_TRACKED".
    pub error: String,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// /v1/users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub id: UserId,
    pub auth_id: String,
}

// ---------------------------------------------------------------------------
// /v1/subjects
// ---------------------------------------------------------------------------

/// Subject as exposed over HTTP. The owner's phone number stays internal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectView {
    pub id: SubjectId,
    pub owner_id: Option<UserId>,
    pub puuid: String,
    pub player: String,
    #[serde(flatten)]
    pub identity: GameIdentity,
    pub active: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

impl From<Subject> for SubjectView {
    fn from(s: Subject) -> Self {
        Self {
            id: s.id,
            owner_id: s.owner_id,
            player: s.identity.display_name(),
            puuid: s.puuid,
            identity: s.identity,
            active: s.active,
            last_checked: s.last_checked,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub subject: SubjectView,
    /// `None` when seeding failed; the next cycle creates it.
    pub log: Option<PerformanceLog>,
}

// ---------------------------------------------------------------------------
// /v1/subjects/:id/refresh
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub subject_id: SubjectId,
    #[serde(flatten)]
    pub update: SubjectUpdate,
}
