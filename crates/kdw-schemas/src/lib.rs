//! kdw-schemas
//!
//! Shared data shapes for tracked players and their most recent match outcome.
//! No IO, no policy. Every other crate speaks in these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database id of a tracked subject.
pub type SubjectId = i64;

/// Database id of a subject owner.
pub type UserId = i64;

/// Display identity of a player as typed by a human: `name#tag` on a routing region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameIdentity {
    pub game_name: String,
    pub tagline: String,
    /// Routing host label used by the match provider (e.g. `"americas"`).
    pub region: String,
}

impl GameIdentity {
    pub fn new(
        game_name: impl Into<String>,
        tagline: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            game_name: game_name.into(),
            tagline: tagline.into(),
            region: region.into(),
        }
    }

    /// `name#tag`, the form players recognise.
    pub fn display_name(&self) -> String {
        format!("{}#{}", self.game_name, self.tagline)
    }
}

/// One tracked player binding.
///
/// `puuid` is immutable once assigned. `last_checked` is written only by the
/// reconciliation engine, together with the performance log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub owner_id: Option<UserId>,
    pub puuid: String,
    pub identity: GameIdentity,
    pub active: bool,
    pub last_checked: Option<DateTime<Utc>>,
    /// Owner's phone number, joined in by the store. Not a column of the subject.
    pub notify_to: Option<String>,
}

/// Fields required to insert a new subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubject {
    pub owner_id: Option<UserId>,
    pub puuid: String,
    pub identity: GameIdentity,
}

/// Most recently observed match result for a subject. At most one per subject;
/// each reconciliation overwrites it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceLog {
    pub subject_id: SubjectId,
    /// Opaque provider match identifier (e.g. `"NA1_5284768552"`).
    pub match_id: String,
    /// (kills + assists) / max(deaths, 1). Never negative.
    pub ratio: f64,
    /// When the match was played, not when it was checked.
    pub observed_at: DateTime<Utc>,
}

/// The values written into a [`PerformanceLog`] by one successful reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub match_id: String,
    pub ratio: f64,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn into_log(self, subject_id: SubjectId) -> PerformanceLog {
        PerformanceLog {
            subject_id,
            match_id: self.match_id,
            ratio: self.ratio,
            observed_at: self.observed_at,
        }
    }
}

/// Raw latest-match payload as reported by the match provider.
///
/// The ratio is deliberately NOT precomputed here; the reconciliation engine
/// owns the derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub puuid: String,
    pub match_id: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub observed_at: DateTime<Utc>,
}

/// Owner of one or more subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Opaque lookup key handed to the owner at creation.
    pub auth_id: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub signup_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub auth_id: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}
