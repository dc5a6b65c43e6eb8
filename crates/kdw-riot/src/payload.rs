//! Wire shapes for the subset of the Riot account/match payloads we read.
//!
//! Unknown fields are ignored; missing required fields fail decoding, which
//! the provider reports as `ProviderError::Malformed`.

use kdw_reconcile::ProviderError;
use kdw_schemas::MatchResult;
use serde::Deserialize;

use crate::match_time;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub puuid: String,
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default)]
    pub tag_line: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchDto {
    pub metadata: MatchMetadata,
    pub info: MatchInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    pub match_id: String,
    /// Participant puuids, in the same order as `info.participants`.
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    #[serde(default)]
    pub game_creation: Option<i64>,
    #[serde(default)]
    pub game_end_timestamp: Option<i64>,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub puuid: Option<String>,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
}

impl MatchDto {
    /// Participant row for `puuid`: by its own puuid field first, then by
    /// position in `metadata.participants`.
    pub fn participant(&self, puuid: &str) -> Option<&Participant> {
        self.info
            .participants
            .iter()
            .find(|p| p.puuid.as_deref() == Some(puuid))
            .or_else(|| {
                let idx = self.metadata.participants.iter().position(|p| p == puuid)?;
                self.info.participants.get(idx)
            })
    }

    pub fn result_for(&self, puuid: &str) -> Result<MatchResult, ProviderError> {
        let p = self.participant(puuid).ok_or_else(|| {
            ProviderError::Malformed(format!(
                "match {} has no participant {puuid}",
                self.metadata.match_id
            ))
        })?;
        Ok(MatchResult {
            puuid: puuid.to_string(),
            match_id: self.metadata.match_id.clone(),
            kills: p.kills,
            deaths: p.deaths,
            assists: p.assists,
            observed_at: match_time(self.info.game_end_timestamp, self.info.game_creation)?,
        })
    }
}
