//! Riot Games API-backed `MatchInfoProvider`.
//!
//! Three calls per latest-match lookup: account by riot id, most recent match
//! id for the puuid, then the match detail. The api key is passed in by the
//! caller; never log it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kdw_reconcile::{MatchInfoProvider, ProviderError};
use kdw_schemas::{GameIdentity, MatchResult};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

mod payload;

pub use payload::{AccountDto, MatchDto};

#[derive(Debug, Clone)]
pub struct RiotMatchProvider {
    api_key: String,
    http: reqwest::Client,
    /// `None` means `https://{region}.api.riotgames.com`.
    base_url: Option<String>,
}

impl RiotMatchProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
            base_url: None,
        }
    }

    /// Every region is routed to `base_url`. Used for proxies and tests.
    pub fn new_with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
            base_url: Some(base_url),
        }
    }

    fn host(&self, region: &str) -> String {
        match &self.base_url {
            Some(b) => b.trim_end_matches('/').to_string(),
            None => format!("https://{region}.api.riotgames.com"),
        }
    }

    /// Segments are percent-encoded, so names with spaces survive.
    fn url(&self, region: &str, segments: &[&str]) -> Result<Url, ProviderError> {
        let host = self.host(region);
        let mut url = Url::parse(&host)
            .map_err(|e| ProviderError::Transport(format!("bad provider url {host}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Transport(format!("provider url {host} cannot be a base")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        debug!(path = url.path(), "riot request");
        let resp = self
            .http
            .get(url)
            .query(query)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::NotFound(body));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| ProviderError::Malformed(e.without_url().to_string()))
    }

    pub async fn account(&self, identity: &GameIdentity) -> Result<AccountDto, ProviderError> {
        let url = self.url(
            &identity.region,
            &[
                "riot",
                "account",
                "v1",
                "accounts",
                "by-riot-id",
                identity.game_name.as_str(),
                identity.tagline.as_str(),
            ],
        )?;
        self.get_json(url, &[]).await
    }

    /// Most recent match ids, newest first.
    pub async fn match_ids(
        &self,
        region: &str,
        puuid: &str,
        count: u8,
    ) -> Result<Vec<String>, ProviderError> {
        let url = self.url(
            region,
            &["lol", "match", "v5", "matches", "by-puuid", puuid, "ids"],
        )?;
        let count = count.clamp(1, 100).to_string();
        self.get_json(url, &[("start", "0"), ("count", count.as_str())])
            .await
    }

    pub async fn match_detail(&self, region: &str, match_id: &str) -> Result<MatchDto, ProviderError> {
        let url = self.url(region, &["lol", "match", "v5", "matches", match_id])?;
        self.get_json(url, &[]).await
    }
}

#[async_trait]
impl MatchInfoProvider for RiotMatchProvider {
    fn name(&self) -> &'static str {
        "riot"
    }

    async fn resolve_puuid(&self, identity: &GameIdentity) -> Result<String, ProviderError> {
        Ok(self.account(identity).await?.puuid)
    }

    async fn latest_match(&self, identity: &GameIdentity) -> Result<MatchResult, ProviderError> {
        let puuid = self.resolve_puuid(identity).await?;
        let ids = self.match_ids(&identity.region, &puuid, 1).await?;
        let Some(match_id) = ids.into_iter().next() else {
            return Err(ProviderError::Malformed(format!(
                "no matches on record for {}",
                identity.display_name()
            )));
        };
        let detail = self.match_detail(&identity.region, &match_id).await?;
        detail.result_for(&puuid)
    }
}

/// `gameEndTimestamp` when present, else `gameCreation`; both epoch millis.
pub(crate) fn match_time(end_ms: Option<i64>, creation_ms: Option<i64>) -> Result<DateTime<Utc>, ProviderError> {
    end_ms
        .or(creation_ms)
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| ProviderError::Malformed("match has no usable timestamp".to_string()))
}
