//! kdw-notify
//!
//! `NotificationSender` implementations:
//! - [`TwilioSender`]: SMS through the Twilio Messages REST API.
//! - [`TracingSender`]: logs the message and reports success (`DRY_RUN`).

use async_trait::async_trait;
use kdw_reconcile::{DeliveryError, NotificationSender, OutboundMessage};
use serde::Deserialize;
use tracing::{debug, info};

pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Twilio-backed SMS sender.
///
/// Credentials are passed in by the caller; never log them.
#[derive(Clone)]
pub struct TwilioSender {
    account_sid: String,
    auth_token: String,
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for TwilioSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioSender")
            .field("account_sid", &"<REDACTED>")
            .field("auth_token", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TwilioSender {
    pub fn new(account_sid: String, auth_token: String) -> Self {
        Self::new_with_base_url(account_sid, auth_token, TWILIO_API_BASE.to_string())
    }

    pub fn new_with_base_url(account_sid: String, auth_token: String, base_url: String) -> Self {
        Self {
            account_sid,
            auth_token,
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid
        )
    }
}

/// Fields of the Twilio error body worth surfacing.
#[derive(Debug, Deserialize)]
struct TwilioError {
    code: Option<i64>,
    message: Option<String>,
}

fn rejection_body(raw: String) -> String {
    match serde_json::from_str::<TwilioError>(&raw) {
        Ok(TwilioError {
            code: Some(c),
            message: Some(m),
        }) => format!("code={c} {m}"),
        Ok(TwilioError {
            message: Some(m), ..
        }) => m,
        _ => raw,
    }
}

#[async_trait]
impl NotificationSender for TwilioSender {
    fn name(&self) -> &'static str {
        "twilio"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("From", message.from.as_str()),
                ("To", message.to.as_str()),
                ("Body", message.body.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: rejection_body(raw),
            });
        }
        debug!(status = status.as_u16(), "twilio accepted message");
        Ok(())
    }
}

/// Dry-run sender: the message is logged at info and never leaves the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSender;

#[async_trait]
impl NotificationSender for TracingSender {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        info!(to = %message.to, body = %message.body, "DRY_RUN notification (not sent)");
        Ok(())
    }
}
