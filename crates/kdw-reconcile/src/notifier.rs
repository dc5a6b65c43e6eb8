//! Turns a crossing event into one outbound message.
//!
//! Delivery is best-effort: every failure is folded into a
//! [`NotificationOutcome`] and never reaches the committed state.

use std::sync::Arc;
use std::time::Duration;

use kdw_schemas::{Observation, Subject};
use tracing::{info, warn};

use crate::error::DeliveryError;
use crate::policy::{crossing_message, match_url, CrossingEvent};
use crate::ports::{NotificationSender, OutboundMessage};
use crate::report::NotificationOutcome;

pub struct Notifier {
    sender: Arc<dyn NotificationSender>,
    from: String,
    default_recipient: Option<String>,
    call_timeout: Duration,
}

impl Notifier {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        from: impl Into<String>,
        default_recipient: Option<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            sender,
            from: from.into(),
            default_recipient,
            call_timeout,
        }
    }

    /// Owner's phone first, configured fallback second.
    pub fn recipient_for<'a>(&'a self, subject: &'a Subject) -> Option<&'a str> {
        subject
            .notify_to
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.default_recipient.as_deref())
    }

    pub fn compose(&self, subject: &Subject, observation: &Observation) -> String {
        let url = match_url(&observation.match_id, &subject.identity.region);
        crossing_message(&subject.identity.display_name(), &url)
    }

    /// Send one message for `crossing`. Exactly one send attempt, no retry.
    pub async fn deliver(
        &self,
        subject: &Subject,
        observation: &Observation,
        crossing: &CrossingEvent,
    ) -> NotificationOutcome {
        let Some(to) = self.recipient_for(subject) else {
            warn!(
                subject_id = subject.id,
                "crossing detected but no recipient is configured; notification skipped"
            );
            return NotificationOutcome::Skipped("no recipient".to_string());
        };

        let message = OutboundMessage {
            from: self.from.clone(),
            to: to.to_string(),
            body: self.compose(subject, observation),
        };

        let result = match tokio::time::timeout(self.call_timeout, self.sender.send(&message)).await
        {
            Ok(r) => r,
            Err(_) => Err(DeliveryError::Timeout(self.call_timeout)),
        };

        match result {
            Ok(()) => {
                info!(
                    subject_id = subject.id,
                    sender = self.sender.name(),
                    previous_ratio = crossing.previous_ratio,
                    ratio = crossing.current_ratio,
                    "crossing notification sent"
                );
                NotificationOutcome::Sent
            }
            Err(e) => {
                warn!(
                    subject_id = subject.id,
                    sender = self.sender.name(),
                    error = %e,
                    "crossing notification failed"
                );
                NotificationOutcome::Failed(e.to_string())
            }
        }
    }
}
