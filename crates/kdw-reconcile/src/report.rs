//! Per-cycle outcome reporting.
//!
//! Each subject's result is independent; the report aggregates them without
//! ever turning a per-subject failure into a cycle failure.

use chrono::{DateTime, Utc};
use kdw_schemas::SubjectId;
use serde::{Deserialize, Serialize};

use crate::error::SubjectError;

/// What happened to the notification for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// Gate did not fire.
    NotTriggered,
    Sent,
    /// Sender returned an error or timed out. Logged and swallowed.
    Failed(String),
    /// Gate fired but there was nobody to send to.
    Skipped(String),
}

impl NotificationOutcome {
    pub fn was_triggered(&self) -> bool {
        !matches!(self, NotificationOutcome::NotTriggered)
    }
}

/// A subject whose pipeline committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectUpdate {
    pub previous_ratio: Option<f64>,
    pub ratio: f64,
    pub match_id: String,
    pub observed_at: DateTime<Utc>,
    /// True when this commit created the subject's first log.
    pub created_log: bool,
    pub checked_at: DateTime<Utc>,
    pub notification: NotificationOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectOutcome {
    pub subject_id: SubjectId,
    pub result: Result<SubjectUpdate, SubjectError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sorted by subject id.
    pub outcomes: Vec<SubjectOutcome>,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// Subjects whose notification was actually delivered.
    pub fn notified(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    &o.result,
                    Ok(SubjectUpdate {
                        notification: NotificationOutcome::Sent,
                        ..
                    })
                )
            })
            .count()
    }

    pub fn outcome_for(&self, subject_id: SubjectId) -> Option<&SubjectOutcome> {
        self.outcomes.iter().find(|o| o.subject_id == subject_id)
    }

    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            started_at: self.started_at,
            finished_at: self.finished_at,
            subjects: self.outcomes.len(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            notified: self.notified(),
            results: self.outcomes.iter().map(SubjectSummary::from).collect(),
        }
    }
}

/// Serializable projection of a [`CycleReport`] for the HTTP surface and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub subjects: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub notified: usize,
    pub results: Vec<SubjectSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub subject_id: SubjectId,
    pub ok: bool,
    pub ratio: Option<f64>,
    pub match_id: Option<String>,
    pub notification: Option<NotificationOutcome>,
    pub error: Option<String>,
}

impl From<&SubjectOutcome> for SubjectSummary {
    fn from(o: &SubjectOutcome) -> Self {
        match &o.result {
            Ok(u) => SubjectSummary {
                subject_id: o.subject_id,
                ok: true,
                ratio: Some(u.ratio),
                match_id: Some(u.match_id.clone()),
                notification: Some(u.notification.clone()),
                error: None,
            },
            Err(e) => SubjectSummary {
                subject_id: o.subject_id,
                ok: false,
                ratio: None,
                match_id: None,
                notification: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    fn update(notification: NotificationOutcome) -> SubjectUpdate {
        SubjectUpdate {
            previous_ratio: Some(2.0),
            ratio: 0.5,
            match_id: "NA1_1".to_string(),
            observed_at: Utc::now(),
            created_log: false,
            checked_at: Utc::now(),
            notification,
        }
    }

    #[test]
    fn counts_and_summary() {
        let now = Utc::now();
        let report = CycleReport {
            started_at: now,
            finished_at: now,
            outcomes: vec![
                SubjectOutcome {
                    subject_id: 1,
                    result: Ok(update(NotificationOutcome::Sent)),
                },
                SubjectOutcome {
                    subject_id: 2,
                    result: Err(ProviderError::Malformed("no participants".to_string()).into()),
                },
                SubjectOutcome {
                    subject_id: 3,
                    result: Ok(update(NotificationOutcome::Failed("boom".to_string()))),
                },
            ],
        };
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.notified(), 1);

        let s = report.summary();
        assert_eq!(s.subjects, 3);
        assert!(!s.results[1].ok);
        assert_eq!(
            s.results[1].error.as_deref(),
            Some("provider payload malformed: no participants")
        );
    }

    #[test]
    fn notification_outcome_serializes_tagged() {
        let v = serde_json::to_value(NotificationOutcome::Failed("x".to_string())).unwrap();
        assert_eq!(v["kind"], "failed");
        assert_eq!(v["detail"], "x");
        let v = serde_json::to_value(NotificationOutcome::Sent).unwrap();
        assert_eq!(v["kind"], "sent");
    }
}
