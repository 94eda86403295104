//! Log entries: outcome records the operator sees (scheduled / delivered / failed).
//!
//! `Outcome` の代わり。送信 1 回の結果をそのまま記録し、後から
//! 「なぜ届かなかったか」を説明できるようにする。

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::job::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Scheduled,
    Delivered,
    Failed,
}

impl LogKind {
    pub const ALL: [LogKind; 3] = [LogKind::Scheduled, LogKind::Delivered, LogKind::Failed];

    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::Scheduled => "scheduled",
            LogKind::Delivered => "delivered",
            LogKind::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogOutcome {
    /// Accepted by the scheduling gate. Written before anything is sent.
    Scheduled,

    /// The messaging API accepted the message.
    Delivered { delivery_id: String },

    /// Anything that kept the message from going out.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub job_id: JobId,
    pub recipient_phone: String,
    pub recipient_name: Option<String>,
    pub media_reference: Option<String>,
    pub scheduled_at: DateTime<FixedOffset>,
    pub recorded_at: DateTime<Utc>,
    pub outcome: LogOutcome,
}

impl LogEntry {
    fn from_job(job: &Job, recorded_at: DateTime<Utc>, outcome: LogOutcome) -> Self {
        Self {
            job_id: job.job_id().clone(),
            recipient_phone: job.recipient_phone().to_string(),
            recipient_name: job.recipient_name().map(str::to_string),
            media_reference: job.media_reference().map(str::to_string),
            scheduled_at: job.scheduled_at(),
            recorded_at,
            outcome,
        }
    }

    pub fn scheduled(job: &Job, recorded_at: DateTime<Utc>) -> Self {
        Self::from_job(job, recorded_at, LogOutcome::Scheduled)
    }

    pub fn delivered(job: &Job, delivery_id: impl Into<String>, recorded_at: DateTime<Utc>) -> Self {
        Self::from_job(
            job,
            recorded_at,
            LogOutcome::Delivered {
                delivery_id: delivery_id.into(),
            },
        )
    }

    pub fn failed(job: &Job, error: impl Into<String>, recorded_at: DateTime<Utc>) -> Self {
        Self::from_job(
            job,
            recorded_at,
            LogOutcome::Failed {
                error: error.into(),
            },
        )
    }

    pub fn kind(&self) -> LogKind {
        match self.outcome {
            LogOutcome::Scheduled => LogKind::Scheduled,
            LogOutcome::Delivered { .. } => LogKind::Delivered,
            LogOutcome::Failed { .. } => LogKind::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind() != LogKind::Scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let outcome = LogOutcome::Delivered {
            delivery_id: "SM1".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "delivered", "delivery_id": "SM1"}));
    }

    #[test]
    fn kind_follows_outcome() {
        let offset = chrono::FixedOffset::east_opt(0).unwrap();
        let at = offset.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let job = Job::new(JobId::from("a"), 0, "+1", None, None, at);
        let now = Utc::now();

        assert_eq!(LogEntry::scheduled(&job, now).kind(), LogKind::Scheduled);
        assert!(!LogEntry::scheduled(&job, now).is_terminal());
        assert_eq!(LogEntry::delivered(&job, "SM1", now).kind(), LogKind::Delivered);
        assert!(LogEntry::failed(&job, "boom", now).is_terminal());
    }
}
