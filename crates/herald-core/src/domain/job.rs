//! Job record: one normalized, schedulable outbound message.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::ids::JobId;

/// One scheduled message.
///
/// Built once by the job builder from one source row and never mutated.
/// Fields are private so nothing downstream can rewrite a job after its
/// identity has been computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    job_id: JobId,
    row_index: usize,
    recipient_phone: String,
    recipient_name: Option<String>,
    media_reference: Option<String>,
    scheduled_at: DateTime<FixedOffset>,
}

impl Job {
    pub fn new(
        job_id: JobId,
        row_index: usize,
        recipient_phone: impl Into<String>,
        recipient_name: Option<String>,
        media_reference: Option<String>,
        scheduled_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            job_id,
            row_index,
            recipient_phone: recipient_phone.into(),
            recipient_name,
            media_reference,
            scheduled_at,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn row_index(&self) -> usize {
        self.row_index
    }

    /// Canonical phone; empty when the row had nothing usable.
    pub fn recipient_phone(&self) -> &str {
        &self.recipient_phone
    }

    pub fn recipient_name(&self) -> Option<&str> {
        self.recipient_name.as_deref()
    }

    pub fn media_reference(&self) -> Option<&str> {
        self.media_reference.as_deref()
    }

    pub fn scheduled_at(&self) -> DateTime<FixedOffset> {
        self.scheduled_at
    }

    /// A job with no phone can still be scheduled; it fails at send time.
    pub fn is_sendable(&self) -> bool {
        !self.recipient_phone.is_empty()
    }
}
