//! Job record: the job plus its queue bookkeeping.

use chrono::{DateTime, TimeDelta, Utc};

use super::JobState;
use crate::domain::Job;

/// Metadata + job for one entry in the queue.
///
/// Design:
/// - This is the "single source of truth" for job state.
/// - Queue structures (heap/ready) hold JobIds only.
/// - All state transitions happen here.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job: Job,
    pub state: JobState,

    /// When the gate accepted the job.
    pub submitted_at: DateTime<Utc>,

    /// When the job was found due and moved to the ready list.
    pub promoted_at: Option<DateTime<Utc>>,

    /// Start of the send window lateness is counted from.
    pub window_opened_at: Option<DateTime<Utc>>,

    /// When the dispatcher picked it up.
    pub leased_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,
    pub delivery_id: Option<String>,
    pub last_error: Option<String>,
}

impl JobRecord {
    pub fn new(job: Job, submitted_at: DateTime<Utc>) -> Self {
        Self {
            job,
            state: JobState::Scheduled,
            submitted_at,
            promoted_at: None,
            window_opened_at: None,
            leased_at: None,
            finished_at: None,
            delivery_id: None,
            last_error: None,
        }
    }

    /// A job scheduled in the past is due the moment it is submitted.
    pub fn effective_due(&self) -> DateTime<Utc> {
        self.job.scheduled_at().to_utc().max(self.submitted_at)
    }

    /// How late the promotion was relative to the start of the send window.
    pub fn lateness(&self) -> TimeDelta {
        let opened = self.window_opened_at.unwrap_or_else(|| self.effective_due());
        self.promoted_at
            .map(|at| at - opened)
            .unwrap_or_default()
            .max(TimeDelta::zero())
    }

    /// Move to the ready list.
    ///
    /// `dispatcher_free_at` is when the dispatcher last came back for work.
    /// Time before that was spent sending or pacing and is not lateness.
    pub fn promote(&mut self, now: DateTime<Utc>, dispatcher_free_at: Option<DateTime<Utc>>) {
        let due = self.effective_due();
        self.window_opened_at = Some(dispatcher_free_at.map_or(due, |free| free.max(due)));
        self.promoted_at = Some(now);
    }

    pub fn start_sending(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Sending;
        self.leased_at = Some(now);
    }

    pub fn mark_delivered(&mut self, delivery_id: String, now: DateTime<Utc>) {
        self.state = JobState::Delivered;
        self.delivery_id = Some(delivery_id);
        self.finished_at = Some(now);
    }

    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.state = JobState::Failed;
        self.last_error = Some(error);
        self.finished_at = Some(now);
    }
}
