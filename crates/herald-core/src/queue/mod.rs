//! Queue module: scheduling gate, timed min-heap, and job state.

mod memory;
mod record;
mod state;

pub use memory::{DEFAULT_POLL_INTERVAL, InMemoryJobQueue};
pub use record::JobRecord;
pub use state::JobState;

use async_trait::async_trait;
use chrono::TimeDelta;

use crate::domain::{HeraldError, Job};
use crate::observability::QueueCounts;
use crate::ports::DeliveryId;

/// Result of handing a job to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// First time this job id was seen; it is now scheduled.
    Accepted,
    /// The id is already in the scheduled set. Nothing changed.
    Duplicate,
}

/// A due job leased to the dispatcher.
/// The dispatcher owns this lease and must either `ack` or `fail`.
///
/// Design intent:
/// - Queue manages state transitions (Scheduled -> Sending -> ...).
/// - Dispatcher performs the send and reports the result.
/// - The lease writes the terminal log entry, so every leased job ends up
///   with exactly one.
#[async_trait]
pub trait JobLease: Send {
    fn job(&self) -> &Job;

    /// How long after its effective due time the job became due in the queue.
    fn lateness(&self) -> TimeDelta;

    /// Mark delivered.
    async fn ack(self: Box<Self>, delivery_id: DeliveryId) -> Result<(), HeraldError>;

    /// Mark failed. Failed jobs are never retried.
    async fn fail(self: Box<Self>, error: String) -> Result<(), HeraldError>;
}

/// Queue port (interface).
/// In-memory only; this trait is the seam for a durable store later.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a job. A job id already in the scheduled set is a no-op.
    async fn enqueue(&self, job: Job) -> Result<Submission, HeraldError>;

    /// Lease one due job (waits until one is due).
    async fn lease(&self) -> Option<Box<dyn JobLease>>;

    async fn counts_by_state(&self) -> Result<QueueCounts, HeraldError>;

    /// Re-check due times now (after the clock moved, for instance).
    fn wake(&self);
}
