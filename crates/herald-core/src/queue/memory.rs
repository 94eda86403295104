//! In-memory queue implementation.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use super::{JobLease, JobQueue, JobRecord, JobState, Submission};
use crate::domain::{HeraldError, Job, JobId, LogEntry};
use crate::observability::QueueCounts;
use crate::ports::{Clock, DeliveryId, LogSink};

/// Upper bound on how long `lease` sleeps before re-reading the clock.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Scheduled job entry for the priority queue.
///
/// We use Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
/// `seq` keeps submission order among jobs due at the same instant.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledJob {
    due_at: DateTime<Utc>,
    seq: u64,
    job_id: JobId,
}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering: earlier times have higher priority
        (other.due_at, other.seq).cmp(&(self.due_at, self.seq))
    }
}

/// In-memory queue state.
struct InMemoryQueueState {
    /// All job records. The key set is the scheduled set: an id enters once
    /// and is never removed for the life of the process.
    records: HashMap<JobId, JobRecord>,

    /// Due jobs waiting for the dispatcher (JobIds only).
    ready: VecDeque<JobId>,

    /// Jobs not yet due.
    scheduled: BinaryHeap<ScheduledJob>,

    next_seq: u64,

    /// Set once the first lease is handed out.
    has_leased: bool,

    /// When the dispatcher last came back for work after a lease.
    dispatcher_free_at: Option<DateTime<Utc>>,
}

impl InMemoryQueueState {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            ready: VecDeque::new(),
            scheduled: BinaryHeap::new(),
            next_seq: 0,
            has_leased: false,
            dispatcher_free_at: None,
        }
    }

    /// Move jobs from scheduled to ready if their time has come.
    fn promote_due_jobs(&mut self, now: DateTime<Utc>) {
        let free_at = self.dispatcher_free_at;
        while let Some(entry) = self.scheduled.peek() {
            if entry.due_at > now {
                break; // Heap is sorted, so we can stop
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            if let Some(record) = self.records.get_mut(&entry.job_id)
                && record.state == JobState::Scheduled
            {
                record.promote(now, free_at);
                self.ready.push_back(entry.job_id);
            }
        }
    }

    /// Get counts by state for observability.
    fn counts_by_state(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.records.values() {
            match record.state {
                JobState::Scheduled => counts.scheduled += 1,
                JobState::Sending => counts.sending += 1,
                JobState::Delivered => counts.delivered += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// In-memory queue implementation.
///
/// Doubles as the scheduling gate: `enqueue` checks the scheduled set,
/// registers the job and writes its `scheduled` log entry under one lock.
pub struct InMemoryJobQueue {
    state: Arc<Mutex<InMemoryQueueState>>,
    notify: Arc<Notify>,
    clock: Arc<dyn Clock>,
    log: Arc<dyn LogSink>,
    poll_interval: Duration,
}

impl InMemoryJobQueue {
    pub fn new(clock: Arc<dyn Clock>, log: Arc<dyn LogSink>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryQueueState::new())),
            notify: Arc::new(Notify::new()),
            clock,
            log,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Snapshot of one job's record.
    pub async fn record(&self, job_id: &JobId) -> Result<JobRecord, HeraldError> {
        let state = self.state.lock().await;
        state
            .records
            .get(job_id)
            .cloned()
            .ok_or_else(|| HeraldError::JobNotFound(job_id.to_string()))
    }

    pub async fn contains(&self, job_id: &JobId) -> bool {
        self.state.lock().await.records.contains_key(job_id)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<Submission, HeraldError> {
        {
            let mut state = self.state.lock().await;
            if state.records.contains_key(job.job_id()) {
                debug!(job_id = %job.job_id(), "duplicate submission ignored");
                return Ok(Submission::Duplicate);
            }

            let now = self.clock.now();
            let record = JobRecord::new(job.clone(), now);
            let seq = state.next_seq;
            state.next_seq += 1;
            state.scheduled.push(ScheduledJob {
                due_at: record.effective_due(),
                seq,
                job_id: job.job_id().clone(),
            });
            state.records.insert(job.job_id().clone(), record);

            // Logged under the lock so the scheduled set and the log never disagree.
            self.log.record(LogEntry::scheduled(&job, now));
        }

        info!(
            job_id = %job.job_id(),
            scheduled_at = %job.scheduled_at(),
            "job scheduled"
        );

        // Notify the waiting dispatcher
        self.notify.notify_one();
        Ok(Submission::Accepted)
    }

    async fn lease(&self) -> Option<Box<dyn JobLease>> {
        {
            // Jobs that came due while the previous lease was out waited on us, not on the queue.
            let mut state = self.state.lock().await;
            if state.has_leased {
                state.dispatcher_free_at = Some(self.clock.now());
            }
        }

        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                let now = self.clock.now();
                state.promote_due_jobs(now);

                while let Some(job_id) = state.ready.pop_front() {
                    let Some(record) = state.records.get_mut(&job_id) else {
                        continue;
                    };
                    record.start_sending(now);
                    let lease = InMemoryLease {
                        job: record.job.clone(),
                        lateness: record.lateness(),
                        queue: Arc::clone(&self.state),
                        clock: Arc::clone(&self.clock),
                        log: Arc::clone(&self.log),
                    };
                    state.has_leased = true;
                    return Some(Box::new(lease));
                }

                // No due jobs - check when the next one is
                state.scheduled.peek().map(|entry| entry.due_at)
            };

            // Wait for notification OR next due time (re-reading the clock at least every poll interval)
            if let Some(due_at) = next_wake {
                let until_due = (due_at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
                let wait = until_due.min(self.poll_interval);
                tokio::select! {
                    _ = self.notify.notified() => {},
                    _ = tokio::time::sleep(wait) => {},
                }
            } else {
                self.notify.notified().await;
            }
        }
    }

    async fn counts_by_state(&self) -> Result<QueueCounts, HeraldError> {
        let state = self.state.lock().await;
        Ok(state.counts_by_state())
    }

    fn wake(&self) {
        self.notify.notify_one();
    }
}

/// Lease implementation for InMemoryJobQueue.
struct InMemoryLease {
    job: Job,
    lateness: TimeDelta,
    queue: Arc<Mutex<InMemoryQueueState>>,
    clock: Arc<dyn Clock>,
    log: Arc<dyn LogSink>,
}

#[async_trait]
impl JobLease for InMemoryLease {
    fn job(&self) -> &Job {
        &self.job
    }

    fn lateness(&self) -> TimeDelta {
        self.lateness
    }

    async fn ack(self: Box<Self>, delivery_id: DeliveryId) -> Result<(), HeraldError> {
        let now = self.clock.now();
        {
            let mut state = self.queue.lock().await;
            let record = state
                .records
                .get_mut(self.job.job_id())
                .ok_or_else(|| HeraldError::JobNotFound(self.job.job_id().to_string()))?;
            record.mark_delivered(delivery_id.clone(), now);
        }
        self.log
            .record(LogEntry::delivered(&self.job, delivery_id, now));
        Ok(())
    }

    async fn fail(self: Box<Self>, error: String) -> Result<(), HeraldError> {
        let now = self.clock.now();
        {
            let mut state = self.queue.lock().await;
            let record = state
                .records
                .get_mut(self.job.job_id())
                .ok_or_else(|| HeraldError::JobNotFound(self.job.job_id().to_string()))?;
            record.mark_failed(error.clone(), now);
        }
        self.log.record(LogEntry::failed(&self.job, error, now));
        Ok(())
    }
}
