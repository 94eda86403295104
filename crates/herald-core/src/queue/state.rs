//! Job state machine for the queue.

use serde::{Deserialize, Serialize};

/// Job state.
///
/// State transitions:
/// - Scheduled -> Sending -> Delivered
/// - Scheduled -> Sending -> Failed
///
/// There is no way back. A failed job is not retried; it stays in the
/// scheduled set so the same row can never be submitted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for its send time (or due and waiting for the dispatcher).
    Scheduled,

    /// Leased by the dispatcher; a send is in flight.
    Sending,

    /// The messaging API accepted the message.
    Delivered,

    /// Sending failed, was refused before sending, or the window was missed.
    Failed,
}

impl JobState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Delivered | JobState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!JobState::Scheduled.is_terminal());
        assert!(!JobState::Sending.is_terminal());
        assert!(JobState::Delivered.is_terminal());
        assert!(JobState::Failed.is_terminal());
    }
}
