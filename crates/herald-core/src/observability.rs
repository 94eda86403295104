//! Observability - キューの状態を数えるだけの軽いビュー

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub scheduled: usize,
    pub sending: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.scheduled + self.sending + self.delivered + self.failed
    }

    /// Nothing waiting and nothing in flight.
    pub fn is_settled(&self) -> bool {
        self.scheduled == 0 && self.sending == 0
    }
}

impl std::fmt::Display for QueueCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scheduled={} sending={} delivered={} failed={}",
            self.scheduled, self.sending, self.delivered, self.failed
        )
    }
}
