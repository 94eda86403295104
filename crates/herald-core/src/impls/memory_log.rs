//! InMemoryLogSink - プロセス内で保持する送信ログ
//!
//! オペレーターが見る・消す・CSV で持ち出すためのもの。永続化はしない。

use std::io;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::domain::errors::ReportError;
use crate::domain::log::{LogEntry, LogKind, LogOutcome};
use crate::ports::LogSink;

#[derive(Debug, Default)]
pub struct InMemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl InMemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSink for InMemoryLogSink {
    fn record(&self, entry: LogEntry) {
        self.lock().push(entry);
    }

    fn entries(&self, kind: Option<LogKind>) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|e| kind.is_none_or(|k| e.kind() == k))
            .cloned()
            .collect()
    }

    fn clear(&self, kind: LogKind) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| e.kind() != kind);
        before - entries.len()
    }
}

/// Flat CSV shape of a log entry.
#[derive(Debug, Serialize)]
struct LogRow<'a> {
    kind: &'static str,
    job_id: &'a str,
    mobile_number: &'a str,
    name: &'a str,
    media_url: &'a str,
    scheduled_at: String,
    recorded_at: String,
    delivery_id: &'a str,
    error: &'a str,
}

impl<'a> From<&'a LogEntry> for LogRow<'a> {
    fn from(entry: &'a LogEntry) -> Self {
        let (delivery_id, error) = match &entry.outcome {
            LogOutcome::Scheduled => ("", ""),
            LogOutcome::Delivered { delivery_id } => (delivery_id.as_str(), ""),
            LogOutcome::Failed { error } => ("", error.as_str()),
        };
        Self {
            kind: entry.kind().as_str(),
            job_id: entry.job_id.as_str(),
            mobile_number: &entry.recipient_phone,
            name: entry.recipient_name.as_deref().unwrap_or(""),
            media_url: entry.media_reference.as_deref().unwrap_or(""),
            scheduled_at: entry.scheduled_at.to_rfc3339(),
            recorded_at: entry.recorded_at.to_rfc3339(),
            delivery_id,
            error,
        }
    }
}

/// Write entries as CSV (header row included). Returns the number of rows written.
pub fn export_csv<W: io::Write>(entries: &[LogEntry], writer: W) -> Result<usize, ReportError> {
    let mut csv = csv::Writer::from_writer(writer);
    for entry in entries {
        csv.serialize(LogRow::from(entry))?;
    }
    csv.flush()?;
    Ok(entries.len())
}
