//! Audit report stores.
//!
//! - CsvReportStore: ディレクトリに 1 バッチ 1 ファイルで書き出す
//! - MemoryReportStore: テスト用

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, PoisonError};

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use tracing::debug;

use crate::domain::audit::AuditRow;
use crate::domain::errors::ReportError;
use crate::ports::ReportStore;

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\-]").unwrap());

/// Give up on suffixing after this many collisions.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Replace anything that is not a word character or `-` with `_`.
pub fn safe_label(label: &str) -> String {
    let safe = UNSAFE_CHARS.replace_all(label, "_");
    if safe.is_empty() {
        "batch".to_string()
    } else {
        safe.into_owned()
    }
}

/// `{safe_label}_log_{YYYYmmdd_HHMMSS}.csv`
pub fn report_file_name(label: &str, generated_at: DateTime<FixedOffset>) -> String {
    format!(
        "{}_log_{}.csv",
        safe_label(label),
        generated_at.format("%Y%m%d_%H%M%S")
    )
}

#[derive(Debug, Clone)]
pub struct CsvReportStore {
    dir: PathBuf,
}

impl CsvReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a new file, adding `_1`, `_2`, ... when the name is taken.
    fn create_unique(&self, file_name: &str) -> Result<(PathBuf, fs::File), ReportError> {
        let stem = file_name.trim_end_matches(".csv");
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                self.dir.join(file_name)
            } else {
                self.dir.join(format!("{stem}_{attempt}.csv"))
            };
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free report name for {file_name}"),
        )
        .into())
    }
}

impl ReportStore for CsvReportStore {
    fn write(
        &self,
        batch_label: &str,
        generated_at: DateTime<FixedOffset>,
        rows: &[AuditRow],
    ) -> Result<String, ReportError> {
        fs::create_dir_all(&self.dir)?;
        let (path, file) = self.create_unique(&report_file_name(batch_label, generated_at))?;

        let mut writer = csv::Writer::from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        debug!(path = %path.display(), rows = rows.len(), "audit report written");
        Ok(path.display().to_string())
    }
}

/// Keeps reports in memory.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: Mutex<Vec<(String, Vec<AuditRow>)>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, Vec<AuditRow>)> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReportStore for MemoryReportStore {
    fn write(
        &self,
        batch_label: &str,
        generated_at: DateTime<FixedOffset>,
        rows: &[AuditRow],
    ) -> Result<String, ReportError> {
        let name = report_file_name(batch_label, generated_at);
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.clone(), rows.to_vec()));
        Ok(name)
    }
}
