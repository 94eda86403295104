//! JobBuilder - 表の各行を Job と監査行に変換する
//!
//! # 不変条件
//! - 1 行につき Job 1 件・監査行 1 件（電話番号が空でも作る）
//! - 行の順序を保つ
//! - 監査レポートの書き込みに失敗しても Job は捨てない

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{info, warn};

use crate::domain::{AuditRow, Job, JobId, JobIdentity, OperatingZone};
use crate::ingest::Table;
use crate::normalize::{PhoneNormalizer, TimestampResolver, normalize_text};
use crate::ports::{Clock, ReportStore};

/// Where the audit report ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    /// Location of the written report.
    Written(String),
    /// Writing failed; the jobs are still valid.
    Failed(String),
}

/// Output of building one table.
#[derive(Debug, Clone)]
pub struct Batch {
    pub jobs: Vec<Job>,
    pub audit: Vec<AuditRow>,
    pub report: ReportStatus,
}

impl Batch {
    /// Jobs that will fail at send time for lack of a phone number.
    pub fn unsendable(&self) -> usize {
        self.jobs.iter().filter(|job| !job.is_sendable()).count()
    }
}

pub struct JobBuilder {
    phones: PhoneNormalizer,
    resolver: TimestampResolver<Arc<dyn Clock>>,
    clock: Arc<dyn Clock>,
    identity: JobIdentity,
    reports: Arc<dyn ReportStore>,
}

impl JobBuilder {
    pub fn new(zone: OperatingZone, clock: Arc<dyn Clock>, reports: Arc<dyn ReportStore>) -> Self {
        Self {
            phones: PhoneNormalizer::default(),
            resolver: TimestampResolver::new(zone, Arc::clone(&clock)),
            clock,
            identity: JobIdentity::default(),
            reports,
        }
    }

    pub fn with_phone_normalizer(mut self, phones: PhoneNormalizer) -> Self {
        self.phones = phones;
        self
    }

    pub fn with_identity(mut self, identity: JobIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_no_date_offset(mut self, offset: TimeDelta) -> Self {
        self.resolver = self.resolver.with_no_date_offset(offset);
        self
    }

    pub fn build(&self, table: &Table, batch_label: &str) -> Batch {
        let columns = table.columns();
        let mut jobs = Vec::with_capacity(table.len());
        let mut audit = Vec::with_capacity(table.len());

        for (row_index, row) in table.rows().iter().enumerate() {
            let phone = columns
                .phone
                .map(|c| self.phones.normalize(table.cell(row_index, c)))
                .unwrap_or_default();
            let name = columns
                .name
                .and_then(|c| normalize_text(table.cell(row_index, c)));
            let media = columns
                .media
                .and_then(|c| normalize_text(table.cell(row_index, c)));

            let resolution = self.resolver.resolve(row, &columns);

            let job_id = JobId::compose(
                &phone,
                media.as_deref().unwrap_or(""),
                resolution.instant.timestamp(),
                self.identity.row_segment(row_index),
            );

            audit.push(AuditRow {
                row_index,
                recipient_phone: phone.clone(),
                original_value: resolution.original_value,
                detected_timezone_label: resolution.source.label().to_string(),
                converted_instant: resolution.instant,
            });
            jobs.push(Job::new(
                job_id,
                row_index,
                phone,
                name,
                media,
                resolution.instant,
            ));
        }

        let generated_at = self.resolver.zone().convert(&self.clock.now());
        let report = match self.reports.write(batch_label, generated_at, &audit) {
            Ok(location) => {
                info!(batch = batch_label, report = %location, rows = audit.len(), "audit report written");
                ReportStatus::Written(location)
            }
            Err(e) => {
                warn!(batch = batch_label, error = %e, "could not write audit report");
                ReportStatus::Failed(e.to_string())
            }
        };

        Batch {
            jobs,
            audit,
            report,
        }
    }
}
