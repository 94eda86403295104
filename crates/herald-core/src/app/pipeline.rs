//! UploadPipeline - アップロード 1 回分を取り込みからキュー投入まで通す
//!
//! # フロー
//! 1. BatchId を採番
//! 2. ファイルごとに ingest → build → enqueue
//! 3. ファイル単位の結果を BatchSummary にまとめる
//!
//! 1 ファイルの失敗（読めない・空）は他のファイルを止めない。

use std::sync::Arc;

use tracing::{Instrument, info, info_span, warn};

use super::job_builder::{JobBuilder, ReportStatus};
use crate::domain::{BatchId, HeraldError};
use crate::ingest::{TableIngestor, Upload};
use crate::ports::IdGenerator;
use crate::queue::{JobQueue, Submission};

#[derive(Debug, Clone)]
pub enum FileOutcome {
    Ingested {
        rows: usize,
        accepted: usize,
        duplicates: usize,
        /// Rows without a phone number; they are scheduled and fail at send time.
        unsendable: usize,
        report: ReportStatus,
    },
    Rejected {
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct FileSummary {
    pub file: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub files: Vec<FileSummary>,
}

impl BatchSummary {
    pub fn accepted(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Ingested { accepted, .. } => accepted,
                FileOutcome::Rejected { .. } => 0,
            })
            .sum()
    }

    pub fn rejected_files(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Rejected { .. }))
            .count()
    }
}

pub struct UploadPipeline {
    ingestor: TableIngestor,
    builder: JobBuilder,
    queue: Arc<dyn JobQueue>,
    ids: Arc<dyn IdGenerator>,
}

impl UploadPipeline {
    pub fn new(builder: JobBuilder, queue: Arc<dyn JobQueue>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            ingestor: TableIngestor::new(),
            builder,
            queue,
            ids,
        }
    }

    pub async fn submit(&self, uploads: &[Upload]) -> Result<BatchSummary, HeraldError> {
        let batch_id = self.ids.generate_batch_id();
        let span = info_span!("batch", batch_id = %batch_id);

        async move {
            let mut files = Vec::with_capacity(uploads.len());
            for upload in uploads {
                let outcome = self.submit_one(upload).await?;
                files.push(FileSummary {
                    file: upload.name().to_string(),
                    outcome,
                });
            }

            let summary = BatchSummary { batch_id, files };
            info!(
                files = summary.files.len(),
                rejected = summary.rejected_files(),
                accepted = summary.accepted(),
                "batch submitted"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn submit_one(&self, upload: &Upload) -> Result<FileOutcome, HeraldError> {
        let table = match self.ingestor.ingest(upload) {
            Ok(table) => table,
            Err(e) => {
                warn!(file = upload.name(), error = %e, "file rejected");
                return Ok(FileOutcome::Rejected {
                    error: e.to_string(),
                });
            }
        };

        let batch = self.builder.build(&table, upload.stem());
        let unsendable = batch.unsendable();

        let mut accepted = 0;
        let mut duplicates = 0;
        for job in batch.jobs {
            match self.queue.enqueue(job).await? {
                Submission::Accepted => accepted += 1,
                Submission::Duplicate => duplicates += 1,
            }
        }

        info!(
            file = upload.name(),
            rows = table.len(),
            accepted,
            duplicates,
            "file scheduled"
        );
        Ok(FileOutcome::Ingested {
            rows: table.len(),
            accepted,
            duplicates,
            unsendable,
            report: batch.report,
        })
    }
}
