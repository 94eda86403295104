//! Domain identifiers (strongly-typed IDs).
//!
//! # 二種類の ID
//! - **JobId**: 内容から決定的に組み立てる合成キー（dedup / idempotency 用）
//! - **BatchId**: ULID ベース。アップロード 1 回ごとに採番し、ログと集計で使う
//!
//! JobId は ULID にしない。同じ行から作った Job は同じ ID になる必要があるため、
//! 乱数や生成時刻を含めてはいけない。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identity of one scheduled message.
///
/// Composite of `phone|media|epoch_secs|row`. The `row` segment is omitted
/// when the queue runs with content-only identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Build the composite key.
    ///
    /// `media` is the empty string when the job carries no attachment.
    pub fn compose(phone: &str, media: &str, epoch_secs: i64, row_index: Option<usize>) -> Self {
        match row_index {
            Some(row) => Self(format!("{phone}|{media}|{epoch_secs}|{row}")),
            None => Self(format!("{phone}|{media}|{epoch_secs}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which parts of a row make up its `JobId`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobIdentity {
    /// Phone, media, instant and source row. Identical rows in one file stay distinct.
    #[default]
    ContentAndRow,
    /// Phone, media and instant only. The same message in two files is one job.
    ContentOnly,
}

impl JobIdentity {
    pub fn row_segment(self, row_index: usize) -> Option<usize> {
        match self {
            JobIdentity::ContentAndRow => Some(row_index),
            JobIdentity::ContentOnly => None,
        }
    }
}

/// Identifier of one upload batch (one or more files submitted together).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Ulid);

impl BatchId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for BatchId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_deterministic() {
        let a = JobId::compose("+919876543210", "", 1_705_309_200, Some(3));
        let b = JobId::compose("+919876543210", "", 1_705_309_200, Some(3));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "+919876543210||1705309200|3");
    }

    #[test]
    fn row_index_separates_identical_rows() {
        let a = JobId::compose("+919876543210", "https://x/a.png", 10, Some(0));
        let b = JobId::compose("+919876543210", "https://x/a.png", 10, Some(1));
        assert_ne!(a, b);
    }

    #[test]
    fn content_only_identity_drops_row_segment() {
        let id = JobId::compose("+91", "m", 7, None);
        assert_eq!(id.to_string(), "+91|m|7");
    }

    #[test]
    fn batch_id_has_prefix_and_roundtrips() {
        let id = BatchId::from_ulid(Ulid::new());
        assert!(id.to_string().starts_with("batch-"));

        let json = serde_json::to_string(&id).unwrap();
        let back: BatchId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
