//! Audit rows: one diagnostic record per source row.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// What the resolver saw for one row and what it turned it into.
///
/// Serialized field names are the report's column headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRow {
    pub row_index: usize,

    #[serde(rename = "mobile_number")]
    pub recipient_phone: String,

    /// Raw text that produced the instant (`date time` when two columns were joined).
    pub original_value: String,

    #[serde(rename = "detected_timezone")]
    pub detected_timezone_label: String,

    #[serde(rename = "converted_ist")]
    pub converted_instant: DateTime<FixedOffset>,
}
