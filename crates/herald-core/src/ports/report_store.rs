//! ReportStore port - 監査レポート（バッチごとの変換記録）の保存先
//!
//! 1 バッチにつき 1 レポート。作成後は追記しない。

use chrono::{DateTime, FixedOffset};

use crate::domain::audit::AuditRow;
use crate::domain::errors::ReportError;

/// ReportStore は監査行をまとめて書き出す
///
/// # 設計原則
/// - ファイル名はバッチ名と生成時刻から作り、同名アップロードでも上書きしない
/// - 戻り値はオペレーターに見せる場所（パスなど）
pub trait ReportStore: Send + Sync {
    fn write(
        &self,
        batch_label: &str,
        generated_at: DateTime<FixedOffset>,
        rows: &[AuditRow],
    ) -> Result<String, ReportError>;
}
