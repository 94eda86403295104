//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **TwilioSender**: WhatsApp 送信（本番用）
//! - **DryRunSender**: 送らずに成功扱い
//! - **InMemoryLogSink**: 送信ログ（表示・消去・CSV 書き出し）
//! - **CsvReportStore**: 監査レポートをディレクトリに書き出す
//! - **MemoryReportStore**: テスト用

pub mod csv_report;
pub mod dry_run;
pub mod memory_log;
pub mod twilio;

// 主要な型を再エクスポート
pub use self::csv_report::{CsvReportStore, MemoryReportStore};
pub use self::dry_run::DryRunSender;
pub use self::memory_log::InMemoryLogSink;
pub use self::twilio::{SharedCredentials, TwilioCredentials, TwilioSender};
