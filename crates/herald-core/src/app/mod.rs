//! App - アプリケーション層
//!
//! ports を組み合わせてパイプラインを組み立てる。
//!
//! # 主要コンポーネント
//! - **JobBuilder**: Table → Job + 監査行（レポート書き出し込み）
//! - **UploadPipeline**: 複数ファイルの取り込み → キュー投入
//! - **Dispatcher**: 期限の来た Job を送る単一ループ
//! - **Pacing**: 送信間隔（実行中に変更可）
//! - **quick_test**: 設定確認用の 1 通送信

pub mod dispatcher;
pub mod job_builder;
pub mod pacing;
pub mod pipeline;
pub mod quick_test;

// 主要な型を再エクスポート
pub use self::dispatcher::{DispatchSettings, Dispatcher, render_body, wait_until_settled};
pub use self::job_builder::{Batch, JobBuilder, ReportStatus};
pub use self::pacing::Pacing;
pub use self::pipeline::{BatchSummary, FileOutcome, FileSummary, UploadPipeline};
pub use self::quick_test::send_test_message;
