//! herald-core
//!
//! スプレッドシートから WhatsApp 送信をスケジュールするパイプラインの部品。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, audit, log, zone, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, MessageSender, LogSink, ReportStore）
//! - **normalize**: 電話番号・送信時刻の正規化
//! - **ingest**: アップロードされた表の読み込みと列の推定
//! - **queue**: 重複排除ゲート + 時刻順キュー
//! - **app**: JobBuilder, UploadPipeline, Dispatcher, Pacing
//! - **impls**: 実装（TwilioSender, DryRunSender, InMemoryLogSink, CsvReportStore）
//! - **config**: herald.toml + HERALD_* 環境変数
//! - **observability**: キュー状態の集計ビュー

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ingest;
pub mod normalize;
pub mod observability;
pub mod ports;
pub mod queue;

pub use self::config::HeraldConfig;
pub use self::domain::HeraldError;
