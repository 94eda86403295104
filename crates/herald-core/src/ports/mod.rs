//! Ports - 抽象化レイヤー
//!
//! パイプラインが外部（時計、送信 API、ログ表示、レポート保存）に触れる
//! 場所をすべて trait にしておく。テストではそれぞれを差し替える。

pub mod clock;
pub mod id_generator;
pub mod log_sink;
pub mod report_store;
pub mod sender;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::log_sink::LogSink;
pub use self::report_store::ReportStore;
pub use self::sender::{DeliveryId, MessageSender, OutboundMessage};
