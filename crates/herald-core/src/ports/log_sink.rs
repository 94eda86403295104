//! LogSink port - 送信結果ログの記録先
//!
//! ゲート（scheduled）とディスパッチャ（delivered / failed）が書き込み、
//! オペレーター向けの画面が読み出して消す。

use crate::domain::log::{LogEntry, LogKind};

/// LogSink は追記専用のログ
///
/// # 設計原則
/// - `record` は同期・非ブロッキング（キューのロック内から呼ばれる）
/// - 読み出しはスナップショット（呼び出し側がロックを持ち続けない）
pub trait LogSink: Send + Sync {
    fn record(&self, entry: LogEntry);

    /// Snapshot of entries, optionally filtered by kind, in recording order.
    fn entries(&self, kind: Option<LogKind>) -> Vec<LogEntry>;

    /// Remove every entry of `kind`; returns how many were removed.
    fn clear(&self, kind: LogKind) -> usize;
}
