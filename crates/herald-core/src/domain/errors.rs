//! Errors - エラー型と分類
//!
//! 関心ごとに enum を分け、`HeraldError` で束ねる。
//!
//! # 分類
//! - IngestError: ファイル単位。同じバッチの他ファイルは止めない
//! - SendError: 送信境界で必ず捕まえて `failed` ログに変換する
//! - ReportError: 監査レポートの書き込み失敗。Job は捨てない
//! - ConfigError / CredentialError: 起動時・オペレーター入力時の検証

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{file}: no rows found")]
    Empty { file: String },

    #[error("{file}: could not read delimited text: {reason}")]
    Delimited { file: String, reason: String },

    #[error("{file}: could not read workbook ({reason})")]
    Workbook { file: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("messaging API rejected the request (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("sender is not configured: {0}")]
    NotConfigured(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report encoding error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(String),

    #[error("invalid timezone offset '{0}' (expected e.g. +05:30)")]
    InvalidOffset(String),

    #[error("pacing delay must be a finite, non-negative number of seconds (got {0})")]
    InvalidDelay(f64),
}

#[derive(Debug, Error)]
#[error("{}", .0.join("; "))]
pub struct CredentialError(pub Vec<String>);

#[derive(Debug, Error)]
pub enum HeraldError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let err = HeraldError::from(IngestError::Empty {
            file: "contacts.csv".into(),
        });
        assert_eq!(err.to_string(), "contacts.csv: no rows found");

        let err = CredentialError(vec!["bad sid".into(), "short token".into()]);
        assert_eq!(err.to_string(), "bad sid; short token");

        let err = SendError::Api {
            status: 400,
            message: "invalid To".into(),
        };
        assert!(err.to_string().contains("status 400"));
    }
}
