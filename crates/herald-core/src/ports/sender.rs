//! MessageSender port - 外部メッセージング API への送信
//!
//! 送信そのものは外部の責務。ここではインターフェースだけを定義する。
//!
//! # 実装
//! - TwilioSender: WhatsApp over Twilio REST
//! - DryRunSender: 送らずにログだけ残す

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::SendError;

/// Vendor-assigned id of an accepted message.
pub type DeliveryId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Canonical phone, without any channel prefix.
    pub to: String,
    pub body: String,
    pub media: Option<String>,
}

/// MessageSender は 1 通を送り、配信 ID を返す
///
/// # 設計原則
/// - 失敗は `SendError` で返す。panic しない
/// - リトライはしない（呼び出し側が `failed` として記録する）
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryId, SendError>;
}
