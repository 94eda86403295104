//! DryRunSender - 何も送らずに成功扱いにする
//!
//! 本番の資格情報なしでパイプライン全体を通すためのもの。

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::domain::errors::SendError;
use crate::ports::{DeliveryId, MessageSender, OutboundMessage};

#[derive(Debug, Default)]
pub struct DryRunSender {
    sent: AtomicU64,
}

impl DryRunSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageSender for DryRunSender {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryId, SendError> {
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            to = %message.to,
            body = %message.body,
            media = message.media.as_deref().unwrap_or(""),
            "[dry run] would send message"
        );
        Ok(format!("dry-run-{n}"))
    }
}
