//! Quick test - 管理者が設定確認のために 1 通だけ送る
//!
//! キュー・ログ・Pacing を通らない。宛先の形式だけ検証して直接送る。

use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::domain::errors::SendError;
use crate::ports::{DeliveryId, MessageSender, OutboundMessage};

pub const QUICK_TEST_BODY: &str = "Test message from herald";

static E164_LIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+?\d{10,15}$").unwrap());

/// Send one fixed message to `to` (`+919876543210` or `whatsapp:+919876543210`).
pub async fn send_test_message(
    sender: &dyn MessageSender,
    to: &str,
) -> Result<DeliveryId, SendError> {
    let number = to.trim();
    let number = number.strip_prefix("whatsapp:").unwrap_or(number).trim();
    if !E164_LIKE.is_match(number) {
        return Err(SendError::InvalidMessage(format!(
            "'{to}' is not a phone number in E.164 form (e.g. +919876543210)"
        )));
    }

    let message = OutboundMessage {
        to: number.to_string(),
        body: QUICK_TEST_BODY.to_string(),
        media: None,
    };
    let delivery_id = sender.send(&message).await?;
    info!(to = number, delivery_id = %delivery_id, "test message sent");
    Ok(delivery_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::DryRunSender;
    use rstest::rstest;

    #[rstest]
    #[case("+919876543210")]
    #[case("919876543210")]
    #[case("whatsapp:+919876543210")]
    #[case("  +14155550123 ")]
    #[tokio::test]
    async fn accepts_e164_numbers(#[case] to: &str) {
        let sender = DryRunSender::new();
        let id = send_test_message(&sender, to).await.unwrap();
        assert!(id.starts_with("dry-run-"));
        assert_eq!(sender.sent_count(), 1);
    }

    #[rstest]
    #[case("")]
    #[case("12345")]
    #[case("+91 98765 43210")]
    #[case("+1234567890123456")]
    #[case("call me")]
    #[tokio::test]
    async fn rejects_anything_else_without_sending(#[case] to: &str) {
        let sender = DryRunSender::new();
        let err = send_test_message(&sender, to).await.unwrap_err();
        assert!(matches!(err, SendError::InvalidMessage(_)));
        assert_eq!(sender.sent_count(), 0);
    }
}
