//! 通知发送器
//!
//! 核心层只依赖 [`NotificationSender`] 接口。默认实现只记录发送意图，
//! 不承担实际投递。

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::types::{DeliveryReceipt, OutboundMessage};
use crate::error::Result;

/// 通知发送接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt>;
}

/// 记录日志的发送器
///
/// 保留已发送消息，供模拟器汇总和测试断言使用
#[derive(Debug, Default)]
pub struct LoggingNotificationSender {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl LoggingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt> {
        info!(
            message_id = %message.message_id,
            channel = %message.channel,
            recipient = %message.recipient,
            template = %message.template,
            subject = ?message.subject,
            "模拟发送通知"
        );
        self.sent.lock().push(message.clone());
        Ok(DeliveryReceipt::ok(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_sender_records_messages() {
        let sender = LoggingNotificationSender::new();
        let receipt = sender
            .send(&OutboundMessage::email("a@example.com", "welcome", "Hi"))
            .await
            .unwrap();

        assert!(receipt.success);
        assert_eq!(sender.sent_count(), 1);
        assert_eq!(sender.sent()[0].recipient, "a@example.com");
    }
}
