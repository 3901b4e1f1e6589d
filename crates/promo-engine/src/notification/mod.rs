//! 通知模块
//!
//! 自动化步骤通过该模块发送邮件和短信。

mod sender;
mod types;

pub use sender::{LoggingNotificationSender, NotificationSender};
pub use types::{DeliveryReceipt, NotificationChannel, OutboundMessage};

#[cfg(test)]
pub use sender::MockNotificationSender;
