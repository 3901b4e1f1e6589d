//! 通知类型定义

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => f.write_str("email"),
            Self::Sms => f.write_str("sms"),
        }
    }
}

/// 待发送的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub message_id: String,
    pub channel: NotificationChannel,
    /// 邮箱地址或手机号
    pub recipient: String,
    /// 模板名
    pub template: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// 渲染模板用的业务数据
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn email(
        recipient: impl Into<String>,
        template: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Uuid::now_v7().to_string(),
            channel: NotificationChannel::Email,
            recipient: recipient.into(),
            template: template.into(),
            subject: Some(subject.into()),
            body: None,
            data: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn sms(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::now_v7().to_string(),
            channel: NotificationChannel::Sms,
            recipient: recipient.into(),
            template: "sms".to_string(),
            subject: None,
            body: Some(body.into()),
            data: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// 添加业务数据
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// 发送回执
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub channel: NotificationChannel,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeliveryReceipt {
    pub fn ok(message: &OutboundMessage) -> Self {
        Self {
            message_id: message.message_id.clone(),
            channel: message.channel,
            success: true,
            error: None,
        }
    }

    pub fn failed(message: &OutboundMessage, error: impl Into<String>) -> Self {
        Self {
            message_id: message.message_id.clone(),
            channel: message.channel,
            success: false,
            error: Some(error.into()),
        }
    }
}
