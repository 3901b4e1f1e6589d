//! 自动化实体定义
//!
//! 步骤配置在创建自动化时一次性解析为强类型动作，执行期不再处理原始 JSON。

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::enums::{ActionType, ScheduledStepStatus, TriggerType};
use crate::error::{PromoError, Result};

/// 自动化定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Automation {
    pub id: String,
    pub brand_id: String,
    pub name: String,
    pub trigger_type: TriggerType,
    pub is_active: bool,
    /// 按 step_order 升序存储
    pub steps: Vec<AutomationStep>,
    pub created_at: DateTime<Utc>,
}

/// 自动化步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationStep {
    pub step_order: i32,
    /// 执行前等待的秒数，0 表示立即执行
    #[serde(default)]
    pub delay_seconds: i64,
    pub action: StepAction,
}

impl AutomationStep {
    pub fn action_type(&self) -> ActionType {
        self.action.action_type()
    }
}

/// 步骤动作
///
/// 封闭的变体集合，每个变体携带自身已校验的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    SendEmail {
        #[serde(default)]
        template: Option<String>,
        #[serde(default)]
        subject: Option<String>,
    },
    SendSms {
        #[serde(default)]
        message: Option<String>,
    },
    CreateAffiliate {
        #[serde(default)]
        commission_percent: Option<f64>,
    },
    Wait,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EmailConfig {
    template: Option<String>,
    subject: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SmsConfig {
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AffiliateStepConfig {
    commission_percent: Option<f64>,
}

impl StepAction {
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::SendEmail { .. } => ActionType::SendEmail,
            Self::SendSms { .. } => ActionType::SendSms,
            Self::CreateAffiliate { .. } => ActionType::CreateAffiliate,
            Self::Wait => ActionType::Wait,
        }
    }

    /// 将原始配置解析为强类型动作
    ///
    /// 无法解析的 JSON（或字段类型不符）记录告警后按空配置处理；
    /// 格式正确但取值越界的配置返回校验错误。
    pub fn parse(action_type: ActionType, raw_config: &str, step_order: i32) -> Result<Self> {
        let action = match action_type {
            ActionType::SendEmail => {
                let config: EmailConfig = parse_or_empty(raw_config, step_order);
                Self::SendEmail {
                    template: config.template,
                    subject: config.subject,
                }
            }
            ActionType::SendSms => {
                let config: SmsConfig = parse_or_empty(raw_config, step_order);
                Self::SendSms {
                    message: config.message,
                }
            }
            ActionType::CreateAffiliate => {
                let config: AffiliateStepConfig = parse_or_empty(raw_config, step_order);
                if let Some(percent) = config.commission_percent {
                    if !(percent > 0.0 && percent <= 100.0) {
                        return Err(PromoError::Validation(format!(
                            "步骤 {} 的佣金比例必须在 (0, 100] 范围内: {}",
                            step_order, percent
                        )));
                    }
                }
                Self::CreateAffiliate {
                    commission_percent: config.commission_percent,
                }
            }
            ActionType::Wait => Self::Wait,
        };
        Ok(action)
    }
}

fn parse_or_empty<T: DeserializeOwned + Default>(raw: &str, step_order: i32) -> T {
    let raw = raw.trim();
    if raw.is_empty() {
        return T::default();
    }
    match serde_json::from_str::<Value>(raw).and_then(serde_json::from_value::<T>) {
        Ok(config) => config,
        Err(e) => {
            warn!(step_order, error = %e, "步骤配置无法解析，按空配置处理");
            T::default()
        }
    }
}

/// 触发自动化的事件数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationEvent {
    pub brand_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub influencer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redemption_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl AutomationEvent {
    pub fn for_brand(brand_id: impl Into<String>) -> Self {
        Self {
            brand_id: brand_id.into(),
            ..Default::default()
        }
    }
}

/// 延迟步骤
///
/// 保存从延迟步骤开始的剩余步骤快照和事件数据，恢复执行时无需再查询自动化定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledStep {
    pub id: String,
    pub automation_id: String,
    pub automation_name: String,
    pub remaining_steps: Vec<AutomationStep>,
    pub event: AutomationEvent,
    pub due_at: DateTime<Utc>,
    pub status: ScheduledStepStatus,
    /// 最近一次被认领的时间，认领租约据此计算
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: i32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_config() {
        let action = StepAction::parse(
            ActionType::SendEmail,
            r#"{"template":"welcome","subject":"Hi"}"#,
            1,
        )
        .unwrap();
        assert_eq!(
            action,
            StepAction::SendEmail {
                template: Some("welcome".into()),
                subject: Some("Hi".into())
            }
        );
    }

    #[test]
    fn test_malformed_config_becomes_empty() {
        let action = StepAction::parse(ActionType::SendSms, "{not json", 2).unwrap();
        assert_eq!(action, StepAction::SendSms { message: None });

        // 字段类型不符同样按空配置处理
        let action = StepAction::parse(ActionType::SendEmail, r#"{"template":42}"#, 3).unwrap();
        assert_eq!(
            action,
            StepAction::SendEmail {
                template: None,
                subject: None
            }
        );
    }

    #[test]
    fn test_empty_config_string() {
        let action = StepAction::parse(ActionType::CreateAffiliate, "", 1).unwrap();
        assert_eq!(
            action,
            StepAction::CreateAffiliate {
                commission_percent: None
            }
        );
    }

    #[test]
    fn test_out_of_range_commission_is_rejected() {
        let err =
            StepAction::parse(ActionType::CreateAffiliate, r#"{"commissionPercent":150}"#, 1)
                .unwrap_err();
        assert!(matches!(err, PromoError::Validation(_)));

        let err = StepAction::parse(ActionType::CreateAffiliate, r#"{"commissionPercent":0}"#, 1)
            .unwrap_err();
        assert!(matches!(err, PromoError::Validation(_)));
    }

    #[test]
    fn test_step_snapshot_serializes_with_tag() {
        let step = AutomationStep {
            step_order: 3,
            delay_seconds: 0,
            action: StepAction::CreateAffiliate {
                commission_percent: Some(15.0),
            },
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["action"]["type"], "create_affiliate");
        let back: AutomationStep = serde_json::from_value(json).unwrap();
        assert_eq!(back.action_type(), ActionType::CreateAffiliate);
    }
}
