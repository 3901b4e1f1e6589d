//! 推广服务枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化，
//! 文本形式统一为 snake_case，与外部接口保持一致。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 活动状态
///
/// 只能通过显式调用流转，核心层不做基于时间的自动过期
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum CampaignStatus {
    /// 草稿
    Draft,
    /// 进行中 - 创建后的默认状态
    #[default]
    Active,
    /// 已暂停
    Paused,
    /// 已结束 - 终态
    Ended,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Ended => "ended",
        }
    }

    /// 判断是否允许流转到目标状态
    ///
    /// 相同状态视为允许（幂等），由调用方决定是否跳过写入
    pub fn can_transition_to(&self, to: CampaignStatus) -> bool {
        use CampaignStatus::*;
        if *self == to {
            return true;
        }
        matches!(
            (self, to),
            (Draft, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Draft, Ended)
                | (Active, Ended)
                | (Paused, Ended)
        )
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 折扣类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum DiscountType {
    /// 固定金额
    Fixed,
    /// 百分比折扣，数值不超过 100
    Percent,
    /// 买一送一
    Bogo,
}

/// 优惠券分配状态
///
/// `active -> redeemed` 只能由兑换引擎触发；`active -> expired` 由外部驱动。
/// 两个终态之间没有任何流转。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[default]
    Active,
    Redeemed,
    Expired,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Redeemed => "redeemed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 自动化触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum TriggerType {
    /// 新客户被捕获
    CustomerCreated,
    /// 优惠券被兑换
    CouponRedeemed,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerCreated => "customer_created",
            Self::CouponRedeemed => "coupon_redeemed",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 自动化步骤动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    SendSms,
    CreateAffiliate,
    Wait,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::SendSms => "send_sms",
            Self::CreateAffiliate => "create_affiliate",
            Self::Wait => "wait",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 延迟步骤状态
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ScheduledStepStatus {
    /// 等待到期
    #[default]
    Pending,
    /// 已被 worker 认领
    Running,
    /// 执行完成
    Done,
    /// 执行失败
    Failed,
}

impl ScheduledStepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_status_transitions() {
        use CampaignStatus::*;

        assert!(Draft.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Paused.can_transition_to(Ended));
        assert!(Active.can_transition_to(Active));

        assert!(!Ended.can_transition_to(Active));
        assert!(!Active.can_transition_to(Draft));
        assert!(!Paused.can_transition_to(Draft));
        assert!(Ended.can_transition_to(Ended));
    }

    #[test]
    fn test_enum_serialization_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&TriggerType::CouponRedeemed).unwrap(),
            "\"coupon_redeemed\""
        );
        assert_eq!(
            serde_json::to_string(&ActionType::CreateAffiliate).unwrap(),
            "\"create_affiliate\""
        );
        let status: AssignmentStatus = serde_json::from_str("\"redeemed\"").unwrap();
        assert_eq!(status, AssignmentStatus::Redeemed);
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(CampaignStatus::Paused.to_string(), "paused");
        assert_eq!(AssignmentStatus::Expired.to_string(), "expired");
        assert_eq!(ActionType::SendSms.to_string(), "send_sms");
    }
}
