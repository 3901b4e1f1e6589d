//! 服务层数据传输对象
//!
//! 请求 DTO 通过 `validator` 做字段级校验，跨字段规则在服务内检查

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    ActionType, Affiliate, Campaign, CouponAssignment, DiscountType, Redemption, TriggerType,
};

// ==================== 活动 ====================

/// 创建活动请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    #[validate(length(min = 1, message = "品牌 ID 不能为空"))]
    pub brand_id: String,
    #[validate(length(min = 1, message = "商品 ID 不能为空"))]
    pub product_id: String,
    #[serde(default)]
    pub retailer_id: Option<String>,
    #[validate(length(min = 1, max = 255, message = "活动名称长度必须在1-255个字符之间"))]
    pub name: String,
    pub discount_type: DiscountType,
    #[validate(range(min = 0.0, message = "折扣值不能为负数"))]
    pub discount_value: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    #[validate(range(min = 1, message = "发行量上限必须大于0"))]
    pub total_circulation: Option<i64>,
    /// 出资方 ID，缺省时使用配置中的占位值
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "出资方 ID 长度必须在1-100个字符之间"))]
    pub funder_id: Option<String>,
}

// ==================== 优惠券分配 ====================

/// 分配结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignCouponResponse {
    pub assignment: CouponAssignment,
    pub tracking_link: String,
    pub qr_ref: String,
}

/// 追踪链接落地页视图
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponLanding {
    pub assignment: CouponAssignment,
    pub campaign: Campaign,
}

// ==================== 兑换 ====================

/// 兑换请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub serialized_gs1: String,
    #[serde(default)]
    pub retailer_location: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

impl RedeemRequest {
    pub fn new(serialized_gs1: impl Into<String>) -> Self {
        Self {
            serialized_gs1: serialized_gs1.into(),
            ..Default::default()
        }
    }

    pub fn at_location(mut self, location: impl Into<String>) -> Self {
        self.retailer_location = Some(location.into());
        self
    }

    pub fn for_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }
}

/// 兑换结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub redemption: Redemption,
    pub influencer_total_redemptions: i64,
}

// ==================== 分销商 ====================

/// 创建分销商选项
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateOptions {
    #[serde(default)]
    pub commission_percent: Option<f64>,
}

/// 分销商信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateResponse {
    pub id: String,
    pub code: String,
    pub commission_percent: f64,
    pub affiliate_link: String,
}

impl AffiliateResponse {
    pub fn from_affiliate(affiliate: &Affiliate, base_url: &str) -> Self {
        Self {
            id: affiliate.id.clone(),
            code: affiliate.code.clone(),
            commission_percent: affiliate.commission_percent,
            affiliate_link: format!("{}/a/{}", base_url, affiliate.code),
        }
    }
}

// ==================== 客户 ====================

/// 客户捕获请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CaptureCustomerRequest {
    #[validate(length(min = 1, message = "品牌 ID 不能为空"))]
    pub brand_id: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 32, message = "手机号长度必须在1-32个字符之间"))]
    pub phone: Option<String>,
}

/// 客户捕获结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureCustomerResponse {
    pub customer_id: String,
    pub is_new_customer: bool,
}

// ==================== 自动化 ====================

/// 创建自动化请求
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutomationRequest {
    #[validate(length(min = 1, message = "品牌 ID 不能为空"))]
    pub brand_id: String,
    #[validate(length(min = 1, max = 255, message = "自动化名称长度必须在1-255个字符之间"))]
    pub name: String,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    #[validate(nested)]
    pub steps: Vec<CreateStepRequest>,
}

/// 自动化步骤定义
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStepRequest {
    pub step_order: i32,
    pub action_type: ActionType,
    /// 原始 JSON 配置
    #[serde(default)]
    pub action_config: String,
    #[serde(default)]
    #[validate(range(min = 0, message = "延迟秒数不能为负数"))]
    pub delay_seconds: i64,
}

impl CreateStepRequest {
    pub fn new(step_order: i32, action_type: ActionType, action_config: impl Into<String>) -> Self {
        Self {
            step_order,
            action_type,
            action_config: action_config.into(),
            delay_seconds: 0,
        }
    }

    pub fn with_delay(mut self, delay_seconds: i64) -> Self {
        self.delay_seconds = delay_seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_request_validation() {
        let ok = CaptureCustomerRequest {
            brand_id: "brand-1".into(),
            email: "jane@example.com".into(),
            phone: None,
        };
        assert!(ok.validate().is_ok());

        let bad = CaptureCustomerRequest {
            email: "not-an-email".into(),
            ..ok
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_create_automation_validates_nested_steps() {
        let request = CreateAutomationRequest {
            brand_id: "brand-1".into(),
            name: "Welcome".into(),
            trigger_type: TriggerType::CustomerCreated,
            is_active: None,
            steps: vec![CreateStepRequest::new(1, ActionType::Wait, "").with_delay(-5)],
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_affiliate_link() {
        let affiliate = Affiliate {
            id: "aff-1".into(),
            customer_id: "c1".into(),
            brand_id: "brand-1".into(),
            code: "ABC123XYZ".into(),
            commission_percent: 10.0,
            total_earnings: 0.0,
            created_at: Utc::now(),
        };
        let resp = AffiliateResponse::from_affiliate(&affiliate, "http://localhost:5173");
        assert_eq!(resp.affiliate_link, "http://localhost:5173/a/ABC123XYZ");
    }
}
