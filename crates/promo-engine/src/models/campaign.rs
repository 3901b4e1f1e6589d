//! 活动与商品实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{CampaignStatus, DiscountType};

/// GS1 数字优惠券应用标识符
pub const GS1_COUPON_PREFIX: &str = "8112";

/// 基础优惠码中由 GTIN 派生的位数
pub const OFFER_CODE_DIGITS: usize = 10;

/// 商品（仅查询）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub brand_id: String,
    pub name: String,
    /// 全球贸易项目代码，最多 14 位数字
    #[serde(default)]
    pub gtin: Option<String>,
}

/// 推广活动
///
/// `base_gs1` 在创建时由商品 GTIN 派生，此后不再重新计算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub brand_id: String,
    pub product_id: String,
    #[serde(default)]
    pub retailer_id: Option<String>,
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: f64,
    /// 基础优惠码（所有序列化券共享）
    pub base_gs1: Option<String>,
    pub campaign_start: DateTime<Utc>,
    pub campaign_end: DateTime<Utc>,
    pub status: CampaignStatus,
    /// 发行量上限（仅记录，不强制）
    #[serde(default)]
    pub total_circulation: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// 派生基础优惠码：`8112` + GTIN 末 10 位（不足左补零）+ 出资方 ID
    pub fn derive_base_gs1(gtin: &str, funder_id: &str) -> String {
        let digits: Vec<char> = gtin.chars().collect();
        let start = digits.len().saturating_sub(OFFER_CODE_DIGITS);
        let tail: String = digits[start..].iter().collect();
        format!(
            "{}{:0>width$}{}",
            GS1_COUPON_PREFIX,
            tail,
            funder_id,
            width = OFFER_CODE_DIGITS
        )
    }
}
