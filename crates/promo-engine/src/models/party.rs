//! 推广者、客户与分销商

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 推广者
///
/// `total_redemptions` 为冗余计数，必须始终等于其兑换记录条数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Influencer {
    pub id: String,
    pub brand_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub instagram_handle: Option<String>,
    #[serde(default)]
    pub tiktok_handle: Option<String>,
    #[serde(default)]
    pub total_redemptions: i64,
    pub created_at: DateTime<Utc>,
}

/// 客户（邮箱在品牌内唯一）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub brand_id: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub total_redemptions: i64,
    #[serde(default)]
    pub is_affiliate: bool,
    pub created_at: DateTime<Utc>,
}

/// 分销商
///
/// 每个客户至多一条，`code` 全局唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affiliate {
    pub id: String,
    pub customer_id: String,
    pub brand_id: String,
    pub code: String,
    pub commission_percent: f64,
    #[serde(default)]
    pub total_earnings: f64,
    pub created_at: DateTime<Utc>,
}
