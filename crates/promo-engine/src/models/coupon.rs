//! 优惠券分配与兑换记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::AssignmentStatus;

/// 优惠券分配
///
/// 每个 (campaign_id, influencer_id) 至多一条；`serialized_gs1` 全局唯一。
/// 记录永不删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponAssignment {
    pub id: String,
    pub campaign_id: String,
    pub influencer_id: String,
    pub serialized_gs1: String,
    pub status: AssignmentStatus,
    pub tracking_link: String,
    /// 条码图片引用（路径或 data URL）
    pub qr_code_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CouponAssignment {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

/// 兑换记录（只追加，不可修改）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: String,
    pub coupon_assignment_id: String,
    pub campaign_id: String,
    pub influencer_id: String,
    pub serialized_gs1: String,
    pub redeemed_at: DateTime<Utc>,
    pub retailer_location: String,
    #[serde(default)]
    pub customer_id: Option<String>,
}
