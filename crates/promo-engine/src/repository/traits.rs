//! 仓储 Trait 定义
//!
//! 服务层只依赖这些接口；唯一约束和条件更新由实现方保证，
//! 服务层据此处理并发竞争。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Affiliate, Automation, Campaign, CampaignStatus, CouponAssignment, Customer, Influencer,
    Product, Redemption,
};

/// 兑换原子单元的输入
#[derive(Debug, Clone, PartialEq)]
pub struct RedeemCommand {
    pub serialized_gs1: String,
    pub retailer_location: String,
    pub customer_id: Option<String>,
    pub redemption_id: String,
    pub redeemed_at: chrono::DateTime<chrono::Utc>,
}

/// 兑换原子单元的结果
#[derive(Debug, Clone, PartialEq)]
pub struct RedeemOutcome {
    pub redemption: Redemption,
    /// 所属活动的品牌，用于构造触发事件
    pub brand_id: String,
    pub assignment: CouponAssignment,
    pub influencer_total_redemptions: i64,
    pub customer: Option<Customer>,
}

/// 商品仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepositoryTrait: Send + Sync {
    async fn get_product(&self, id: &str) -> Result<Option<Product>>;
    async fn insert_product(&self, product: &Product) -> Result<()>;
}

/// 活动仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CampaignRepositoryTrait: Send + Sync {
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<()>;
    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>>;
    /// 按创建时间倒序
    async fn list_campaigns_by_brand(&self, brand_id: &str) -> Result<Vec<Campaign>>;
    /// 条件更新：仅当当前状态为 `expected` 时写入 `to`
    ///
    /// 活动不存在返回 `Ok(None)`，状态已变化返回 `Ok(Some(当前记录))` 且不写入
    async fn update_campaign_status(
        &self,
        id: &str,
        expected: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<Option<Campaign>>;
}

/// 推广者仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InfluencerRepositoryTrait: Send + Sync {
    async fn insert_influencer(&self, influencer: &Influencer) -> Result<()>;
    async fn get_influencer(&self, id: &str) -> Result<Option<Influencer>>;
}

/// 优惠券分配仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CouponRepositoryTrait: Send + Sync {
    async fn find_assignment(
        &self,
        campaign_id: &str,
        influencer_id: &str,
    ) -> Result<Option<CouponAssignment>>;
    async fn get_assignment_by_code(&self, serialized_gs1: &str)
    -> Result<Option<CouponAssignment>>;
    /// 插入分配记录
    ///
    /// (campaign_id, influencer_id) 已存在返回 `AlreadyAssigned`，
    /// serialized_gs1 重复返回 `DuplicateCode`
    async fn insert_assignment(&self, assignment: &CouponAssignment) -> Result<()>;
    async fn list_assignments_by_influencer(
        &self,
        influencer_id: &str,
    ) -> Result<Vec<CouponAssignment>>;
    async fn list_assignments_by_campaign(&self, campaign_id: &str)
    -> Result<Vec<CouponAssignment>>;
    /// 条件更新 `active -> expired`
    ///
    /// 记录不存在返回 `CouponNotFound`，状态不为 active 返回 `InvalidCouponStatus`
    async fn expire_assignment(&self, serialized_gs1: &str) -> Result<CouponAssignment>;
}

/// 兑换仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RedemptionRepositoryTrait: Send + Sync {
    /// 兑换原子单元
    ///
    /// 在同一个原子单元内：条件更新分配状态 `active -> redeemed`、写入兑换记录、
    /// 推广者计数 +1、（如有）客户计数 +1。任一步失败则全部不生效。
    async fn redeem(&self, command: &RedeemCommand) -> Result<RedeemOutcome>;
    async fn list_redemptions_by_influencer(&self, influencer_id: &str)
    -> Result<Vec<Redemption>>;
    async fn count_redemptions_by_influencer(&self, influencer_id: &str) -> Result<i64>;
}

/// 客户仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustomerRepositoryTrait: Send + Sync {
    async fn get_customer(&self, id: &str) -> Result<Option<Customer>>;
    async fn find_customer_by_email(&self, brand_id: &str, email: &str)
    -> Result<Option<Customer>>;
    /// 插入客户，(brand_id, email) 已存在时返回 `AlreadyExists`
    async fn insert_customer(&self, customer: &Customer) -> Result<()>;
    async fn delete_customer(&self, id: &str) -> Result<bool>;
}

/// 分销商仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AffiliateRepositoryTrait: Send + Sync {
    async fn get_affiliate(&self, id: &str) -> Result<Option<Affiliate>>;
    async fn find_affiliate_by_customer(&self, customer_id: &str) -> Result<Option<Affiliate>>;
    async fn find_affiliate_by_code(&self, code: &str) -> Result<Option<Affiliate>>;
    /// 插入分销商并标记客户 `is_affiliate = true`
    ///
    /// 客户已有分销商返回 `AlreadyExists`，分销码重复返回 `DuplicateCode`
    async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<()>;
    /// 按创建时间倒序
    async fn list_affiliates_by_brand(&self, brand_id: &str) -> Result<Vec<Affiliate>>;
    async fn add_earnings(&self, id: &str, amount: f64) -> Result<Option<Affiliate>>;
}

/// 自动化仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutomationRepositoryTrait: Send + Sync {
    async fn insert_automation(&self, automation: &Automation) -> Result<()>;
    async fn get_automation(&self, id: &str) -> Result<Option<Automation>>;
    /// 按创建时间倒序
    async fn list_automations_by_brand(&self, brand_id: &str) -> Result<Vec<Automation>>;
    async fn list_active_automations(
        &self,
        brand_id: &str,
        trigger_type: crate::models::TriggerType,
    ) -> Result<Vec<Automation>>;
    async fn set_automation_active(&self, id: &str, is_active: bool)
    -> Result<Option<Automation>>;
}
