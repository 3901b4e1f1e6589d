//! 活动服务
//!
//! 创建活动并由商品 GTIN 派生基础优惠码；活动状态只通过显式调用流转。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::{PromoError, Result};
use crate::models::{Campaign, CampaignStatus, DiscountType};
use crate::repository::{CampaignRepositoryTrait, ProductRepositoryTrait};
use crate::service::dto::CreateCampaignRequest;

/// GTIN 最大位数
const GTIN_MAX_DIGITS: usize = 14;

/// 活动服务
pub struct CampaignService<PR, CR>
where
    PR: ProductRepositoryTrait,
    CR: CampaignRepositoryTrait,
{
    product_repo: Arc<PR>,
    campaign_repo: Arc<CR>,
    default_funder_id: String,
}

impl<PR, CR> CampaignService<PR, CR>
where
    PR: ProductRepositoryTrait,
    CR: CampaignRepositoryTrait,
{
    pub fn new(
        product_repo: Arc<PR>,
        campaign_repo: Arc<CR>,
        default_funder_id: impl Into<String>,
    ) -> Self {
        Self {
            product_repo,
            campaign_repo,
            default_funder_id: default_funder_id.into(),
        }
    }

    /// 创建活动
    ///
    /// 1. 字段校验（名称、折扣、出资方）
    /// 2. 时间范围校验
    /// 3. 商品存在且 GTIN 合法
    /// 4. 派生基础优惠码，以 active 状态写入
    #[instrument(skip(self, request), fields(brand_id = %request.brand_id, product_id = %request.product_id))]
    pub async fn create(&self, request: CreateCampaignRequest) -> Result<Campaign> {
        request.validate()?;

        if request.discount_type == DiscountType::Percent && request.discount_value > 100.0 {
            return Err(PromoError::Validation(format!(
                "百分比折扣不能超过 100: {}",
                request.discount_value
            )));
        }
        if !request.discount_value.is_finite() {
            return Err(PromoError::Validation("折扣值必须是有限数值".to_string()));
        }

        let funder_id = request
            .funder_id
            .clone()
            .unwrap_or_else(|| self.default_funder_id.clone());
        if !funder_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PromoError::Validation(format!(
                "出资方 ID 只能包含字母和数字: {}",
                funder_id
            )));
        }

        if request.end_date <= request.start_date {
            return Err(PromoError::InvalidDateRange {
                start: request.start_date.to_rfc3339(),
                end: request.end_date.to_rfc3339(),
            });
        }

        let product = self
            .product_repo
            .get_product(&request.product_id)
            .await?
            .ok_or_else(|| PromoError::ProductNotFound(request.product_id.clone()))?;

        let gtin = product.gtin.as_deref().unwrap_or_default();
        if gtin.is_empty()
            || gtin.len() > GTIN_MAX_DIGITS
            || !gtin.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PromoError::Validation(format!(
                "商品 {} 缺少合法的 GTIN（最多 {} 位数字）",
                product.id, GTIN_MAX_DIGITS
            )));
        }

        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4().to_string(),
            brand_id: request.brand_id,
            product_id: request.product_id,
            retailer_id: request.retailer_id,
            name: request.name,
            discount_type: request.discount_type,
            discount_value: request.discount_value,
            base_gs1: Some(Campaign::derive_base_gs1(gtin, &funder_id)),
            campaign_start: request.start_date,
            campaign_end: request.end_date,
            status: CampaignStatus::Active,
            total_circulation: request.total_circulation,
            created_at: now,
            updated_at: now,
        };

        self.campaign_repo.insert_campaign(&campaign).await?;

        info!(
            campaign_id = %campaign.id,
            base_gs1 = ?campaign.base_gs1,
            "活动创建成功"
        );

        Ok(campaign)
    }

    pub async fn get(&self, id: &str) -> Result<Campaign> {
        self.campaign_repo
            .get_campaign(id)
            .await?
            .ok_or_else(|| PromoError::CampaignNotFound(id.to_string()))
    }

    /// 品牌下的活动，按创建时间倒序
    pub async fn list_by_brand(&self, brand_id: &str) -> Result<Vec<Campaign>> {
        self.campaign_repo.list_campaigns_by_brand(brand_id).await
    }

    /// 更新活动状态
    ///
    /// 目标状态与当前一致时直接返回；不合法的流转返回冲突错误。
    /// 写入使用条件更新，并发修改导致状态变化时同样返回冲突。
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: &str, to: CampaignStatus) -> Result<Campaign> {
        let campaign = self.get(id).await?;
        if campaign.status == to {
            return Ok(campaign);
        }
        if !campaign.status.can_transition_to(to) {
            return Err(PromoError::InvalidStatusTransition {
                from: campaign.status,
                to,
            });
        }

        let updated = self
            .campaign_repo
            .update_campaign_status(id, campaign.status, to)
            .await?
            .ok_or_else(|| PromoError::CampaignNotFound(id.to_string()))?;

        if updated.status != to {
            return Err(PromoError::InvalidStatusTransition {
                from: updated.status,
                to,
            });
        }

        info!(campaign_id = %id, from = %campaign.status, to = %to, "活动状态已更新");
        Ok(updated)
    }
}
