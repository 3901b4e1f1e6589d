//! 优惠券分配服务
//!
//! 为每个 (活动, 推广者) 组合签发一张序列化优惠券。
//!
//! ## 分配流程
//!
//! 1. 活动存在且有基础优惠码 -> 2. 推广者存在 -> 3. 组合未分配
//!    -> 4. 清算所存入（超时重试） -> 5. 生成追踪链接与条码 -> 6. 写入
//!
//! 只有清算所存入成功后才会写入分配记录。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use promo_shared::observability::metrics as promo_metrics;
use promo_shared::retry::{RetryPolicy, retry_with_policy};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clearing_house::{ClearingHouseClient, DepositMode, DepositRequest, FetchCodeRequest, FetchCodeResponse};
use crate::code_image::CodeImageGenerator;
use crate::config::{AppSection, ClearingHouseConfig};
use crate::error::{PromoError, Result};
use crate::models::{AssignmentStatus, CouponAssignment};
use crate::repository::{CampaignRepositoryTrait, CouponRepositoryTrait, InfluencerRepositoryTrait};
use crate::service::dto::{AssignCouponResponse, CouponLanding};

/// 分配服务参数
#[derive(Debug, Clone)]
pub struct AssignmentSettings {
    pub base_url: String,
    /// 单次存入的超时时间
    pub deposit_timeout: Duration,
    /// 仅对超时生效
    pub retry_policy: RetryPolicy,
}

impl AssignmentSettings {
    pub fn from_config(app: &AppSection, clearing_house: &ClearingHouseConfig) -> Self {
        Self {
            base_url: app.base_url.trim_end_matches('/').to_string(),
            deposit_timeout: Duration::from_millis(clearing_house.timeout_ms),
            retry_policy: RetryPolicy::with_backoff_ms(
                clearing_house.max_retries,
                clearing_house.retry_initial_delay_ms,
                clearing_house.retry_max_delay_ms,
            ),
        }
    }
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self::from_config(&AppSection::default(), &ClearingHouseConfig::default())
    }
}

/// 优惠券分配服务
pub struct CouponAssignmentService<CR, IR, AR>
where
    CR: CampaignRepositoryTrait,
    IR: InfluencerRepositoryTrait,
    AR: CouponRepositoryTrait,
{
    campaign_repo: Arc<CR>,
    influencer_repo: Arc<IR>,
    coupon_repo: Arc<AR>,
    clearing_house: Arc<dyn ClearingHouseClient>,
    code_images: Arc<dyn CodeImageGenerator>,
    settings: AssignmentSettings,
}

impl<CR, IR, AR> CouponAssignmentService<CR, IR, AR>
where
    CR: CampaignRepositoryTrait,
    IR: InfluencerRepositoryTrait,
    AR: CouponRepositoryTrait,
{
    pub fn new(
        campaign_repo: Arc<CR>,
        influencer_repo: Arc<IR>,
        coupon_repo: Arc<AR>,
        clearing_house: Arc<dyn ClearingHouseClient>,
        code_images: Arc<dyn CodeImageGenerator>,
        settings: AssignmentSettings,
    ) -> Self {
        Self {
            campaign_repo,
            influencer_repo,
            coupon_repo,
            clearing_house,
            code_images,
            settings,
        }
    }

    /// 为推广者分配活动优惠券
    #[instrument(skip(self))]
    pub async fn assign(
        &self,
        campaign_id: &str,
        influencer_id: &str,
    ) -> Result<AssignCouponResponse> {
        let started = Instant::now();
        let result = self.do_assign(campaign_id, influencer_id).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) => e.error_code(),
        };
        promo_metrics::record_assignment(status);

        if let Err(e) = &result {
            warn!(
                campaign_id,
                influencer_id,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "优惠券分配失败"
            );
        }
        result
    }

    async fn do_assign(
        &self,
        campaign_id: &str,
        influencer_id: &str,
    ) -> Result<AssignCouponResponse> {
        // 1. 活动与基础优惠码
        let campaign = self
            .campaign_repo
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| PromoError::CampaignNotFound(campaign_id.to_string()))?;
        let base_gs1 = campaign
            .base_gs1
            .clone()
            .ok_or_else(|| PromoError::CampaignMissingBaseGs1(campaign_id.to_string()))?;

        // 2. 推广者
        self.influencer_repo
            .get_influencer(influencer_id)
            .await?
            .ok_or_else(|| PromoError::InfluencerNotFound(influencer_id.to_string()))?;

        // 3. 组合唯一（写入时仓储会再次校验）
        if self
            .coupon_repo
            .find_assignment(campaign_id, influencer_id)
            .await?
            .is_some()
        {
            return Err(PromoError::AlreadyAssigned {
                campaign_id: campaign_id.to_string(),
                influencer_id: influencer_id.to_string(),
            });
        }

        // 4. 清算所存入，重试时沿用同一个 client_txn_id
        let request = DepositRequest {
            gs1s: vec![base_gs1],
            mode: DepositMode::BaseGs1,
            client_txn_id: format!(
                "{}-{}-{}",
                campaign_id,
                influencer_id,
                Utc::now().timestamp_millis()
            ),
        };
        let serialized_gs1 = self.deposit(&request).await?;

        // 5. 追踪链接与条码
        let tracking_link = format!("{}/c/{}", self.settings.base_url, serialized_gs1);
        let qr_ref = self.code_images.generate(&serialized_gs1).await?;

        // 6. 写入
        let now = Utc::now();
        let assignment = CouponAssignment {
            id: Uuid::new_v4().to_string(),
            campaign_id: campaign_id.to_string(),
            influencer_id: influencer_id.to_string(),
            serialized_gs1,
            status: AssignmentStatus::Active,
            tracking_link: tracking_link.clone(),
            qr_code_ref: qr_ref.clone(),
            created_at: now,
            updated_at: now,
        };
        self.coupon_repo.insert_assignment(&assignment).await?;

        info!(
            assignment_id = %assignment.id,
            serialized_gs1 = %assignment.serialized_gs1,
            client_txn_id = %request.client_txn_id,
            "优惠券分配成功"
        );

        Ok(AssignCouponResponse {
            assignment,
            tracking_link,
            qr_ref,
        })
    }

    /// 调用清算所存入并取回唯一的序列化编码
    ///
    /// 每次调用受超时约束；只有超时会被重试，`success = false` 直接返回依赖错误
    async fn deposit(&self, request: &DepositRequest) -> Result<String> {
        let client = &self.clearing_house;
        let timeout = self.settings.deposit_timeout;

        let response = retry_with_policy(
            &self.settings.retry_policy,
            "clearing_house.deposit",
            |e: &PromoError| matches!(e, PromoError::DependencyTimeout { .. }),
            move || async move {
                tokio::time::timeout(timeout, client.deposit(request))
                    .await
                    .map_err(|_| PromoError::DependencyTimeout {
                        service: "clearing_house",
                    })
            },
        )
        .await?;

        if !response.success {
            return Err(PromoError::ClearingHouse(
                response
                    .error
                    .unwrap_or_else(|| "存入失败，未返回原因".to_string()),
            ));
        }

        response
            .gs1s
            .into_iter()
            .next()
            .ok_or_else(|| PromoError::ClearingHouse("存入成功但未返回编码".to_string()))
    }

    pub async fn get_by_code(&self, serialized_gs1: &str) -> Result<CouponAssignment> {
        self.coupon_repo
            .get_assignment_by_code(serialized_gs1)
            .await?
            .ok_or_else(|| PromoError::CouponNotFound(serialized_gs1.to_string()))
    }

    /// 追踪链接落地校验
    ///
    /// 已过期的优惠券返回冲突；已兑换的仍可展示
    pub async fn resolve_landing(&self, serialized_gs1: &str) -> Result<CouponLanding> {
        let assignment = self.get_by_code(serialized_gs1).await?;
        if assignment.status == AssignmentStatus::Expired {
            return Err(PromoError::CouponExpired(serialized_gs1.to_string()));
        }
        let campaign = self
            .campaign_repo
            .get_campaign(&assignment.campaign_id)
            .await?
            .ok_or_else(|| PromoError::CampaignNotFound(assignment.campaign_id.clone()))?;
        Ok(CouponLanding {
            assignment,
            campaign,
        })
    }

    pub async fn list_by_influencer(&self, influencer_id: &str) -> Result<Vec<CouponAssignment>> {
        self.coupon_repo
            .list_assignments_by_influencer(influencer_id)
            .await
    }

    pub async fn list_by_campaign(&self, campaign_id: &str) -> Result<Vec<CouponAssignment>> {
        self.coupon_repo
            .list_assignments_by_campaign(campaign_id)
            .await
    }

    /// 为有效优惠券签发一次性取码码
    #[instrument(skip(self))]
    pub async fn issue_fetch_code(
        &self,
        serialized_gs1: &str,
        validity_seconds: i64,
    ) -> Result<FetchCodeResponse> {
        if validity_seconds <= 0 {
            return Err(PromoError::Validation(format!(
                "取码有效期必须大于 0: {}",
                validity_seconds
            )));
        }
        let assignment = self.get_by_code(serialized_gs1).await?;
        if !assignment.is_active() {
            return Err(PromoError::InvalidCouponStatus {
                code: serialized_gs1.to_string(),
                status: assignment.status,
            });
        }

        self.clearing_house
            .create_fetch_code(&FetchCodeRequest {
                gs1: serialized_gs1.to_string(),
                validity_in_seconds: validity_seconds,
            })
            .await
    }

    /// 外部驱动的 `active -> expired`
    #[instrument(skip(self))]
    pub async fn expire(&self, serialized_gs1: &str) -> Result<CouponAssignment> {
        let expired = self.coupon_repo.expire_assignment(serialized_gs1).await?;
        info!(serialized_gs1, "优惠券已过期");
        Ok(expired)
    }
}
