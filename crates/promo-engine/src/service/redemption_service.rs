//! 兑换服务
//!
//! 零售端扫码兑换。状态条件更新 `active -> redeemed` 是唯一的并发闸门：
//! 并发兑换同一编码时只有一方成功，其余返回 `AlreadyRedeemed`。
//!
//! 原子单元提交后才异步触发 `coupon_redeemed` 自动化，自动化的任何失败都不会影响兑换结果。

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use promo_shared::observability::metrics as promo_metrics;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::automation::AutomationTrigger;
use crate::error::Result;
use crate::models::{AutomationEvent, Redemption, TriggerType};
use crate::repository::{RedeemCommand, RedeemOutcome, RedemptionRepositoryTrait};
use crate::service::dto::{RedeemRequest, RedeemResponse};

const DEFAULT_RETAILER_LOCATION: &str = "unspecified";

/// 兑换服务
pub struct RedemptionService<RR>
where
    RR: RedemptionRepositoryTrait,
{
    redemption_repo: Arc<RR>,
    automations: Arc<dyn AutomationTrigger>,
}

impl<RR> RedemptionService<RR>
where
    RR: RedemptionRepositoryTrait,
{
    pub fn new(redemption_repo: Arc<RR>, automations: Arc<dyn AutomationTrigger>) -> Self {
        Self {
            redemption_repo,
            automations,
        }
    }

    /// 兑换优惠券
    #[instrument(skip(self, request), fields(serialized_gs1 = %request.serialized_gs1))]
    pub async fn redeem(&self, request: RedeemRequest) -> Result<RedeemResponse> {
        let started = Instant::now();

        let command = RedeemCommand {
            serialized_gs1: request.serialized_gs1,
            retailer_location: request
                .retailer_location
                .filter(|loc| !loc.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_RETAILER_LOCATION.to_string()),
            customer_id: request.customer_id,
            redemption_id: Uuid::new_v4().to_string(),
            redeemed_at: Utc::now(),
        };

        let result = self.redemption_repo.redeem(&command).await;
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                promo_metrics::record_redemption(e.error_code(), elapsed);
                warn!(
                    serialized_gs1 = %command.serialized_gs1,
                    error = %e,
                    "优惠券兑换失败"
                );
                return Err(e);
            }
        };
        promo_metrics::record_redemption("success", elapsed);

        info!(
            redemption_id = %outcome.redemption.id,
            influencer_id = %outcome.redemption.influencer_id,
            total_redemptions = outcome.influencer_total_redemptions,
            "优惠券兑换成功"
        );

        // 提交后触发，句柄直接丢弃
        drop(
            self.automations
                .fire(TriggerType::CouponRedeemed, Self::trigger_event(&outcome)),
        );

        Ok(RedeemResponse {
            redemption: outcome.redemption,
            influencer_total_redemptions: outcome.influencer_total_redemptions,
        })
    }

    /// 推广者的兑换记录
    pub async fn list_by_influencer(&self, influencer_id: &str) -> Result<Vec<Redemption>> {
        self.redemption_repo
            .list_redemptions_by_influencer(influencer_id)
            .await
    }

    fn trigger_event(outcome: &RedeemOutcome) -> AutomationEvent {
        let redemption = &outcome.redemption;
        AutomationEvent {
            brand_id: outcome.brand_id.clone(),
            customer_id: redemption.customer_id.clone(),
            campaign_id: Some(redemption.campaign_id.clone()),
            influencer_id: Some(redemption.influencer_id.clone()),
            redemption_id: Some(redemption.id.clone()),
            email: outcome.customer.as_ref().map(|c| c.email.clone()),
            phone: outcome.customer.as_ref().and_then(|c| c.phone.clone()),
        }
    }
}
