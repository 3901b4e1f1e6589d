//! 模拟器命令行
//!
//! `simulate` 在内存中跑通完整链路：活动 -> 分配 -> 客户登记 -> 兑换 -> 自动化，
//! 然后快进延迟步骤 Worker 并输出 JSON 汇总。
//!
//! ```bash
//! promo-engine simulate --influencers 5 --redeem 3 --fast-forward-secs 86400
//! promo-engine simulate --store postgres
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use promo_shared::config::AppConfig;
use promo_shared::database::Database;
use serde::Serialize;
use tracing::{info, warn};

use crate::app::PromoApp;
use crate::automation::{MemoryScheduledStepStore, PgScheduledStepStore, ScheduledStepStore};
use crate::config::{PromoConfig, StepStoreKind};
use crate::error::PromoError;
use crate::models::{ActionType, DiscountType, Influencer, Product, TriggerType};
use crate::repository::{InfluencerRepositoryTrait, ProductRepositoryTrait};
use crate::service::dto::{
    CaptureCustomerRequest, CreateAutomationRequest, CreateCampaignRequest, CreateStepRequest,
    RedeemRequest,
};

pub const SERVICE_NAME: &str = "promo-engine";

const DEMO_BRAND_ID: &str = "brand-demo";
const DEMO_GTIN: &str = "00850012345678";
const WELCOME_WAIT_SECS: i64 = 86_400;

/// 推广引擎命令行工具
#[derive(Parser, Debug)]
#[command(name = "promo-engine")]
#[command(version, about = "数字优惠券推广引擎")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 运行端到端模拟并输出 JSON 汇总
    Simulate {
        /// 推广者数量
        #[arg(long, default_value = "3")]
        influencers: usize,

        /// 兑换的优惠券数量
        #[arg(long, default_value = "2")]
        redeem: usize,

        /// 快进秒数，用于触发到期的延迟步骤
        #[arg(long, default_value = "86400")]
        fast_forward_secs: i64,

        /// 延迟步骤存储
        #[arg(long, value_enum)]
        store: Option<StepStoreKind>,
    },
}

/// 模拟汇总
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub campaign_id: String,
    pub base_gs1: String,
    pub assignments: usize,
    pub tracking_links: Vec<String>,
    pub redemptions: usize,
    pub duplicate_redemptions_rejected: usize,
    pub customers: usize,
    pub notifications_sent: usize,
    pub scheduled_steps_pending: usize,
    pub resumed_runs: usize,
    pub affiliates: usize,
    pub affiliate_links: Vec<String>,
}

/// 命令执行器
pub struct SimulationRunner {
    config: PromoConfig,
}

impl SimulationRunner {
    pub fn new(config: PromoConfig) -> Self {
        Self { config }
    }

    /// 执行 simulate 命令
    pub async fn run_simulate(
        &self,
        influencers: usize,
        redeem: usize,
        fast_forward_secs: i64,
        store: Option<StepStoreKind>,
    ) -> Result<SimulationSummary> {
        let store_kind = store.unwrap_or(self.config.automation.store);
        let step_store = self.build_step_store(store_kind).await?;
        let app = PromoApp::with_step_store(&self.config, step_store);
        simulate(&app, influencers, redeem, fast_forward_secs).await
    }

    async fn build_step_store(&self, kind: StepStoreKind) -> Result<Arc<dyn ScheduledStepStore>> {
        let lease = Duration::from_secs(self.config.automation.claim_lease_secs);
        match kind {
            StepStoreKind::Memory => Ok(Arc::new(MemoryScheduledStepStore::with_lease(lease))),
            StepStoreKind::Postgres => {
                let app_config = AppConfig::load(SERVICE_NAME).context("加载数据库配置失败")?;
                let db = Database::connect(&app_config.database, SERVICE_NAME)
                    .await
                    .context("连接数据库失败")?;
                let store = PgScheduledStepStore::with_lease(db.pool().clone(), lease);
                store.ensure_schema().await?;
                info!("延迟步骤使用 PostgreSQL 存储");
                Ok(Arc::new(store))
            }
        }
    }
}

/// 在给定装配上跑一遍完整链路
pub async fn simulate(
    app: &PromoApp,
    influencer_count: usize,
    redeem_count: usize,
    fast_forward_secs: i64,
) -> Result<SimulationSummary> {
    let mut summary = SimulationSummary::default();

    // 1. 种子数据
    let product = Product {
        id: "prod-demo".to_string(),
        brand_id: DEMO_BRAND_ID.to_string(),
        name: "Demo Product".to_string(),
        gtin: Some(DEMO_GTIN.to_string()),
    };
    app.repo.insert_product(&product).await?;

    let mut influencer_ids = Vec::with_capacity(influencer_count);
    for i in 1..=influencer_count {
        let influencer = Influencer {
            id: format!("inf-{i}"),
            brand_id: DEMO_BRAND_ID.to_string(),
            name: format!("Influencer {i}"),
            email: Some(format!("influencer{i}@example.com")),
            instagram_handle: Some(format!("@influencer{i}")),
            tiktok_handle: None,
            total_redemptions: 0,
            created_at: Utc::now(),
        };
        app.repo.insert_influencer(&influencer).await?;
        influencer_ids.push(influencer.id);
    }

    // 2. 自动化
    app.automations
        .create(CreateAutomationRequest {
            brand_id: DEMO_BRAND_ID.to_string(),
            name: "Welcome series".to_string(),
            trigger_type: TriggerType::CustomerCreated,
            is_active: None,
            steps: vec![
                CreateStepRequest::new(
                    1,
                    ActionType::SendEmail,
                    r#"{"template":"welcome","subject":"Welcome!"}"#,
                ),
                CreateStepRequest::new(2, ActionType::Wait, "").with_delay(WELCOME_WAIT_SECS),
                CreateStepRequest::new(3, ActionType::CreateAffiliate, r#"{"commissionPercent":15}"#),
            ],
        })
        .await?;
    app.automations
        .create(CreateAutomationRequest {
            brand_id: DEMO_BRAND_ID.to_string(),
            name: "Thank you".to_string(),
            trigger_type: TriggerType::CouponRedeemed,
            is_active: None,
            steps: vec![CreateStepRequest::new(
                1,
                ActionType::SendEmail,
                r#"{"template":"thank_you","subject":"Thanks for redeeming"}"#,
            )],
        })
        .await?;

    // 3. 活动
    let now = Utc::now();
    let campaign = app
        .campaigns
        .create(CreateCampaignRequest {
            brand_id: DEMO_BRAND_ID.to_string(),
            product_id: product.id.clone(),
            retailer_id: None,
            name: "Spring launch".to_string(),
            discount_type: DiscountType::Fixed,
            discount_value: 2.0,
            start_date: now,
            end_date: now + TimeDelta::days(30),
            total_circulation: None,
            funder_id: None,
        })
        .await?;
    summary.campaign_id = campaign.id.clone();
    summary.base_gs1 = campaign.base_gs1.clone().unwrap_or_default();

    // 4. 分配
    let mut codes = Vec::with_capacity(influencer_ids.len());
    for influencer_id in &influencer_ids {
        let assigned = app.assignments.assign(&campaign.id, influencer_id).await?;
        summary.tracking_links.push(assigned.tracking_link);
        codes.push(assigned.assignment.serialized_gs1);
    }
    summary.assignments = codes.len();

    // 5. 客户登记与兑换
    for (i, code) in codes.iter().take(redeem_count).enumerate() {
        let captured = app
            .customers
            .capture(CaptureCustomerRequest {
                brand_id: DEMO_BRAND_ID.to_string(),
                email: format!("customer{}@example.com", i + 1),
                phone: Some(format!("+1555000{:04}", i + 1)),
            })
            .await?;

        app.redemptions
            .redeem(
                RedeemRequest::new(code.clone())
                    .at_location(format!("Store #{}", i + 1))
                    .for_customer(captured.customer_id),
            )
            .await?;
        summary.redemptions += 1;

        match app.redemptions.redeem(RedeemRequest::new(code.clone())).await {
            Err(PromoError::AlreadyRedeemed(_)) => summary.duplicate_redemptions_rejected += 1,
            Err(e) => warn!(error = %e, "重复兑换返回了意外错误"),
            Ok(_) => warn!(code = %code, "重复兑换竟然成功"),
        }
    }
    summary.customers = app.repo.customer_count();

    // 触发是异步的，给后台任务留出执行时间
    tokio::time::sleep(Duration::from_millis(200)).await;

    // 6. 快进延迟步骤
    let future = Utc::now() + TimeDelta::try_seconds(fast_forward_secs).unwrap_or_default();
    let report = app.worker.poll_once(future).await?;
    summary.resumed_runs = report.completed;

    summary.notifications_sent = app.notifier.sent_count();
    summary.scheduled_steps_pending = app.step_store.pending_count().await?;
    let affiliates = app.affiliates.list_by_brand(DEMO_BRAND_ID).await?;
    summary.affiliates = affiliates.len();
    for affiliate in &affiliates {
        summary
            .affiliate_links
            .push(app.affiliates.get_by_code(&affiliate.code).await?.affiliate_link);
    }

    info!(
        assignments = summary.assignments,
        redemptions = summary.redemptions,
        affiliates = summary.affiliates,
        "模拟完成"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_simulate_defaults() {
        let cli = Cli::parse_from(["promo-engine", "simulate"]);
        match cli.command {
            Commands::Simulate {
                influencers,
                redeem,
                fast_forward_secs,
                store,
            } => {
                assert_eq!(influencers, 3);
                assert_eq!(redeem, 2);
                assert_eq!(fast_forward_secs, 86_400);
                assert!(store.is_none());
            }
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_cli_parse_simulate_custom() {
        let cli = Cli::parse_from([
            "promo-engine",
            "simulate",
            "--influencers",
            "10",
            "--redeem",
            "4",
            "--fast-forward-secs",
            "0",
            "--store",
            "postgres",
        ]);
        let Commands::Simulate {
            influencers,
            redeem,
            fast_forward_secs,
            store,
        } = cli.command;
        assert_eq!(influencers, 10);
        assert_eq!(redeem, 4);
        assert_eq!(fast_forward_secs, 0);
        assert_eq!(store, Some(StepStoreKind::Postgres));
    }

    #[tokio::test]
    async fn test_simulate_in_memory() {
        let mut config = PromoConfig::default();
        config.clearing_house.latency_ms = 1;
        let app = PromoApp::in_memory(&config);

        let summary = simulate(&app, 3, 2, WELCOME_WAIT_SECS + 1).await.unwrap();

        assert_eq!(summary.base_gs1, "81120012345678MOCK01");
        assert_eq!(summary.assignments, 3);
        assert_eq!(summary.redemptions, 2);
        assert_eq!(summary.duplicate_redemptions_rejected, 2);
        assert_eq!(summary.customers, 2);
        assert_eq!(summary.affiliates, 2);
        assert_eq!(summary.scheduled_steps_pending, 0);
        assert!(summary.tracking_links[0].starts_with("http://localhost:5173/c/8112"));
        assert!(summary.affiliate_links[0].starts_with("http://localhost:5173/a/"));
    }
}
