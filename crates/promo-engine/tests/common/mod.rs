//! 集成测试公共装配

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use promo_engine::config::PromoConfig;
use promo_engine::dto::CreateCampaignRequest;
use promo_engine::repository::{InfluencerRepositoryTrait, ProductRepositoryTrait};
use promo_engine::{Campaign, DiscountType, Influencer, Product, PromoApp};
use promo_shared::test_utils::{test_campaign_window, test_id};

pub const BRAND_ID: &str = "brand-test";
pub const GTIN: &str = "00850012345678";

/// 快速配置：清算所无延迟、快速重试
pub fn fast_config() -> PromoConfig {
    let mut config = PromoConfig::default();
    config.clearing_house.latency_ms = 0;
    config.clearing_house.retry_initial_delay_ms = 1;
    config.clearing_house.retry_max_delay_ms = 5;
    config
}

pub fn app() -> Arc<PromoApp> {
    promo_shared::observability::tracing::init_for_tests();
    Arc::new(PromoApp::in_memory(&fast_config()))
}

pub async fn seed_product(app: &PromoApp) -> Product {
    let product = Product {
        id: test_id("prod"),
        brand_id: BRAND_ID.to_string(),
        name: "Sparkling Water".to_string(),
        gtin: Some(GTIN.to_string()),
    };
    app.repo.insert_product(&product).await.unwrap();
    product
}

pub async fn seed_influencer(app: &PromoApp) -> Influencer {
    let influencer = Influencer {
        id: test_id("inf"),
        brand_id: BRAND_ID.to_string(),
        name: "Test Influencer".to_string(),
        email: None,
        instagram_handle: Some("@tester".to_string()),
        tiktok_handle: None,
        total_redemptions: 0,
        created_at: Utc::now(),
    };
    app.repo.insert_influencer(&influencer).await.unwrap();
    influencer
}

pub fn campaign_request(product_id: &str) -> CreateCampaignRequest {
    let (start_date, end_date) = test_campaign_window(30);
    CreateCampaignRequest {
        brand_id: BRAND_ID.to_string(),
        product_id: product_id.to_string(),
        retailer_id: None,
        name: "Spring launch".to_string(),
        discount_type: DiscountType::Fixed,
        discount_value: 1.5,
        start_date,
        end_date,
        total_circulation: None,
        funder_id: None,
    }
}

pub async fn seed_campaign(app: &PromoApp) -> Campaign {
    let product = seed_product(app).await;
    app.campaigns
        .create(campaign_request(&product.id))
        .await
        .unwrap()
}

/// 轮询直到条件成立，超时则测试失败
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "等待后台任务超时"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
