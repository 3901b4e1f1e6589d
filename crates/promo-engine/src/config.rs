//! 推广引擎业务配置
//!
//! 各配置段通过 [`AppConfig::load_section`] 按 key 独立加载，缺失时使用默认值。

use promo_shared::config::AppConfig;
use serde::Deserialize;

use crate::error::{PromoError, Result};

/// 应用基础配置（`[app]`）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 追踪链接和分销链接的前缀
    pub base_url: String,
    /// 条码图片路径前缀
    pub code_image_prefix: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5173".to_string(),
            code_image_prefix: "/codes".to_string(),
        }
    }
}

/// 清算所客户端模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearingHouseMode {
    #[default]
    Mock,
    Live,
}

/// 清算所配置（`[clearing_house]`）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClearingHouseConfig {
    pub mode: ClearingHouseMode,
    /// Mock 模式下模拟的网络延迟
    pub latency_ms: u64,
    /// 单次存入调用的超时时间
    pub timeout_ms: u64,
    /// 超时后的最大重试次数
    pub max_retries: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// 未指定出资方时使用的占位 ID
    pub default_funder_id: String,
}

impl Default for ClearingHouseConfig {
    fn default() -> Self {
        Self {
            mode: ClearingHouseMode::Mock,
            latency_ms: 100,
            timeout_ms: 2_000,
            max_retries: 2,
            retry_initial_delay_ms: 100,
            retry_max_delay_ms: 1_000,
            default_funder_id: "MOCK01".to_string(),
        }
    }
}

/// 分销商配置（`[affiliate]`）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AffiliateConfig {
    pub default_commission_percent: f64,
    /// 分销码冲突时的最大生成次数
    pub max_code_attempts: u32,
}

impl Default for AffiliateConfig {
    fn default() -> Self {
        Self {
            default_commission_percent: 10.0,
            max_code_attempts: 5,
        }
    }
}

/// 延迟步骤存储后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StepStoreKind {
    #[default]
    Memory,
    Postgres,
}

/// 自动化配置（`[automation]`）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// 全局开关，关闭后触发为空操作
    pub enabled: bool,
    /// worker 轮询间隔
    pub poll_interval_secs: u64,
    /// 单次轮询最多认领的延迟步骤数
    pub batch_size: usize,
    /// 认领租约，超过该时长仍未完成的记录可被重新认领
    pub claim_lease_secs: u64,
    pub store: StepStoreKind,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 5,
            batch_size: 50,
            claim_lease_secs: 300,
            store: StepStoreKind::Memory,
        }
    }
}

/// 推广引擎完整配置
#[derive(Debug, Clone, Default)]
pub struct PromoConfig {
    pub app: AppSection,
    pub clearing_house: ClearingHouseConfig,
    pub affiliate: AffiliateConfig,
    pub automation: AutomationConfig,
}

impl PromoConfig {
    /// 加载所有业务配置段
    pub fn load(service_name: &str) -> Result<Self> {
        let load_err = |e: config::ConfigError| PromoError::Internal(format!("配置加载失败: {e}"));
        Ok(Self {
            app: AppConfig::load_section(service_name, "app").map_err(load_err)?,
            clearing_house: AppConfig::load_section(service_name, "clearing_house")
                .map_err(load_err)?,
            affiliate: AppConfig::load_section(service_name, "affiliate").map_err(load_err)?,
            automation: AppConfig::load_section(service_name, "automation").map_err(load_err)?,
        })
    }
}
