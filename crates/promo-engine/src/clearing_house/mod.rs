//! 清算所客户端
//!
//! 将基础优惠码序列化为全局唯一的可兑换编码，并签发一次性取码码。
//! 目前只提供 Mock 实现；真实网络协议不在本服务范围内。

mod mock;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{ClearingHouseConfig, ClearingHouseMode};
use crate::error::Result;

pub use mock::{MockClearingHouse, generate_serial};
pub use types::{
    DepositMode, DepositRequest, DepositResponse, FetchCodeRequest, FetchCodeResponse,
    MasterOfferFile,
};

/// 清算所客户端接口
///
/// `deposit` 对预期内的网络故障返回 `success = false`，是否重试由调用方决定
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClearingHouseClient: Send + Sync {
    /// 每个输入编码返回恰好一个序列化编码
    async fn deposit(&self, request: &DepositRequest) -> DepositResponse;

    async fn create_fetch_code(&self, request: &FetchCodeRequest) -> Result<FetchCodeResponse>;

    async fn get_master_offer_files(&self) -> Result<Vec<MasterOfferFile>>;
}

/// 按配置构建客户端
pub fn build_client(config: &ClearingHouseConfig) -> Arc<MockClearingHouse> {
    if config.mode == ClearingHouseMode::Live {
        warn!("清算所 live 模式尚未接入，回退到 Mock 客户端");
    }
    Arc::new(MockClearingHouse::new(Duration::from_millis(
        config.latency_ms,
    )))
}
