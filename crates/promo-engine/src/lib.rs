//! 推广引擎
//!
//! 面向品牌的数字优惠券推广：为推广者签发序列化 GS1 优惠券、零售端兑换、
//! 客户登记与分销商转化，以及由业务事件触发的营销自动化。
//!
//! ## 模块结构
//!
//! - `models`: 领域模型
//! - `error`: 错误类型
//! - `config`: 业务配置段
//! - `repository`: 仓储接口与内存实现
//! - `clearing_house`: 清算所客户端
//! - `code_image`: 条码图片生成
//! - `notification`: 通知发送
//! - `service`: 业务服务
//! - `automation`: 自动化引擎与延迟步骤调度
//! - `app`: 服务装配
//! - `cli`: 模拟器命令行

pub mod app;
pub mod automation;
pub mod clearing_house;
pub mod cli;
pub mod code_image;
pub mod config;
pub mod error;
pub mod models;
pub mod notification;
pub mod repository;
pub mod service;

pub use app::{MemoryAutomationEngine, PromoApp};
pub use automation::{AutomationEngine, AutomationRun, AutomationTrigger, RunStatus, StepOutcome};
pub use config::PromoConfig;
pub use error::{ErrorKind, PromoError, Result};
pub use models::*;
pub use repository::MemoryRepository;
pub use service::{
    AffiliateService, CampaignService, CouponAssignmentService, CustomerService,
    RedemptionService, dto,
};
