//! 服务层
//!
//! 实现推广业务逻辑，协调仓储层与外部协作方。
//!
//! ## 模块结构
//!
//! - `dto`: 请求与响应定义
//! - `campaign_service`: 活动管理
//! - `assignment_service`: 优惠券分配
//! - `redemption_service`: 优惠券兑换
//! - `affiliate_service`: 分销商
//! - `customer_service`: 客户登记

pub mod affiliate_service;
pub mod assignment_service;
pub mod campaign_service;
pub mod customer_service;
pub mod dto;
pub mod redemption_service;

pub use affiliate_service::{AffiliateCodeGenerator, AffiliateService, RandomAffiliateCodeGenerator};
pub use assignment_service::{AssignmentSettings, CouponAssignmentService};
pub use campaign_service::CampaignService;
pub use customer_service::CustomerService;
pub use dto::*;
pub use redemption_service::RedemptionService;

#[cfg(test)]
pub use affiliate_service::MockAffiliateCodeGenerator;
