//! 推广服务领域模型
//!
//! 包含活动、优惠券、兑换、客户、分销商和自动化的核心实体定义

pub mod automation;
pub mod campaign;
pub mod coupon;
pub mod enums;
pub mod party;

// 重新导出常用类型
pub use automation::{Automation, AutomationEvent, AutomationStep, ScheduledStep, StepAction};
pub use campaign::{Campaign, GS1_COUPON_PREFIX, Product};
pub use coupon::{CouponAssignment, Redemption};
pub use enums::{
    ActionType, AssignmentStatus, CampaignStatus, DiscountType, ScheduledStepStatus, TriggerType,
};
pub use party::{Affiliate, Customer, Influencer};
