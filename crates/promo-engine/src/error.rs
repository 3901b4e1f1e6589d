//! 推广服务错误类型
//!
//! 定义服务层的业务错误和系统错误，并按调用方可感知的类别归类：
//! 校验、未找到、冲突、依赖失败、步骤执行失败、内部错误。

use thiserror::Error;

use crate::models::{AssignmentStatus, CampaignStatus};

/// 错误类别
///
/// 决定错误的传播方式：前三类直接返回调用方且不自动重试，
/// 依赖错误可重试，步骤执行错误只在自动化引擎内部记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Dependency,
    StepExecution,
    Internal,
}

/// 推广服务错误类型
#[derive(Debug, Error)]
pub enum PromoError {
    // === 参数校验 ===
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("结束时间必须晚于开始时间: start={start}, end={end}")]
    InvalidDateRange { start: String, end: String },

    // === 未找到 ===
    #[error("活动不存在: {0}")]
    CampaignNotFound(String),

    #[error("商品不存在: {0}")]
    ProductNotFound(String),

    #[error("推广者不存在: {0}")]
    InfluencerNotFound(String),

    #[error("客户不存在: {0}")]
    CustomerNotFound(String),

    #[error("优惠券不存在: {0}")]
    CouponNotFound(String),

    #[error("分销商不存在: {0}")]
    AffiliateNotFound(String),

    #[error("自动化不存在: {0}")]
    AutomationNotFound(String),

    // === 冲突 ===
    #[error("活动缺少基础 GS1 编码: {0}")]
    CampaignMissingBaseGs1(String),

    #[error("推广者已分配该活动的优惠券: campaign_id={campaign_id}, influencer_id={influencer_id}")]
    AlreadyAssigned {
        campaign_id: String,
        influencer_id: String,
    },

    #[error("优惠券已兑换: {0}")]
    AlreadyRedeemed(String),

    #[error("优惠券已过期: {0}")]
    CouponExpired(String),

    #[error("优惠券状态不允许此操作: code={code}, status={status}")]
    InvalidCouponStatus {
        code: String,
        status: AssignmentStatus,
    },

    #[error("活动状态流转不合法: {from} -> {to}")]
    InvalidStatusTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("编码重复: {0}")]
    DuplicateCode(String),

    #[error("记录已存在: {entity} {field}={value}")]
    AlreadyExists {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("分销码生成失败，已尝试 {attempts} 次")]
    CodeGenerationExhausted { attempts: u32 },

    // === 外部依赖 ===
    #[error("清算所调用失败: {0}")]
    ClearingHouse(String),

    #[error("外部服务超时: {service}")]
    DependencyTimeout { service: &'static str },

    #[error("条码图片生成失败: {0}")]
    CodeImage(String),

    // === 自动化步骤 ===
    #[error("自动化步骤执行失败: step={step_order}, reason={reason}")]
    StepExecution { step_order: i32, reason: String },

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 推广服务 Result 类型别名
pub type Result<T> = std::result::Result<T, PromoError>;

impl PromoError {
    /// 错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidDateRange { .. } => ErrorKind::Validation,
            Self::CampaignNotFound(_)
            | Self::ProductNotFound(_)
            | Self::InfluencerNotFound(_)
            | Self::CustomerNotFound(_)
            | Self::CouponNotFound(_)
            | Self::AffiliateNotFound(_)
            | Self::AutomationNotFound(_) => ErrorKind::NotFound,
            Self::CampaignMissingBaseGs1(_)
            | Self::AlreadyAssigned { .. }
            | Self::AlreadyRedeemed(_)
            | Self::CouponExpired(_)
            | Self::InvalidCouponStatus { .. }
            | Self::InvalidStatusTransition { .. }
            | Self::DuplicateCode(_)
            | Self::AlreadyExists { .. }
            | Self::CodeGenerationExhausted { .. } => ErrorKind::Conflict,
            Self::ClearingHouse(_) | Self::DependencyTimeout { .. } | Self::CodeImage(_) => {
                ErrorKind::Dependency
            }
            Self::StepExecution { .. } => ErrorKind::StepExecution,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Dependency) || matches!(self, Self::Database(_))
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidDateRange { .. } => "INVALID_DATE_RANGE",
            Self::CampaignNotFound(_) => "CAMPAIGN_NOT_FOUND",
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::InfluencerNotFound(_) => "INFLUENCER_NOT_FOUND",
            Self::CustomerNotFound(_) => "CUSTOMER_NOT_FOUND",
            Self::CouponNotFound(_) => "COUPON_NOT_FOUND",
            Self::AffiliateNotFound(_) => "AFFILIATE_NOT_FOUND",
            Self::AutomationNotFound(_) => "AUTOMATION_NOT_FOUND",
            Self::CampaignMissingBaseGs1(_) => "INVALID_STATE",
            Self::AlreadyAssigned { .. } => "ALREADY_ASSIGNED",
            Self::AlreadyRedeemed(_) => "ALREADY_REDEEMED",
            Self::CouponExpired(_) => "COUPON_EXPIRED",
            Self::InvalidCouponStatus { .. } => "INVALID_COUPON_STATUS",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::DuplicateCode(_) => "DUPLICATE_CODE",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::CodeGenerationExhausted { .. } => "CODE_GENERATION_EXHAUSTED",
            Self::ClearingHouse(_) => "CLEARING_HOUSE_ERROR",
            Self::DependencyTimeout { .. } => "DEPENDENCY_TIMEOUT",
            Self::CodeImage(_) => "CODE_IMAGE_ERROR",
            Self::StepExecution { .. } => "STEP_EXECUTION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<validator::ValidationErrors> for PromoError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
