//! 分销商服务
//!
//! 将客户转为可获得佣金的分销商，并分配全局唯一的分销码。
//! 每个客户至多一个分销商；重复调用返回已有记录。

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AffiliateConfig;
use crate::error::{PromoError, Result};
use crate::models::Affiliate;
use crate::repository::{AffiliateRepositoryTrait, CustomerRepositoryTrait};
use crate::service::dto::{AffiliateOptions, AffiliateResponse};

const CODE_PREFIX_LEN: usize = 6;
const CODE_SUFFIX_LEN: usize = 3;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// 分销码生成器
#[cfg_attr(test, mockall::automock)]
pub trait AffiliateCodeGenerator: Send + Sync {
    fn generate(&self, customer_id: &str) -> String;
}

/// 默认生成器：客户 ID 前 6 位字母数字（大写）+ 3 位随机字母数字
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomAffiliateCodeGenerator;

impl AffiliateCodeGenerator for RandomAffiliateCodeGenerator {
    fn generate(&self, customer_id: &str) -> String {
        let prefix: String = customer_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(CODE_PREFIX_LEN)
            .collect::<String>()
            .to_ascii_uppercase();
        let mut rng = rand::rng();
        let suffix: String = (0..CODE_SUFFIX_LEN)
            .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
            .collect();
        format!("{prefix}{suffix}")
    }
}

/// 分销商服务
pub struct AffiliateService<CR, FR>
where
    CR: CustomerRepositoryTrait,
    FR: AffiliateRepositoryTrait,
{
    customer_repo: Arc<CR>,
    affiliate_repo: Arc<FR>,
    code_generator: Arc<dyn AffiliateCodeGenerator>,
    config: AffiliateConfig,
    base_url: String,
}

impl<CR, FR> AffiliateService<CR, FR>
where
    CR: CustomerRepositoryTrait,
    FR: AffiliateRepositoryTrait,
{
    pub fn new(
        customer_repo: Arc<CR>,
        affiliate_repo: Arc<FR>,
        code_generator: Arc<dyn AffiliateCodeGenerator>,
        config: AffiliateConfig,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            customer_repo,
            affiliate_repo,
            code_generator,
            config,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 将客户转为分销商
    ///
    /// 幂等：客户已有分销商时原样返回；并发竞争中落败的一方返回胜出者的记录。
    /// 分销码冲突（含写入时的唯一约束冲突）会重新生成，最多尝试 `max_code_attempts` 次。
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn create(
        &self,
        customer_id: &str,
        options: AffiliateOptions,
    ) -> Result<AffiliateResponse> {
        let commission_percent = options
            .commission_percent
            .unwrap_or(self.config.default_commission_percent);
        if !(commission_percent > 0.0 && commission_percent <= 100.0) {
            return Err(PromoError::Validation(format!(
                "佣金比例必须在 (0, 100] 范围内: {}",
                commission_percent
            )));
        }

        let customer = self
            .customer_repo
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| PromoError::CustomerNotFound(customer_id.to_string()))?;

        if let Some(existing) = self
            .affiliate_repo
            .find_affiliate_by_customer(customer_id)
            .await?
        {
            debug!(affiliate_id = %existing.id, "客户已是分销商，返回已有记录");
            return Ok(self.to_response(&existing));
        }

        let max_attempts = self.config.max_code_attempts.max(1);
        for attempt in 1..=max_attempts {
            let code = self.code_generator.generate(customer_id);

            if self
                .affiliate_repo
                .find_affiliate_by_code(&code)
                .await?
                .is_some()
            {
                debug!(attempt, code = %code, "分销码已存在，重新生成");
                continue;
            }

            let affiliate = Affiliate {
                id: Uuid::new_v4().to_string(),
                customer_id: customer_id.to_string(),
                brand_id: customer.brand_id.clone(),
                code,
                commission_percent,
                total_earnings: 0.0,
                created_at: Utc::now(),
            };

            match self.affiliate_repo.insert_affiliate(&affiliate).await {
                Ok(()) => {
                    info!(
                        affiliate_id = %affiliate.id,
                        code = %affiliate.code,
                        attempt,
                        "分销商创建成功"
                    );
                    return Ok(self.to_response(&affiliate));
                }
                Err(PromoError::DuplicateCode(code)) => {
                    debug!(attempt, code = %code, "写入时分销码冲突，重新生成");
                }
                Err(PromoError::AlreadyExists {
                    entity: "affiliate",
                    ..
                }) => {
                    // 并发创建落败，返回胜出者
                    let winner = self
                        .affiliate_repo
                        .find_affiliate_by_customer(customer_id)
                        .await?
                        .ok_or_else(|| {
                            PromoError::Internal(format!(
                                "客户 {} 的分销商唯一约束冲突但记录不存在",
                                customer_id
                            ))
                        })?;
                    return Ok(self.to_response(&winner));
                }
                Err(e) => return Err(e),
            }
        }

        warn!(attempts = max_attempts, "分销码生成次数耗尽");
        Err(PromoError::CodeGenerationExhausted {
            attempts: max_attempts,
        })
    }

    /// 累加分销商收益
    #[instrument(skip(self))]
    pub async fn record_earning(&self, affiliate_id: &str, amount: f64) -> Result<Affiliate> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(PromoError::Validation(format!(
                "收益金额必须为非负有限数值: {}",
                amount
            )));
        }
        self.affiliate_repo
            .add_earnings(affiliate_id, amount)
            .await?
            .ok_or_else(|| PromoError::AffiliateNotFound(affiliate_id.to_string()))
    }

    pub async fn find_by_customer(&self, customer_id: &str) -> Result<Option<Affiliate>> {
        self.affiliate_repo
            .find_affiliate_by_customer(customer_id)
            .await
    }

    /// 分销链接落地
    pub async fn get_by_code(&self, code: &str) -> Result<AffiliateResponse> {
        self.affiliate_repo
            .find_affiliate_by_code(code)
            .await?
            .map(|a| self.to_response(&a))
            .ok_or_else(|| PromoError::AffiliateNotFound(code.to_string()))
    }

    /// 品牌下的分销商，按创建时间倒序
    pub async fn list_by_brand(&self, brand_id: &str) -> Result<Vec<Affiliate>> {
        self.affiliate_repo.list_affiliates_by_brand(brand_id).await
    }

    fn to_response(&self, affiliate: &Affiliate) -> AffiliateResponse {
        AffiliateResponse::from_affiliate(affiliate, &self.base_url)
    }
}
