//! 客户服务
//!
//! 按 (品牌, 邮箱) 查找或创建客户；新建客户时异步触发 `customer_created` 自动化。

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::automation::AutomationTrigger;
use crate::error::{PromoError, Result};
use crate::models::{AutomationEvent, Customer, TriggerType};
use crate::repository::CustomerRepositoryTrait;
use crate::service::dto::{CaptureCustomerRequest, CaptureCustomerResponse};

/// 客户服务
pub struct CustomerService<CR>
where
    CR: CustomerRepositoryTrait,
{
    customer_repo: Arc<CR>,
    automations: Arc<dyn AutomationTrigger>,
}

impl<CR> CustomerService<CR>
where
    CR: CustomerRepositoryTrait,
{
    pub fn new(customer_repo: Arc<CR>, automations: Arc<dyn AutomationTrigger>) -> Self {
        Self {
            customer_repo,
            automations,
        }
    }

    /// 登记客户
    #[instrument(skip(self, request), fields(brand_id = %request.brand_id))]
    pub async fn capture(&self, request: CaptureCustomerRequest) -> Result<CaptureCustomerResponse> {
        request.validate()?;
        let email = request.email.trim().to_lowercase();

        if let Some(existing) = self
            .customer_repo
            .find_customer_by_email(&request.brand_id, &email)
            .await?
        {
            debug!(customer_id = %existing.id, "客户已存在");
            return Ok(CaptureCustomerResponse {
                customer_id: existing.id,
                is_new_customer: false,
            });
        }

        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            brand_id: request.brand_id.clone(),
            email: email.clone(),
            phone: request.phone.clone(),
            total_redemptions: 0,
            is_affiliate: false,
            created_at: Utc::now(),
        };

        match self.customer_repo.insert_customer(&customer).await {
            Ok(()) => {}
            Err(PromoError::AlreadyExists { .. }) => {
                // 并发登记落败，返回胜出者
                let winner = self
                    .customer_repo
                    .find_customer_by_email(&request.brand_id, &email)
                    .await?
                    .ok_or_else(|| {
                        PromoError::Internal(format!("客户唯一约束冲突但记录不存在: {email}"))
                    })?;
                return Ok(CaptureCustomerResponse {
                    customer_id: winner.id,
                    is_new_customer: false,
                });
            }
            Err(e) => return Err(e),
        }

        info!(customer_id = %customer.id, "新客户登记成功");

        let event = AutomationEvent {
            customer_id: Some(customer.id.clone()),
            email: Some(customer.email.clone()),
            phone: customer.phone.clone(),
            ..AutomationEvent::for_brand(customer.brand_id.clone())
        };
        drop(self.automations.fire(TriggerType::CustomerCreated, event));

        Ok(CaptureCustomerResponse {
            customer_id: customer.id,
            is_new_customer: true,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Customer> {
        self.customer_repo
            .get_customer(id)
            .await?
            .ok_or_else(|| PromoError::CustomerNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::MockAutomationTrigger;
    use crate::repository::{MemoryRepository, MockCustomerRepositoryTrait};

    fn request(email: &str) -> CaptureCustomerRequest {
        CaptureCustomerRequest {
            brand_id: "brand-1".into(),
            email: email.into(),
            phone: None,
        }
    }

    fn trigger_expecting(times: usize) -> MockAutomationTrigger {
        let mut trigger = MockAutomationTrigger::new();
        trigger
            .expect_fire()
            .withf(|t, event| {
                *t == TriggerType::CustomerCreated
                    && event.customer_id.is_some()
                    && event.email.as_deref() == Some("jane@example.com")
            })
            .times(times)
            .returning(|_, _| tokio::spawn(async { Vec::new() }));
        trigger
    }

    #[tokio::test]
    async fn test_capture_creates_then_finds() {
        let service = CustomerService::new(
            Arc::new(MemoryRepository::new()),
            Arc::new(trigger_expecting(1)),
        );

        let first = service.capture(request("Jane@Example.com")).await.unwrap();
        assert!(first.is_new_customer);

        let second = service.capture(request("jane@example.com")).await.unwrap();
        assert!(!second.is_new_customer);
        assert_eq!(first.customer_id, second.customer_id);
    }

    #[tokio::test]
    async fn test_capture_rejects_invalid_email() {
        let mut trigger = MockAutomationTrigger::new();
        trigger.expect_fire().never();
        let service = CustomerService::new(Arc::new(MemoryRepository::new()), Arc::new(trigger));

        let err = service.capture(request("not-an-email")).await.unwrap_err();
        assert!(matches!(err, PromoError::Validation(_)));
    }

    #[tokio::test]
    async fn test_capture_race_loser_gets_existing_customer() {
        let mut repo = MockCustomerRepositoryTrait::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_find_customer_by_email()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(None));
        repo.expect_insert_customer()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|c| {
                Err(PromoError::AlreadyExists {
                    entity: "customer",
                    field: "email",
                    value: c.email.clone(),
                })
            });
        repo.expect_find_customer_by_email()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|brand_id, email| {
                Ok(Some(Customer {
                    id: "winner".into(),
                    brand_id: brand_id.to_string(),
                    email: email.to_string(),
                    phone: None,
                    total_redemptions: 0,
                    is_affiliate: false,
                    created_at: Utc::now(),
                }))
            });
        let mut trigger = MockAutomationTrigger::new();
        trigger.expect_fire().never();

        let service = CustomerService::new(Arc::new(repo), Arc::new(trigger));
        let resp = service.capture(request("jane@example.com")).await.unwrap();
        assert_eq!(resp.customer_id, "winner");
        assert!(!resp.is_new_customer);
    }
}
