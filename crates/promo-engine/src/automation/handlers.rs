//! 步骤动作处理器
//!
//! 按动作变体穷尽匹配分派。处理器返回的错误由引擎转换为步骤失败记录，
//! 不会中断同一自动化的后续步骤。

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use super::dto::StepOutcome;
use crate::error::{PromoError, Result};
use crate::models::{AutomationEvent, AutomationStep, Customer, StepAction};
use crate::notification::{NotificationSender, OutboundMessage};
use crate::repository::{AffiliateRepositoryTrait, CustomerRepositoryTrait};
use crate::service::affiliate_service::AffiliateService;
use crate::service::dto::AffiliateOptions;

const DEFAULT_EMAIL_TEMPLATE: &str = "default";
const DEFAULT_EMAIL_SUBJECT: &str = "No subject";

/// 步骤执行器
pub struct StepExecutor<CR, FR>
where
    CR: CustomerRepositoryTrait,
    FR: AffiliateRepositoryTrait,
{
    customer_repo: Arc<CR>,
    affiliates: Arc<AffiliateService<CR, FR>>,
    notifier: Arc<dyn NotificationSender>,
}

impl<CR, FR> StepExecutor<CR, FR>
where
    CR: CustomerRepositoryTrait,
    FR: AffiliateRepositoryTrait,
{
    pub fn new(
        customer_repo: Arc<CR>,
        affiliates: Arc<AffiliateService<CR, FR>>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            customer_repo,
            affiliates,
            notifier,
        }
    }

    pub async fn execute(
        &self,
        step: &AutomationStep,
        event: &AutomationEvent,
    ) -> Result<StepOutcome> {
        match &step.action {
            StepAction::SendEmail { template, subject } => {
                self.send_email(step.step_order, template.as_deref(), subject.as_deref(), event)
                    .await
            }
            StepAction::SendSms { message } => {
                self.send_sms(step.step_order, message.as_deref(), event)
                    .await
            }
            StepAction::CreateAffiliate { commission_percent } => {
                self.create_affiliate(*commission_percent, event).await
            }
            StepAction::Wait => Ok(StepOutcome::Succeeded),
        }
    }

    async fn send_email(
        &self,
        step_order: i32,
        template: Option<&str>,
        subject: Option<&str>,
        event: &AutomationEvent,
    ) -> Result<StepOutcome> {
        let recipient = match &event.email {
            Some(email) => Some(email.clone()),
            None => self.load_customer(event).await?.map(|c| c.email),
        };
        let Some(recipient) = recipient else {
            warn!(step_order, "事件缺少邮箱，跳过邮件步骤");
            return Ok(StepOutcome::skipped("no email recipient"));
        };

        let message = OutboundMessage::email(
            recipient,
            template.unwrap_or(DEFAULT_EMAIL_TEMPLATE),
            subject.unwrap_or(DEFAULT_EMAIL_SUBJECT),
        )
        .with_data("event", json!(event));
        self.deliver(step_order, &message).await
    }

    async fn send_sms(
        &self,
        step_order: i32,
        body: Option<&str>,
        event: &AutomationEvent,
    ) -> Result<StepOutcome> {
        let body = body.unwrap_or_default();
        if body.is_empty() {
            warn!(step_order, "短信内容为空，按空内容发送");
        }

        let recipient = match &event.phone {
            Some(phone) => Some(phone.clone()),
            None => self.load_customer(event).await?.and_then(|c| c.phone),
        };
        let Some(recipient) = recipient else {
            warn!(step_order, "事件缺少手机号，跳过短信步骤");
            return Ok(StepOutcome::skipped("no sms recipient"));
        };

        let message = OutboundMessage::sms(recipient, body).with_data("event", json!(event));
        self.deliver(step_order, &message).await
    }

    async fn create_affiliate(
        &self,
        commission_percent: Option<f64>,
        event: &AutomationEvent,
    ) -> Result<StepOutcome> {
        let Some(customer_id) = event.customer_id.as_deref() else {
            warn!("事件缺少 customer_id，无法创建分销商");
            return Ok(StepOutcome::skipped("missing customer id"));
        };

        if self.affiliates.find_by_customer(customer_id).await?.is_some() {
            debug!(customer_id = %customer_id, "客户已是分销商");
            return Ok(StepOutcome::skipped("customer is already an affiliate"));
        }

        let affiliate = self
            .affiliates
            .create(customer_id, AffiliateOptions { commission_percent })
            .await?;
        info!(
            customer_id = %customer_id,
            affiliate_id = %affiliate.id,
            code = %affiliate.code,
            "自动化已为客户创建分销商"
        );
        Ok(StepOutcome::Succeeded)
    }

    async fn load_customer(&self, event: &AutomationEvent) -> Result<Option<Customer>> {
        match event.customer_id.as_deref() {
            Some(id) => self.customer_repo.get_customer(id).await,
            None => Ok(None),
        }
    }

    async fn deliver(&self, step_order: i32, message: &OutboundMessage) -> Result<StepOutcome> {
        let receipt = self.notifier.send(message).await?;
        if receipt.success {
            Ok(StepOutcome::Succeeded)
        } else {
            Err(PromoError::StepExecution {
                step_order,
                reason: receipt
                    .error
                    .unwrap_or_else(|| "notification rejected".to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AffiliateConfig;
    use crate::notification::{DeliveryReceipt, MockNotificationSender, NotificationChannel};
    use crate::repository::MemoryRepository;
    use crate::service::affiliate_service::RandomAffiliateCodeGenerator;
    use chrono::Utc;

    async fn executor_with(
        notifier: MockNotificationSender,
    ) -> (StepExecutor<MemoryRepository, MemoryRepository>, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        repo.insert_customer(&Customer {
            id: "cust-1".into(),
            brand_id: "brand-1".into(),
            email: "jane@example.com".into(),
            phone: Some("+15550001".into()),
            total_redemptions: 0,
            is_affiliate: false,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        let affiliates = Arc::new(AffiliateService::new(
            repo.clone(),
            repo.clone(),
            Arc::new(RandomAffiliateCodeGenerator),
            AffiliateConfig::default(),
            "http://localhost:5173",
        ));
        (
            StepExecutor::new(repo.clone(), affiliates, Arc::new(notifier)),
            repo,
        )
    }

    fn step(action: StepAction) -> AutomationStep {
        AutomationStep {
            step_order: 1,
            delay_seconds: 0,
            action,
        }
    }

    fn customer_event() -> AutomationEvent {
        AutomationEvent {
            customer_id: Some("cust-1".into()),
            ..AutomationEvent::for_brand("brand-1")
        }
    }

    #[tokio::test]
    async fn test_email_falls_back_to_customer_email_and_defaults() {
        let mut notifier = MockNotificationSender::new();
        notifier
            .expect_send()
            .withf(|m| {
                m.channel == NotificationChannel::Email
                    && m.recipient == "jane@example.com"
                    && m.template == "default"
                    && m.subject.as_deref() == Some("No subject")
            })
            .times(1)
            .returning(|m| Ok(DeliveryReceipt::ok(m)));
        let (executor, _) = executor_with(notifier).await;

        let outcome = executor
            .execute(
                &step(StepAction::SendEmail {
                    template: None,
                    subject: None,
                }),
                &customer_event(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_email_without_recipient_is_skipped() {
        let mut notifier = MockNotificationSender::new();
        notifier.expect_send().never();
        let (executor, _) = executor_with(notifier).await;

        let outcome = executor
            .execute(
                &step(StepAction::SendEmail {
                    template: Some("welcome".into()),
                    subject: None,
                }),
                &AutomationEvent::for_brand("brand-1"),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_sms_prefers_event_phone() {
        let mut notifier = MockNotificationSender::new();
        notifier
            .expect_send()
            .withf(|m| m.channel == NotificationChannel::Sms && m.recipient == "+15559999")
            .times(1)
            .returning(|m| Ok(DeliveryReceipt::ok(m)));
        let (executor, _) = executor_with(notifier).await;

        let event = AutomationEvent {
            phone: Some("+15559999".into()),
            ..customer_event()
        };
        let outcome = executor
            .execute(
                &step(StepAction::SendSms {
                    message: Some("Thanks!".into()),
                }),
                &event,
            )
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_sms_without_message_is_sent_with_empty_body() {
        let mut notifier = MockNotificationSender::new();
        notifier
            .expect_send()
            .withf(|m| {
                m.channel == NotificationChannel::Sms
                    && m.recipient == "+15550001"
                    && m.body.as_deref() == Some("")
            })
            .times(1)
            .returning(|m| Ok(DeliveryReceipt::ok(m)));
        let (executor, _) = executor_with(notifier).await;

        let outcome = executor
            .execute(&step(StepAction::SendSms { message: None }), &customer_event())
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_rejected_delivery_is_step_error() {
        let mut notifier = MockNotificationSender::new();
        notifier
            .expect_send()
            .returning(|m| Ok(DeliveryReceipt::failed(m, "mailbox full")));
        let (executor, _) = executor_with(notifier).await;

        let err = executor
            .execute(
                &step(StepAction::SendEmail {
                    template: None,
                    subject: None,
                }),
                &customer_event(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PromoError::StepExecution { step_order: 1, .. }));
    }

    #[tokio::test]
    async fn test_create_affiliate_then_skip_when_already_affiliate() {
        let (executor, repo) = executor_with(MockNotificationSender::new()).await;
        let action = step(StepAction::CreateAffiliate {
            commission_percent: Some(15.0),
        });

        let first = executor.execute(&action, &customer_event()).await.unwrap();
        assert_eq!(first, StepOutcome::Succeeded);
        let affiliate = repo
            .find_affiliate_by_customer("cust-1")
            .await
            .unwrap()
            .unwrap();
        assert!((affiliate.commission_percent - 15.0).abs() < f64::EPSILON);

        let second = executor.execute(&action, &customer_event()).await.unwrap();
        assert!(matches!(second, StepOutcome::Skipped { .. }));
        assert_eq!(repo.affiliate_count(), 1);
    }

    #[tokio::test]
    async fn test_create_affiliate_without_customer_is_skipped() {
        let (executor, repo) = executor_with(MockNotificationSender::new()).await;
        let outcome = executor
            .execute(
                &step(StepAction::CreateAffiliate {
                    commission_percent: None,
                }),
                &AutomationEvent::for_brand("brand-1"),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Skipped { .. }));
        assert_eq!(repo.affiliate_count(), 0);
    }

    #[tokio::test]
    async fn test_create_affiliate_for_deleted_customer_errors() {
        let (executor, repo) = executor_with(MockNotificationSender::new()).await;
        repo.delete_customer("cust-1").await.unwrap();
        let err = executor
            .execute(
                &step(StepAction::CreateAffiliate {
                    commission_percent: None,
                }),
                &customer_event(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PromoError::CustomerNotFound(_)));
    }
}
