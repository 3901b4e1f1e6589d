//! 内存仓储实现
//!
//! 为模拟器和测试提供完整的仓储实现。单行条件更新走 DashMap 行锁；
//! 需要同时维护多个唯一索引或多张表的写操作在事务锁内完成，
//! 读操作不加事务锁。

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::memory_store::{MemoryTable, UniqueIndex};
use super::traits::*;
use crate::error::{PromoError, Result};
use crate::models::{
    Affiliate, AssignmentStatus, Automation, Campaign, CampaignStatus, CouponAssignment, Customer,
    Influencer, Product, Redemption, TriggerType,
};

fn pair_key(a: &str, b: &str) -> String {
    format!("{a}|{b}")
}

/// 内存仓储
///
/// 克隆后共享同一份数据
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    products: MemoryTable<Product>,
    campaigns: MemoryTable<Campaign>,
    influencers: MemoryTable<Influencer>,
    assignments: MemoryTable<CouponAssignment>,
    /// campaign_id|influencer_id -> assignment id
    assignment_pairs: UniqueIndex,
    /// serialized_gs1 -> assignment id
    assignment_codes: UniqueIndex,
    redemptions: MemoryTable<Redemption>,
    customers: MemoryTable<Customer>,
    /// brand_id|email -> customer id
    customer_emails: UniqueIndex,
    affiliates: MemoryTable<Affiliate>,
    /// customer_id -> affiliate id
    affiliate_customers: UniqueIndex,
    /// code -> affiliate id
    affiliate_codes: UniqueIndex,
    automations: MemoryTable<Automation>,
    tx: Arc<Mutex<()>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.count()
    }

    pub fn redemption_count(&self) -> usize {
        self.redemptions.count()
    }

    pub fn affiliate_count(&self) -> usize {
        self.affiliates.count()
    }

    pub fn customer_count(&self) -> usize {
        self.customers.count()
    }
}

#[async_trait]
impl ProductRepositoryTrait for MemoryRepository {
    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        Ok(self.products.get(id))
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        if !self.products.insert_new(&product.id, product.clone()) {
            return Err(PromoError::AlreadyExists {
                entity: "product",
                field: "id",
                value: product.id.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CampaignRepositoryTrait for MemoryRepository {
    async fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        if !self.campaigns.insert_new(&campaign.id, campaign.clone()) {
            return Err(PromoError::AlreadyExists {
                entity: "campaign",
                field: "id",
                value: campaign.id.clone(),
            });
        }
        Ok(())
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        Ok(self.campaigns.get(id))
    }

    async fn list_campaigns_by_brand(&self, brand_id: &str) -> Result<Vec<Campaign>> {
        let mut campaigns = self.campaigns.list_by(|c| c.brand_id == brand_id);
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }

    async fn update_campaign_status(
        &self,
        id: &str,
        expected: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<Option<Campaign>> {
        let updated = self.campaigns.update_if(
            id,
            |c| c.status == expected,
            |c| {
                c.status = to;
                c.updated_at = chrono::Utc::now();
            },
        );
        Ok(updated.map(|r| r.unwrap_or_else(|current| current)))
    }
}

#[async_trait]
impl InfluencerRepositoryTrait for MemoryRepository {
    async fn insert_influencer(&self, influencer: &Influencer) -> Result<()> {
        if !self.influencers.insert_new(&influencer.id, influencer.clone()) {
            return Err(PromoError::AlreadyExists {
                entity: "influencer",
                field: "id",
                value: influencer.id.clone(),
            });
        }
        Ok(())
    }

    async fn get_influencer(&self, id: &str) -> Result<Option<Influencer>> {
        Ok(self.influencers.get(id))
    }
}

#[async_trait]
impl CouponRepositoryTrait for MemoryRepository {
    async fn find_assignment(
        &self,
        campaign_id: &str,
        influencer_id: &str,
    ) -> Result<Option<CouponAssignment>> {
        Ok(self
            .assignment_pairs
            .lookup(&pair_key(campaign_id, influencer_id))
            .and_then(|id| self.assignments.get(&id)))
    }

    async fn get_assignment_by_code(
        &self,
        serialized_gs1: &str,
    ) -> Result<Option<CouponAssignment>> {
        Ok(self
            .assignment_codes
            .lookup(serialized_gs1)
            .and_then(|id| self.assignments.get(&id)))
    }

    async fn insert_assignment(&self, assignment: &CouponAssignment) -> Result<()> {
        let _tx = self.tx.lock();

        let pair = pair_key(&assignment.campaign_id, &assignment.influencer_id);
        if self.assignment_pairs.claim(&pair, &assignment.id).is_err() {
            return Err(PromoError::AlreadyAssigned {
                campaign_id: assignment.campaign_id.clone(),
                influencer_id: assignment.influencer_id.clone(),
            });
        }
        if self
            .assignment_codes
            .claim(&assignment.serialized_gs1, &assignment.id)
            .is_err()
        {
            self.assignment_pairs.release(&pair, &assignment.id);
            return Err(PromoError::DuplicateCode(assignment.serialized_gs1.clone()));
        }

        self.assignments
            .insert_new(&assignment.id, assignment.clone());
        Ok(())
    }

    async fn list_assignments_by_influencer(
        &self,
        influencer_id: &str,
    ) -> Result<Vec<CouponAssignment>> {
        let mut rows = self.assignments.list_by(|a| a.influencer_id == influencer_id);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_assignments_by_campaign(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<CouponAssignment>> {
        let mut rows = self.assignments.list_by(|a| a.campaign_id == campaign_id);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn expire_assignment(&self, serialized_gs1: &str) -> Result<CouponAssignment> {
        let _tx = self.tx.lock();

        let id = self
            .assignment_codes
            .lookup(serialized_gs1)
            .ok_or_else(|| PromoError::CouponNotFound(serialized_gs1.to_string()))?;

        match self.assignments.update_if(
            &id,
            |a| a.status == AssignmentStatus::Active,
            |a| {
                a.status = AssignmentStatus::Expired;
                a.updated_at = chrono::Utc::now();
            },
        ) {
            Some(Ok(updated)) => Ok(updated),
            Some(Err(current)) => Err(PromoError::InvalidCouponStatus {
                code: serialized_gs1.to_string(),
                status: current.status,
            }),
            None => Err(PromoError::CouponNotFound(serialized_gs1.to_string())),
        }
    }
}

#[async_trait]
impl RedemptionRepositoryTrait for MemoryRepository {
    async fn redeem(&self, command: &RedeemCommand) -> Result<RedeemOutcome> {
        let _tx = self.tx.lock();

        // 先完成全部校验，之后的写入不会失败，从而保证整体生效或整体不生效
        let assignment = self
            .assignment_codes
            .lookup(&command.serialized_gs1)
            .and_then(|id| self.assignments.get(&id))
            .ok_or_else(|| PromoError::CouponNotFound(command.serialized_gs1.clone()))?;

        match assignment.status {
            AssignmentStatus::Active => {}
            AssignmentStatus::Redeemed => {
                return Err(PromoError::AlreadyRedeemed(command.serialized_gs1.clone()));
            }
            AssignmentStatus::Expired => {
                return Err(PromoError::CouponExpired(command.serialized_gs1.clone()));
            }
        }

        let brand_id = self
            .campaigns
            .get(&assignment.campaign_id)
            .map(|c| c.brand_id)
            .ok_or_else(|| PromoError::CampaignNotFound(assignment.campaign_id.clone()))?;
        if self.influencers.get(&assignment.influencer_id).is_none() {
            return Err(PromoError::InfluencerNotFound(
                assignment.influencer_id.clone(),
            ));
        }
        if let Some(customer_id) = &command.customer_id {
            if self.customers.get(customer_id).is_none() {
                return Err(PromoError::CustomerNotFound(customer_id.clone()));
            }
        }

        let assignment = match self.assignments.update_if(
            &assignment.id,
            |a| a.status == AssignmentStatus::Active,
            |a| {
                a.status = AssignmentStatus::Redeemed;
                a.updated_at = command.redeemed_at;
            },
        ) {
            Some(Ok(updated)) => updated,
            Some(Err(_)) => {
                return Err(PromoError::AlreadyRedeemed(command.serialized_gs1.clone()));
            }
            None => return Err(PromoError::CouponNotFound(command.serialized_gs1.clone())),
        };

        let redemption = Redemption {
            id: command.redemption_id.clone(),
            coupon_assignment_id: assignment.id.clone(),
            campaign_id: assignment.campaign_id.clone(),
            influencer_id: assignment.influencer_id.clone(),
            serialized_gs1: assignment.serialized_gs1.clone(),
            redeemed_at: command.redeemed_at,
            retailer_location: command.retailer_location.clone(),
            customer_id: command.customer_id.clone(),
        };
        self.redemptions.insert_new(&redemption.id, redemption.clone());

        let influencer_total = self
            .influencers
            .update(&assignment.influencer_id, |i| i.total_redemptions += 1)
            .map(|i| i.total_redemptions)
            .unwrap_or_default();

        let customer = command
            .customer_id
            .as_deref()
            .and_then(|id| self.customers.update(id, |c| c.total_redemptions += 1));

        debug!(
            serialized_gs1 = %assignment.serialized_gs1,
            influencer_total,
            "兑换原子单元已提交"
        );

        Ok(RedeemOutcome {
            redemption,
            brand_id,
            assignment,
            influencer_total_redemptions: influencer_total,
            customer,
        })
    }

    async fn list_redemptions_by_influencer(
        &self,
        influencer_id: &str,
    ) -> Result<Vec<Redemption>> {
        let mut rows = self.redemptions.list_by(|r| r.influencer_id == influencer_id);
        rows.sort_by(|a, b| b.redeemed_at.cmp(&a.redeemed_at));
        Ok(rows)
    }

    async fn count_redemptions_by_influencer(&self, influencer_id: &str) -> Result<i64> {
        Ok(self
            .redemptions
            .count_by(|r| r.influencer_id == influencer_id) as i64)
    }
}

#[async_trait]
impl CustomerRepositoryTrait for MemoryRepository {
    async fn get_customer(&self, id: &str) -> Result<Option<Customer>> {
        Ok(self.customers.get(id))
    }

    async fn find_customer_by_email(
        &self,
        brand_id: &str,
        email: &str,
    ) -> Result<Option<Customer>> {
        Ok(self
            .customer_emails
            .lookup(&pair_key(brand_id, email))
            .and_then(|id| self.customers.get(&id)))
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        let _tx = self.tx.lock();

        if self
            .customer_emails
            .claim(&pair_key(&customer.brand_id, &customer.email), &customer.id)
            .is_err()
        {
            return Err(PromoError::AlreadyExists {
                entity: "customer",
                field: "email",
                value: customer.email.clone(),
            });
        }
        self.customers.insert_new(&customer.id, customer.clone());
        Ok(())
    }

    async fn delete_customer(&self, id: &str) -> Result<bool> {
        let _tx = self.tx.lock();

        match self.customers.remove(id) {
            Some(customer) => {
                self.customer_emails
                    .release(&pair_key(&customer.brand_id, &customer.email), id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AffiliateRepositoryTrait for MemoryRepository {
    async fn get_affiliate(&self, id: &str) -> Result<Option<Affiliate>> {
        Ok(self.affiliates.get(id))
    }

    async fn find_affiliate_by_customer(&self, customer_id: &str) -> Result<Option<Affiliate>> {
        Ok(self
            .affiliate_customers
            .lookup(customer_id)
            .and_then(|id| self.affiliates.get(&id)))
    }

    async fn find_affiliate_by_code(&self, code: &str) -> Result<Option<Affiliate>> {
        Ok(self
            .affiliate_codes
            .lookup(code)
            .and_then(|id| self.affiliates.get(&id)))
    }

    async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<()> {
        let _tx = self.tx.lock();

        if self.customers.get(&affiliate.customer_id).is_none() {
            return Err(PromoError::CustomerNotFound(affiliate.customer_id.clone()));
        }
        if self
            .affiliate_customers
            .claim(&affiliate.customer_id, &affiliate.id)
            .is_err()
        {
            return Err(PromoError::AlreadyExists {
                entity: "affiliate",
                field: "customer_id",
                value: affiliate.customer_id.clone(),
            });
        }
        if self
            .affiliate_codes
            .claim(&affiliate.code, &affiliate.id)
            .is_err()
        {
            self.affiliate_customers
                .release(&affiliate.customer_id, &affiliate.id);
            return Err(PromoError::DuplicateCode(affiliate.code.clone()));
        }

        self.affiliates.insert_new(&affiliate.id, affiliate.clone());
        self.customers
            .update(&affiliate.customer_id, |c| c.is_affiliate = true);
        Ok(())
    }

    async fn list_affiliates_by_brand(&self, brand_id: &str) -> Result<Vec<Affiliate>> {
        let mut rows = self.affiliates.list_by(|a| a.brand_id == brand_id);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn add_earnings(&self, id: &str, amount: f64) -> Result<Option<Affiliate>> {
        Ok(self.affiliates.update(id, |a| a.total_earnings += amount))
    }
}

#[async_trait]
impl AutomationRepositoryTrait for MemoryRepository {
    async fn insert_automation(&self, automation: &Automation) -> Result<()> {
        if !self.automations.insert_new(&automation.id, automation.clone()) {
            return Err(PromoError::AlreadyExists {
                entity: "automation",
                field: "id",
                value: automation.id.clone(),
            });
        }
        Ok(())
    }

    async fn get_automation(&self, id: &str) -> Result<Option<Automation>> {
        Ok(self.automations.get(id))
    }

    async fn list_automations_by_brand(&self, brand_id: &str) -> Result<Vec<Automation>> {
        let mut rows = self.automations.list_by(|a| a.brand_id == brand_id);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_active_automations(
        &self,
        brand_id: &str,
        trigger_type: TriggerType,
    ) -> Result<Vec<Automation>> {
        let mut rows = self.automations.list_by(|a| {
            a.is_active && a.brand_id == brand_id && a.trigger_type == trigger_type
        });
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn set_automation_active(
        &self,
        id: &str,
        is_active: bool,
    ) -> Result<Option<Automation>> {
        Ok(self.automations.update(id, |a| a.is_active = is_active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn influencer(id: &str) -> Influencer {
        Influencer {
            id: id.to_string(),
            brand_id: "brand-1".into(),
            name: "Ava".into(),
            email: None,
            instagram_handle: Some("@ava".into()),
            tiktok_handle: None,
            total_redemptions: 0,
            created_at: Utc::now(),
        }
    }

    fn assignment(id: &str, influencer_id: &str, code: &str) -> CouponAssignment {
        CouponAssignment {
            id: id.to_string(),
            campaign_id: "camp-1".into(),
            influencer_id: influencer_id.to_string(),
            serialized_gs1: code.to_string(),
            status: AssignmentStatus::Active,
            tracking_link: format!("http://localhost/c/{code}"),
            qr_code_ref: format!("/codes/{code}.png"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn seed_campaign(repo: &MemoryRepository) {
        let now = Utc::now();
        repo.insert_campaign(&Campaign {
            id: "camp-1".into(),
            brand_id: "brand-1".into(),
            product_id: "prod-1".into(),
            retailer_id: None,
            name: "Launch".into(),
            discount_type: crate::models::DiscountType::Fixed,
            discount_value: 1.0,
            base_gs1: Some("81120012345678MOCK01".into()),
            campaign_start: now,
            campaign_end: now + chrono::Duration::days(1),
            status: CampaignStatus::Active,
            total_circulation: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    }

    fn redeem_command(code: &str, redemption_id: &str) -> RedeemCommand {
        RedeemCommand {
            serialized_gs1: code.to_string(),
            retailer_location: "store-9".into(),
            customer_id: None,
            redemption_id: redemption_id.to_string(),
            redeemed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_assignment_enforces_pair_uniqueness() {
        let repo = MemoryRepository::new();
        repo.insert_assignment(&assignment("a1", "inf-1", "CODE1"))
            .await
            .unwrap();

        let err = repo
            .insert_assignment(&assignment("a2", "inf-1", "CODE2"))
            .await
            .unwrap_err();
        assert!(matches!(err, PromoError::AlreadyAssigned { .. }));
        assert_eq!(repo.assignment_count(), 1);
        // 失败的插入不应残留编码索引
        assert!(repo.get_assignment_by_code("CODE2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_assignment_rejects_duplicate_code() {
        let repo = MemoryRepository::new();
        repo.insert_assignment(&assignment("a1", "inf-1", "CODE1"))
            .await
            .unwrap();

        let err = repo
            .insert_assignment(&assignment("a2", "inf-2", "CODE1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PromoError::DuplicateCode(_)));
        // 编码冲突时释放已占用的配对键
        assert!(repo.find_assignment("camp-1", "inf-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redeem_updates_all_effects_together() {
        let repo = MemoryRepository::new();
        seed_campaign(&repo).await;
        repo.insert_influencer(&influencer("inf-1")).await.unwrap();
        repo.insert_assignment(&assignment("a1", "inf-1", "CODE1"))
            .await
            .unwrap();

        let outcome = repo.redeem(&redeem_command("CODE1", "r1")).await.unwrap();
        assert_eq!(outcome.assignment.status, AssignmentStatus::Redeemed);
        assert_eq!(outcome.influencer_total_redemptions, 1);
        assert_eq!(outcome.brand_id, "brand-1");
        assert_eq!(outcome.redemption.retailer_location, "store-9");

        let err = repo.redeem(&redeem_command("CODE1", "r2")).await.unwrap_err();
        assert!(matches!(err, PromoError::AlreadyRedeemed(_)));
        assert_eq!(repo.redemption_count(), 1);
        assert_eq!(
            repo.get_influencer("inf-1").await.unwrap().unwrap().total_redemptions,
            1
        );
    }

    #[tokio::test]
    async fn test_redeem_with_unknown_customer_changes_nothing() {
        let repo = MemoryRepository::new();
        seed_campaign(&repo).await;
        repo.insert_influencer(&influencer("inf-1")).await.unwrap();
        repo.insert_assignment(&assignment("a1", "inf-1", "CODE1"))
            .await
            .unwrap();

        let mut command = redeem_command("CODE1", "r1");
        command.customer_id = Some("ghost".into());
        let err = repo.redeem(&command).await.unwrap_err();
        assert!(matches!(err, PromoError::CustomerNotFound(_)));

        let coupon = repo.get_assignment_by_code("CODE1").await.unwrap().unwrap();
        assert_eq!(coupon.status, AssignmentStatus::Active);
        assert_eq!(repo.redemption_count(), 0);
    }

    #[tokio::test]
    async fn test_expire_then_redeem_is_rejected_as_expired() {
        let repo = MemoryRepository::new();
        seed_campaign(&repo).await;
        repo.insert_influencer(&influencer("inf-1")).await.unwrap();
        repo.insert_assignment(&assignment("a1", "inf-1", "CODE1"))
            .await
            .unwrap();

        let expired = repo.expire_assignment("CODE1").await.unwrap();
        assert_eq!(expired.status, AssignmentStatus::Expired);

        let err = repo.expire_assignment("CODE1").await.unwrap_err();
        assert!(matches!(err, PromoError::InvalidCouponStatus { .. }));

        let err = repo.redeem(&redeem_command("CODE1", "r1")).await.unwrap_err();
        assert!(matches!(err, PromoError::CouponExpired(_)));
    }

    #[tokio::test]
    async fn test_customer_email_unique_per_brand() {
        let repo = MemoryRepository::new();
        let customer = Customer {
            id: "c1".into(),
            brand_id: "brand-1".into(),
            email: "a@example.com".into(),
            phone: None,
            total_redemptions: 0,
            is_affiliate: false,
            created_at: Utc::now(),
        };
        repo.insert_customer(&customer).await.unwrap();

        let dup = Customer {
            id: "c2".into(),
            ..customer.clone()
        };
        assert!(matches!(
            repo.insert_customer(&dup).await.unwrap_err(),
            PromoError::AlreadyExists { .. }
        ));

        let other_brand = Customer {
            id: "c3".into(),
            brand_id: "brand-2".into(),
            ..customer
        };
        repo.insert_customer(&other_brand).await.unwrap();
        assert_eq!(repo.customer_count(), 2);
    }
}
