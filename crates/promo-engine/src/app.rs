//! 服务装配
//!
//! 以内存仓储为底座组装全部服务，供模拟器和集成测试使用。
//! 延迟步骤存储可替换为 PostgreSQL 实现。

use std::sync::Arc;
use std::time::Duration;

use crate::automation::{
    AutomationEngine, AutomationTrigger, MemoryScheduledStepStore, ScheduledStepStore,
    ScheduledStepWorker, StepExecutor,
};
use crate::clearing_house::{MockClearingHouse, build_client};
use crate::code_image::PathCodeImageGenerator;
use crate::config::PromoConfig;
use crate::notification::LoggingNotificationSender;
use crate::repository::MemoryRepository;
use crate::service::{
    AffiliateService, AssignmentSettings, CampaignService, CouponAssignmentService,
    CustomerService, RandomAffiliateCodeGenerator, RedemptionService,
};

pub type MemoryAutomationEngine =
    AutomationEngine<MemoryRepository, MemoryRepository, MemoryRepository>;
pub type MemoryCampaignService = CampaignService<MemoryRepository, MemoryRepository>;
pub type MemoryAssignmentService =
    CouponAssignmentService<MemoryRepository, MemoryRepository, MemoryRepository>;
pub type MemoryAffiliateService = AffiliateService<MemoryRepository, MemoryRepository>;

/// 装配完成的推广引擎
pub struct PromoApp {
    pub repo: Arc<MemoryRepository>,
    pub clearing_house: Arc<MockClearingHouse>,
    pub notifier: Arc<LoggingNotificationSender>,
    pub step_store: Arc<dyn ScheduledStepStore>,
    pub campaigns: MemoryCampaignService,
    pub assignments: MemoryAssignmentService,
    pub redemptions: RedemptionService<MemoryRepository>,
    pub customers: CustomerService<MemoryRepository>,
    pub affiliates: Arc<MemoryAffiliateService>,
    pub automations: MemoryAutomationEngine,
    pub worker: ScheduledStepWorker,
}

impl PromoApp {
    pub fn in_memory(config: &PromoConfig) -> Self {
        let lease = Duration::from_secs(config.automation.claim_lease_secs);
        Self::with_step_store(config, Arc::new(MemoryScheduledStepStore::with_lease(lease)))
    }

    pub fn with_step_store(config: &PromoConfig, step_store: Arc<dyn ScheduledStepStore>) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let clearing_house = build_client(&config.clearing_house);
        let notifier = Arc::new(LoggingNotificationSender::new());

        let campaigns = CampaignService::new(
            repo.clone(),
            repo.clone(),
            config.clearing_house.default_funder_id.clone(),
        );
        let assignments = CouponAssignmentService::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            clearing_house.clone(),
            Arc::new(PathCodeImageGenerator::new(
                config.app.code_image_prefix.clone(),
            )),
            AssignmentSettings::from_config(&config.app, &config.clearing_house),
        );

        let affiliates = Arc::new(AffiliateService::new(
            repo.clone(),
            repo.clone(),
            Arc::new(RandomAffiliateCodeGenerator),
            config.affiliate.clone(),
            config.app.base_url.clone(),
        ));

        let automations = AutomationEngine::new(
            repo.clone(),
            StepExecutor::new(repo.clone(), affiliates.clone(), notifier.clone()),
            step_store.clone(),
            config.automation.enabled,
        );
        let trigger: Arc<dyn AutomationTrigger> = Arc::new(automations.clone());

        let redemptions = RedemptionService::new(repo.clone(), trigger.clone());
        let customers = CustomerService::new(repo.clone(), trigger);

        let worker = ScheduledStepWorker::new(
            step_store.clone(),
            Arc::new(automations.clone()),
            config.automation.batch_size,
            Duration::from_secs(config.automation.poll_interval_secs),
        );

        Self {
            repo,
            clearing_house,
            notifier,
            step_store,
            campaigns,
            assignments,
            redemptions,
            customers,
            affiliates,
            automations,
            worker,
        }
    }
}
