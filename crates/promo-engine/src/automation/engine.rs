//! 自动化引擎
//!
//! 管理自动化定义，并在业务事件发生后异步执行匹配的自动化。
//!
//! ## 执行模型
//!
//! - 每个匹配的自动化在独立任务中执行，互不阻塞
//! - 同一自动化内的步骤严格按 step_order 顺序执行
//! - 单步失败只记录在执行日志中，不影响后续步骤
//! - 遇到带延迟的步骤时，将剩余步骤写入延迟步骤存储并挂起，
//!   由 `ScheduledStepWorker` 到期后恢复

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use promo_shared::observability::metrics;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::AutomationTrigger;
use super::dto::{AutomationRun, RunStatus, StepOutcome, StepRecord};
use super::handlers::StepExecutor;
use super::scheduler::{ScheduledStepStore, StepResumer};
use crate::error::{PromoError, Result};
use crate::models::{
    Automation, AutomationEvent, AutomationStep, ScheduledStep, ScheduledStepStatus, StepAction,
    TriggerType,
};
use crate::repository::{
    AffiliateRepositoryTrait, AutomationRepositoryTrait, CustomerRepositoryTrait,
};
use crate::service::dto::CreateAutomationRequest;

/// 自动化引擎
///
/// 内部状态共享，克隆开销很小，可直接交给后台任务和 Worker。
pub struct AutomationEngine<AR, CR, FR>
where
    AR: AutomationRepositoryTrait,
    CR: CustomerRepositoryTrait,
    FR: AffiliateRepositoryTrait,
{
    inner: Arc<EngineInner<AR, CR, FR>>,
}

struct EngineInner<AR, CR, FR>
where
    AR: AutomationRepositoryTrait,
    CR: CustomerRepositoryTrait,
    FR: AffiliateRepositoryTrait,
{
    automation_repo: Arc<AR>,
    executor: StepExecutor<CR, FR>,
    step_store: Arc<dyn ScheduledStepStore>,
    enabled: bool,
}

impl<AR, CR, FR> Clone for AutomationEngine<AR, CR, FR>
where
    AR: AutomationRepositoryTrait,
    CR: CustomerRepositoryTrait,
    FR: AffiliateRepositoryTrait,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<AR, CR, FR> AutomationEngine<AR, CR, FR>
where
    AR: AutomationRepositoryTrait + 'static,
    CR: CustomerRepositoryTrait + 'static,
    FR: AffiliateRepositoryTrait + 'static,
{
    pub fn new(
        automation_repo: Arc<AR>,
        executor: StepExecutor<CR, FR>,
        step_store: Arc<dyn ScheduledStepStore>,
        enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                automation_repo,
                executor,
                step_store,
                enabled,
            }),
        }
    }

    /// 创建自动化
    ///
    /// 步骤配置在此一次性解析为强类型动作，步骤按 step_order 升序保存。
    #[instrument(skip(self, request), fields(brand_id = %request.brand_id, name = %request.name))]
    pub async fn create(&self, request: CreateAutomationRequest) -> Result<Automation> {
        request.validate()?;

        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(request.steps.len());
        for step in &request.steps {
            if !seen.insert(step.step_order) {
                return Err(PromoError::Validation(format!(
                    "步骤序号重复: {}",
                    step.step_order
                )));
            }
            steps.push(AutomationStep {
                step_order: step.step_order,
                delay_seconds: step.delay_seconds,
                action: StepAction::parse(step.action_type, &step.action_config, step.step_order)?,
            });
        }
        steps.sort_by_key(|s| s.step_order);

        let automation = Automation {
            id: Uuid::new_v4().to_string(),
            brand_id: request.brand_id,
            name: request.name,
            trigger_type: request.trigger_type,
            is_active: request.is_active.unwrap_or(true),
            steps,
            created_at: Utc::now(),
        };
        self.inner
            .automation_repo
            .insert_automation(&automation)
            .await?;

        info!(
            automation_id = %automation.id,
            trigger = %automation.trigger_type,
            steps = automation.steps.len(),
            "自动化创建成功"
        );
        Ok(automation)
    }

    pub async fn get(&self, id: &str) -> Result<Automation> {
        self.inner
            .automation_repo
            .get_automation(id)
            .await?
            .ok_or_else(|| PromoError::AutomationNotFound(id.to_string()))
    }

    pub async fn list_by_brand(&self, brand_id: &str) -> Result<Vec<Automation>> {
        self.inner
            .automation_repo
            .list_automations_by_brand(brand_id)
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_active(&self, id: &str, is_active: bool) -> Result<Automation> {
        let automation = self
            .inner
            .automation_repo
            .set_automation_active(id, is_active)
            .await?
            .ok_or_else(|| PromoError::AutomationNotFound(id.to_string()))?;
        info!(automation_id = %id, is_active, "自动化启用状态已更新");
        Ok(automation)
    }

    /// 触发匹配的自动化
    ///
    /// 立即返回后台任务句柄，任何错误都不会传播给调用方。
    pub fn trigger(
        &self,
        trigger_type: TriggerType,
        event: AutomationEvent,
    ) -> JoinHandle<Vec<AutomationRun>> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run_trigger(trigger_type, event).await })
    }
}

impl<AR, CR, FR> EngineInner<AR, CR, FR>
where
    AR: AutomationRepositoryTrait + 'static,
    CR: CustomerRepositoryTrait + 'static,
    FR: AffiliateRepositoryTrait + 'static,
{
    async fn run_trigger(
        self: Arc<Self>,
        trigger_type: TriggerType,
        event: AutomationEvent,
    ) -> Vec<AutomationRun> {
        if !self.enabled {
            debug!(trigger = %trigger_type, "自动化已全局关闭，忽略触发");
            return Vec::new();
        }

        let automations = match self
            .automation_repo
            .list_active_automations(&event.brand_id, trigger_type)
            .await
        {
            Ok(list) => list,
            Err(e) => {
                error!(
                    trigger = %trigger_type,
                    brand_id = %event.brand_id,
                    error = %e,
                    "加载自动化失败"
                );
                return Vec::new();
            }
        };

        if automations.is_empty() {
            debug!(trigger = %trigger_type, brand_id = %event.brand_id, "没有匹配的自动化");
            return Vec::new();
        }
        info!(
            trigger = %trigger_type,
            brand_id = %event.brand_id,
            count = automations.len(),
            "触发自动化"
        );

        let mut tasks = JoinSet::new();
        for automation in automations {
            let inner = Arc::clone(&self);
            let event = event.clone();
            tasks.spawn(async move {
                inner
                    .execute_steps(
                        automation.id,
                        automation.name,
                        Some(trigger_type),
                        automation.steps,
                        event,
                        Utc::now(),
                        false,
                    )
                    .await
            });
        }

        let mut runs = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(run) => runs.push(run),
                Err(e) => error!(error = %e, "自动化任务异常退出"),
            }
        }
        runs
    }

    /// 顺序执行步骤，遇到未到期的延迟步骤时挂起
    ///
    /// `now` 是开始执行时的时钟，挂起时按已耗时推进，延迟从到达延迟步骤时起算。
    /// `first_delay_elapsed` 为 true 时第一个步骤的延迟视为已满足（从延迟步骤恢复）。
    #[allow(clippy::too_many_arguments)]
    async fn execute_steps(
        &self,
        automation_id: String,
        automation_name: String,
        trigger_type: Option<TriggerType>,
        steps: Vec<AutomationStep>,
        event: AutomationEvent,
        now: DateTime<Utc>,
        first_delay_elapsed: bool,
    ) -> AutomationRun {
        let started = Instant::now();
        let mut records = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let delay_elapsed = first_delay_elapsed && index == 0;
            if step.delay_seconds > 0 && !delay_elapsed {
                let reached_at = TimeDelta::from_std(started.elapsed())
                    .ok()
                    .and_then(|elapsed| now.checked_add_signed(elapsed))
                    .unwrap_or(now);
                let status = self
                    .suspend(
                        &automation_id,
                        &automation_name,
                        &steps[index..],
                        &event,
                        reached_at,
                    )
                    .await;
                return AutomationRun {
                    automation_id,
                    automation_name,
                    trigger_type,
                    steps: records,
                    status,
                };
            }

            let outcome = match self.executor.execute(step, &event).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let err = match e {
                        PromoError::StepExecution { .. } => e,
                        other => PromoError::StepExecution {
                            step_order: step.step_order,
                            reason: other.to_string(),
                        },
                    };
                    error!(
                        automation_id = %automation_id,
                        step_order = step.step_order,
                        action = %step.action_type(),
                        error = %err,
                        "自动化步骤执行失败"
                    );
                    StepOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };

            metrics::record_automation_step(step.action_type().as_str(), outcome.label());
            debug!(
                automation_id = %automation_id,
                step_order = step.step_order,
                outcome = outcome.label(),
                "步骤执行完成"
            );
            records.push(StepRecord {
                step_order: step.step_order,
                action_type: step.action_type(),
                outcome,
                executed_at: Utc::now(),
            });
        }

        info!(automation_id = %automation_id, name = %automation_name, "自动化执行完成");
        AutomationRun {
            automation_id,
            automation_name,
            trigger_type,
            steps: records,
            status: RunStatus::Completed,
        }
    }

    /// 将剩余步骤写入延迟步骤存储
    async fn suspend(
        &self,
        automation_id: &str,
        automation_name: &str,
        remaining: &[AutomationStep],
        event: &AutomationEvent,
        now: DateTime<Utc>,
    ) -> RunStatus {
        let delay_seconds = remaining.first().map(|s| s.delay_seconds).unwrap_or_default();
        let Some(due_at) = TimeDelta::try_seconds(delay_seconds)
            .and_then(|delay| now.checked_add_signed(delay))
        else {
            warn!(automation_id = %automation_id, delay_seconds, "延迟时间超出范围");
            return RunStatus::Aborted {
                error: format!("延迟时间超出范围: {delay_seconds}s"),
            };
        };

        let scheduled = ScheduledStep {
            id: Uuid::now_v7().to_string(),
            automation_id: automation_id.to_string(),
            automation_name: automation_name.to_string(),
            remaining_steps: remaining.to_vec(),
            event: event.clone(),
            due_at,
            status: ScheduledStepStatus::Pending,
            claimed_at: None,
            attempts: 0,
            last_error: None,
            created_at: now,
        };

        match self.step_store.schedule(&scheduled).await {
            Ok(()) => {
                info!(
                    automation_id = %automation_id,
                    scheduled_step_id = %scheduled.id,
                    step_order = remaining.first().map(|s| s.step_order).unwrap_or_default(),
                    due_at = %due_at,
                    "自动化在延迟步骤处挂起"
                );
                RunStatus::Suspended {
                    scheduled_step_id: scheduled.id,
                    due_at,
                }
            }
            Err(e) => {
                error!(automation_id = %automation_id, error = %e, "延迟步骤入队失败");
                RunStatus::Aborted {
                    error: e.to_string(),
                }
            }
        }
    }
}

impl<AR, CR, FR> AutomationTrigger for AutomationEngine<AR, CR, FR>
where
    AR: AutomationRepositoryTrait + 'static,
    CR: CustomerRepositoryTrait + 'static,
    FR: AffiliateRepositoryTrait + 'static,
{
    fn fire(
        &self,
        trigger_type: TriggerType,
        event: AutomationEvent,
    ) -> JoinHandle<Vec<AutomationRun>> {
        self.trigger(trigger_type, event)
    }
}

#[async_trait]
impl<AR, CR, FR> StepResumer for AutomationEngine<AR, CR, FR>
where
    AR: AutomationRepositoryTrait + 'static,
    CR: CustomerRepositoryTrait + 'static,
    FR: AffiliateRepositoryTrait + 'static,
{
    async fn resume(&self, step: &ScheduledStep, now: DateTime<Utc>) -> Result<AutomationRun> {
        if step.remaining_steps.is_empty() {
            return Err(PromoError::Internal(format!(
                "延迟步骤没有剩余步骤: {}",
                step.id
            )));
        }
        debug!(scheduled_step_id = %step.id, automation_id = %step.automation_id, "恢复自动化执行");
        Ok(self
            .inner
            .execute_steps(
                step.automation_id.clone(),
                step.automation_name.clone(),
                None,
                step.remaining_steps.clone(),
                step.event.clone(),
                now,
                true,
            )
            .await)
    }
}
