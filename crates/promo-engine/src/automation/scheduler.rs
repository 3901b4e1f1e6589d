//! 延迟步骤调度
//!
//! 带延迟的步骤不在触发任务中睡眠等待，而是将剩余步骤持久化为 `ScheduledStep`，
//! 由 `ScheduledStepWorker` 周期性认领到期记录并交回引擎恢复执行。
//!
//! 认领是原子的：同一条记录在多个 worker 并发轮询时只会被交付一次。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use promo_shared::observability::metrics;
use sqlx::PgPool;
use sqlx::types::Json;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::dto::{AutomationRun, RunStatus};
use crate::error::{PromoError, Result};
use crate::models::{AutomationEvent, AutomationStep, ScheduledStep, ScheduledStepStatus};

const WORKER_NAME: &str = "scheduled_step_worker";

/// 延迟步骤存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScheduledStepStore: Send + Sync {
    async fn schedule(&self, step: &ScheduledStep) -> Result<()>;

    /// 认领到期的待执行记录（按到期时间升序），并将其标记为执行中
    ///
    /// 认领租约已过期的执行中记录同样会被重新认领
    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledStep>>;

    async fn complete(&self, id: &str) -> Result<()>;

    async fn fail(&self, id: &str, error: &str) -> Result<()>;

    async fn pending_count(&self) -> Result<usize>;
}

// ==================== 内存实现 ====================

/// 默认认领租约
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(300);

fn lease_delta(lease: Duration) -> TimeDelta {
    TimeDelta::from_std(lease).unwrap_or(TimeDelta::MAX)
}

#[derive(Default)]
struct MemoryStepState {
    steps: HashMap<String, ScheduledStep>,
    /// 待执行记录的到期索引
    due: BTreeSet<(DateTime<Utc>, String)>,
    /// 执行中记录的租约到期索引
    leases: BTreeSet<(DateTime<Utc>, String)>,
}

/// 进程内延迟步骤存储
///
/// 进程重启后延迟步骤丢失，生产环境使用 `PgScheduledStepStore`。
pub struct MemoryScheduledStepStore {
    state: Mutex<MemoryStepState>,
    lease: TimeDelta,
}

impl Default for MemoryScheduledStepStore {
    fn default() -> Self {
        Self::with_lease(DEFAULT_CLAIM_LEASE)
    }
}

impl MemoryScheduledStepStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 认领后超过 `lease` 仍未完成的记录会被重新认领
    pub fn with_lease(lease: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryStepState::default()),
            lease: lease_delta(lease),
        }
    }

    pub fn get(&self, id: &str) -> Option<ScheduledStep> {
        self.state.lock().steps.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lease_expiry(&self, claimed_at: DateTime<Utc>) -> DateTime<Utc> {
        claimed_at
            .checked_add_signed(self.lease)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn set_status(&self, id: &str, status: ScheduledStepStatus, error: Option<&str>) -> Result<()> {
        let mut state = self.state.lock();
        let step = state
            .steps
            .get_mut(id)
            .ok_or_else(|| PromoError::Internal(format!("延迟步骤不存在: {id}")))?;
        let released = step.claimed_at.take();
        step.status = status;
        if let Some(error) = error {
            step.attempts += 1;
            step.last_error = Some(error.to_string());
        }
        if let Some(claimed_at) = released {
            let expiry = self.lease_expiry(claimed_at);
            state.leases.remove(&(expiry, id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduledStepStore for MemoryScheduledStepStore {
    async fn schedule(&self, step: &ScheduledStep) -> Result<()> {
        let mut state = self.state.lock();
        if state.steps.contains_key(&step.id) {
            return Err(PromoError::AlreadyExists {
                entity: "scheduled_step",
                field: "id",
                value: step.id.clone(),
            });
        }
        if step.status == ScheduledStepStatus::Pending {
            state.due.insert((step.due_at, step.id.clone()));
        }
        state.steps.insert(step.id.clone(), step.clone());
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledStep>> {
        let mut state = self.state.lock();

        // 租约过期的执行中记录优先，其认领者视为已失联
        let expired: Vec<(DateTime<Utc>, String)> = state
            .leases
            .iter()
            .take_while(|(expiry, _)| *expiry <= now)
            .take(limit)
            .cloned()
            .collect();
        let due: Vec<(DateTime<Utc>, String)> = state
            .due
            .iter()
            .take_while(|(due_at, _)| *due_at <= now)
            .take(limit - expired.len())
            .cloned()
            .collect();

        let mut claimed = Vec::with_capacity(expired.len() + due.len());
        for key in expired {
            state.leases.remove(&key);
            claimed.push(key.1);
        }
        for key in due {
            state.due.remove(&key);
            claimed.push(key.1);
        }

        let expiry = self.lease_expiry(now);
        let mut steps = Vec::with_capacity(claimed.len());
        for id in claimed {
            if let Some(step) = state.steps.get_mut(&id) {
                if step.status == ScheduledStepStatus::Running {
                    warn!(step_id = %id, "延迟步骤认领租约已过期，重新认领");
                }
                step.status = ScheduledStepStatus::Running;
                step.claimed_at = Some(now);
                steps.push(step.clone());
                state.leases.insert((expiry, id));
            }
        }
        Ok(steps)
    }

    async fn complete(&self, id: &str) -> Result<()> {
        self.set_status(id, ScheduledStepStatus::Done, None)
    }

    async fn fail(&self, id: &str, error: &str) -> Result<()> {
        self.set_status(id, ScheduledStepStatus::Failed, Some(error))
    }

    async fn pending_count(&self) -> Result<usize> {
        Ok(self.state.lock().due.len())
    }
}

// ==================== PostgreSQL 实现 ====================

#[derive(sqlx::FromRow)]
struct ScheduledStepRow {
    id: String,
    automation_id: String,
    automation_name: String,
    remaining_steps: Json<Vec<AutomationStep>>,
    event: Json<AutomationEvent>,
    due_at: DateTime<Utc>,
    status: ScheduledStepStatus,
    claimed_at: Option<DateTime<Utc>>,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ScheduledStepRow> for ScheduledStep {
    fn from(row: ScheduledStepRow) -> Self {
        Self {
            id: row.id,
            automation_id: row.automation_id,
            automation_name: row.automation_name,
            remaining_steps: row.remaining_steps.0,
            event: row.event.0,
            due_at: row.due_at,
            status: row.status,
            claimed_at: row.claimed_at,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
        }
    }
}

/// 基于 PostgreSQL 的延迟步骤存储
///
/// 使用 `FOR UPDATE SKIP LOCKED` 认领，多实例部署时各 worker 不会重复处理同一条记录。
/// 认领租约过期的 `running` 记录会被重新认领，进程在执行中退出不会丢失剩余步骤。
pub struct PgScheduledStepStore {
    pool: PgPool,
    lease: TimeDelta,
}

impl PgScheduledStepStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_lease(pool, DEFAULT_CLAIM_LEASE)
    }

    pub fn with_lease(pool: PgPool, lease: Duration) -> Self {
        Self {
            pool,
            lease: lease_delta(lease),
        }
    }

    /// 建表（幂等）
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS automation_scheduled_steps (
                id VARCHAR(64) PRIMARY KEY,
                automation_id VARCHAR(64) NOT NULL,
                automation_name VARCHAR(255) NOT NULL,
                remaining_steps JSONB NOT NULL,
                event JSONB NOT NULL,
                due_at TIMESTAMPTZ NOT NULL,
                status VARCHAR(16) NOT NULL DEFAULT 'pending',
                claimed_at TIMESTAMPTZ,
                attempts INT NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "ALTER TABLE automation_scheduled_steps ADD COLUMN IF NOT EXISTS claimed_at TIMESTAMPTZ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_automation_scheduled_steps_due
                ON automation_scheduled_steps (due_at)
                WHERE status = 'pending'
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_automation_scheduled_steps_claimed
                ON automation_scheduled_steps (claimed_at)
                WHERE status = 'running'
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("延迟步骤表已就绪");
        Ok(())
    }

    async fn set_status(&self, id: &str, status: ScheduledStepStatus, error: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE automation_scheduled_steps
            SET status = $2,
                claimed_at = NULL,
                attempts = attempts + CASE WHEN $3::TEXT IS NULL THEN 0 ELSE 1 END,
                last_error = COALESCE($3, last_error),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(step_id = %id, "延迟步骤不存在，状态未更新");
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduledStepStore for PgScheduledStepStore {
    async fn schedule(&self, step: &ScheduledStep) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_scheduled_steps
                (id, automation_id, automation_name, remaining_steps, event,
                 due_at, status, claimed_at, attempts, last_error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&step.id)
        .bind(&step.automation_id)
        .bind(&step.automation_name)
        .bind(Json(&step.remaining_steps))
        .bind(Json(&step.event))
        .bind(step.due_at)
        .bind(step.status.as_str())
        .bind(step.claimed_at)
        .bind(step.attempts)
        .bind(&step.last_error)
        .bind(step.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<ScheduledStep>> {
        let lease_cutoff = now
            .checked_sub_signed(self.lease)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, ScheduledStepRow>(
            r#"
            SELECT id, automation_id, automation_name, remaining_steps, event,
                   due_at, status, claimed_at, attempts, last_error, created_at
            FROM automation_scheduled_steps
            WHERE (status = 'pending' AND due_at <= $1)
               OR (status = 'running' AND claimed_at <= $3)
            ORDER BY due_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .bind(lease_cutoff)
        .fetch_all(&mut *tx)
        .await?;

        for row in rows.iter().filter(|r| r.status == ScheduledStepStatus::Running) {
            warn!(step_id = %row.id, "延迟步骤认领租约已过期，重新认领");
        }

        if rows.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        sqlx::query(
            r#"
            UPDATE automation_scheduled_steps
            SET status = 'running', claimed_at = $2, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut step = ScheduledStep::from(row);
                step.status = ScheduledStepStatus::Running;
                step.claimed_at = Some(now);
                step
            })
            .collect())
    }

    async fn complete(&self, id: &str) -> Result<()> {
        self.set_status(id, ScheduledStepStatus::Done, None).await
    }

    async fn fail(&self, id: &str, error: &str) -> Result<()> {
        self.set_status(id, ScheduledStepStatus::Failed, Some(error))
            .await
    }

    async fn pending_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM automation_scheduled_steps WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }
}

// ==================== Worker ====================

/// 恢复执行延迟步骤
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepResumer: Send + Sync {
    async fn resume(&self, step: &ScheduledStep, now: DateTime<Utc>) -> Result<AutomationRun>;
}

/// 单次轮询结果
#[derive(Debug, Default)]
pub struct PollReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub runs: Vec<AutomationRun>,
}

/// 延迟步骤 Worker
///
/// 定期认领到期的延迟步骤并交回引擎执行剩余步骤。
/// 剩余步骤中再次遇到延迟时会生成新的延迟记录，当前记录照常标记为完成。
pub struct ScheduledStepWorker {
    store: Arc<dyn ScheduledStepStore>,
    resumer: Arc<dyn StepResumer>,
    batch_size: usize,
    poll_interval: Duration,
}

impl ScheduledStepWorker {
    pub fn new(
        store: Arc<dyn ScheduledStepStore>,
        resumer: Arc<dyn StepResumer>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            resumer,
            batch_size: batch_size.max(1),
            poll_interval,
        }
    }

    /// 启动 Worker 主循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            batch_size = self.batch_size,
            "延迟步骤 Worker 已启动"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.poll_once(Utc::now()).await {
                Ok(report) if report.claimed > 0 => {
                    info!(
                        claimed = report.claimed,
                        completed = report.completed,
                        failed = report.failed,
                        "延迟步骤处理完成"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "认领延迟步骤失败"),
            }
            metrics::set_worker_last_run(WORKER_NAME);

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("延迟步骤 Worker 已停止");
    }

    /// 认领并执行一批到期记录
    ///
    /// 同批记录并发恢复；单条记录的失败只影响该条记录的状态。
    #[instrument(skip(self))]
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollReport> {
        let claimed = self.store.claim_due(now, self.batch_size).await?;
        if claimed.is_empty() {
            return Ok(PollReport::default());
        }
        metrics::record_scheduled_steps(claimed.len());
        debug!(count = claimed.len(), "认领到期延迟步骤");

        let results = join_all(claimed.iter().map(|step| self.process(step, now))).await;

        let mut report = PollReport {
            claimed: claimed.len(),
            ..Default::default()
        };
        for run in results {
            match run {
                Some(run) => {
                    report.completed += 1;
                    report.runs.push(run);
                }
                None => report.failed += 1,
            }
        }
        Ok(report)
    }

    async fn process(&self, step: &ScheduledStep, now: DateTime<Utc>) -> Option<AutomationRun> {
        let outcome = match self.resumer.resume(step, now).await {
            Ok(run) => match &run.status {
                RunStatus::Aborted { error } => Err(error.clone()),
                _ => Ok(run),
            },
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(run) => {
                if let Err(e) = self.store.complete(&step.id).await {
                    error!(step_id = %step.id, error = %e, "标记延迟步骤完成失败");
                }
                Some(run)
            }
            Err(reason) => {
                warn!(step_id = %step.id, error = %reason, "延迟步骤恢复失败");
                if let Err(e) = self.store.fail(&step.id, &reason).await {
                    error!(step_id = %step.id, error = %e, "标记延迟步骤失败状态失败");
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepAction;
    use chrono::Duration as ChronoDuration;

    fn scheduled(id: &str, due_at: DateTime<Utc>) -> ScheduledStep {
        ScheduledStep {
            id: id.into(),
            automation_id: "auto-1".into(),
            automation_name: "welcome".into(),
            remaining_steps: vec![AutomationStep {
                step_order: 2,
                delay_seconds: 60,
                action: StepAction::Wait,
            }],
            event: AutomationEvent::for_brand("brand-1"),
            due_at,
            status: ScheduledStepStatus::Pending,
            claimed_at: None,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    fn completed_run() -> AutomationRun {
        AutomationRun {
            automation_id: "auto-1".into(),
            automation_name: "welcome".into(),
            trigger_type: None,
            steps: vec![],
            status: RunStatus::Completed,
        }
    }

    #[tokio::test]
    async fn test_claim_due_only_returns_due_steps_in_order() {
        let store = MemoryScheduledStepStore::new();
        let now = Utc::now();
        store
            .schedule(&scheduled("late", now - ChronoDuration::seconds(10)))
            .await
            .unwrap();
        store
            .schedule(&scheduled("early", now - ChronoDuration::seconds(60)))
            .await
            .unwrap();
        store
            .schedule(&scheduled("future", now + ChronoDuration::seconds(60)))
            .await
            .unwrap();

        let claimed = store.claim_due(now, 10).await.unwrap();
        let ids: Vec<&str> = claimed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert!(claimed.iter().all(|s| s.status == ScheduledStepStatus::Running));
        assert_eq!(store.pending_count().await.unwrap(), 1);

        // 已认领的记录不会再次交付
        assert!(store.claim_due(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_due_respects_limit() {
        let store = MemoryScheduledStepStore::new();
        let now = Utc::now();
        for i in 0..5 {
            store
                .schedule(&scheduled(&format!("s{i}"), now - ChronoDuration::seconds(i)))
                .await
                .unwrap();
        }
        assert_eq!(store.claim_due(now, 2).await.unwrap().len(), 2);
        assert_eq!(store.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unfinished_claim_is_reclaimed_after_lease() {
        let store = MemoryScheduledStepStore::with_lease(Duration::from_secs(60));
        let now = Utc::now();
        store.schedule(&scheduled("s1", now)).await.unwrap();

        let first = store.claim_due(now, 10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].claimed_at, Some(now));

        // 认领者未完成也未失败，租约内不会再次交付
        let within = now + ChronoDuration::seconds(59);
        assert!(store.claim_due(within, 10).await.unwrap().is_empty());

        let after = now + ChronoDuration::seconds(60);
        let reclaimed = store.claim_due(after, 10).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, "s1");
        assert_eq!(reclaimed[0].claimed_at, Some(after));
        assert_eq!(store.get("s1").unwrap().status, ScheduledStepStatus::Running);

        // 新租约从重新认领时刻起算
        assert!(
            store
                .claim_due(after + ChronoDuration::seconds(30), 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_finished_steps_are_never_reclaimed() {
        let store = MemoryScheduledStepStore::with_lease(Duration::from_secs(60));
        let now = Utc::now();
        store.schedule(&scheduled("done", now)).await.unwrap();
        store.schedule(&scheduled("failed", now)).await.unwrap();
        store.claim_due(now, 10).await.unwrap();
        store.complete("done").await.unwrap();
        store.fail("failed", "boom").await.unwrap();

        let later = now + ChronoDuration::days(30);
        assert!(store.claim_due(later, 10).await.unwrap().is_empty());
        assert_eq!(store.get("done").unwrap().claimed_at, None);
        assert_eq!(store.get("failed").unwrap().status, ScheduledStepStatus::Failed);
    }

    #[tokio::test]
    async fn test_reclaimed_and_due_steps_share_limit() {
        let store = MemoryScheduledStepStore::with_lease(Duration::from_secs(60));
        let now = Utc::now();
        store.schedule(&scheduled("stale", now)).await.unwrap();
        store.claim_due(now, 10).await.unwrap();
        for i in 0..3 {
            store
                .schedule(&scheduled(&format!("new{i}"), now + ChronoDuration::seconds(i)))
                .await
                .unwrap();
        }

        let later = now + ChronoDuration::minutes(5);
        let ids: Vec<String> = store
            .claim_due(later, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["stale".to_string(), "new0".to_string()]);
        assert_eq!(store.pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_claims_deliver_once() {
        let store = Arc::new(MemoryScheduledStepStore::new());
        let now = Utc::now();
        for i in 0..20 {
            store
                .schedule(&scheduled(&format!("s{i}"), now))
                .await
                .unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.claim_due(now, 5).await.unwrap() })
            })
            .collect();

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for step in handle.await.unwrap() {
                assert!(seen.insert(step.id), "同一延迟步骤被重复认领");
            }
        }
        assert_eq!(seen.len(), 20);
    }

    #[tokio::test]
    async fn test_poll_once_completes_and_fails() {
        let store = Arc::new(MemoryScheduledStepStore::new());
        let now = Utc::now();
        store.schedule(&scheduled("ok", now)).await.unwrap();
        store.schedule(&scheduled("boom", now)).await.unwrap();

        let mut resumer = MockStepResumer::new();
        resumer.expect_resume().times(2).returning(|step, _| {
            if step.id == "ok" {
                Ok(completed_run())
            } else {
                Err(PromoError::Internal("resume failed".into()))
            }
        });

        let worker = ScheduledStepWorker::new(
            store.clone(),
            Arc::new(resumer),
            10,
            Duration::from_millis(10),
        );
        let report = worker.poll_once(now).await.unwrap();

        assert_eq!(report.claimed, 2);
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(store.get("ok").unwrap().status, ScheduledStepStatus::Done);
        let failed = store.get("boom").unwrap();
        assert_eq!(failed.status, ScheduledStepStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert!(failed.last_error.unwrap().contains("resume failed"));
    }

    #[tokio::test]
    async fn test_poll_once_with_nothing_due_skips_resumer() {
        let store = Arc::new(MemoryScheduledStepStore::new());
        let now = Utc::now();
        store
            .schedule(&scheduled("later", now + ChronoDuration::hours(1)))
            .await
            .unwrap();
        let mut resumer = MockStepResumer::new();
        resumer.expect_resume().never();

        let worker =
            ScheduledStepWorker::new(store, Arc::new(resumer), 10, Duration::from_millis(10));
        let report = worker.poll_once(now).await.unwrap();
        assert_eq!(report.claimed, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut store = MockScheduledStepStore::new();
        store.expect_claim_due().returning(|_, _| Ok(vec![]));
        let worker = ScheduledStepWorker::new(
            Arc::new(store),
            Arc::new(MockStepResumer::new()),
            10,
            Duration::from_millis(5),
        );

        let (tx, rx) = watch::channel(false);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(true).ok();
        });

        tokio::time::timeout(Duration::from_secs(2), worker.run(rx))
            .await
            .expect("worker 应在收到关闭信号后退出");
        stopper.await.unwrap();
    }
}
