//! 营销自动化
//!
//! - `dto`: 执行记录
//! - `handlers`: 步骤动作处理器
//! - `engine`: 自动化管理与触发执行
//! - `scheduler`: 延迟步骤存储与 Worker

pub mod dto;
pub mod engine;
pub mod handlers;
pub mod scheduler;

use tokio::task::JoinHandle;

use crate::models::{AutomationEvent, TriggerType};

pub use dto::{AutomationRun, RunStatus, StepOutcome, StepRecord};
pub use engine::AutomationEngine;
pub use handlers::StepExecutor;
pub use scheduler::{
    MemoryScheduledStepStore, PgScheduledStepStore, PollReport, ScheduledStepStore,
    ScheduledStepWorker, StepResumer,
};

/// 自动化触发入口
///
/// 业务服务只持有此接口。触发立即返回，调用方可以丢弃返回的句柄；
/// 等待句柄得到本批次各自动化的执行记录。
#[cfg_attr(test, mockall::automock)]
pub trait AutomationTrigger: Send + Sync {
    fn fire(&self, trigger_type: TriggerType, event: AutomationEvent)
    -> JoinHandle<Vec<AutomationRun>>;
}
