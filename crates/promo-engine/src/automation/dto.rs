//! 自动化执行记录
//!
//! 每个步骤的结果都显式记录，而不是依赖异常吞没来控制流程。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ActionType, TriggerType};

/// 单步执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Skipped { reason: String },
    Failed { error: String },
}

impl StepOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// 指标标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// 单步执行记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step_order: i32,
    pub action_type: ActionType,
    pub outcome: StepOutcome,
    pub executed_at: DateTime<Utc>,
}

/// 一次执行的最终状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// 所有步骤都已执行
    Completed,
    /// 在延迟步骤处挂起，剩余步骤已写入延迟步骤存储
    Suspended {
        scheduled_step_id: String,
        due_at: DateTime<Utc>,
    },
    /// 剩余步骤未能入队
    Aborted { error: String },
}

/// 单个自动化的执行日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRun {
    pub automation_id: String,
    pub automation_name: String,
    /// 恢复执行时为空
    #[serde(default)]
    pub trigger_type: Option<TriggerType>,
    pub steps: Vec<StepRecord>,
    pub status: RunStatus,
}

impl AutomationRun {
    pub fn is_suspended(&self) -> bool {
        matches!(self.status, RunStatus::Suspended { .. })
    }

    pub fn outcome_of(&self, step_order: i32) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.step_order == step_order)
            .map(|s| &s.outcome)
    }

    pub fn count(&self, label: &str) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome.label() == label)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_helpers() {
        let run = AutomationRun {
            automation_id: "auto-1".into(),
            automation_name: "Welcome".into(),
            trigger_type: Some(TriggerType::CustomerCreated),
            steps: vec![
                StepRecord {
                    step_order: 1,
                    action_type: ActionType::SendEmail,
                    outcome: StepOutcome::Succeeded,
                    executed_at: Utc::now(),
                },
                StepRecord {
                    step_order: 2,
                    action_type: ActionType::CreateAffiliate,
                    outcome: StepOutcome::Failed {
                        error: "customer missing".into(),
                    },
                    executed_at: Utc::now(),
                },
            ],
            status: RunStatus::Completed,
        };

        assert!(!run.is_suspended());
        assert_eq!(run.outcome_of(1), Some(&StepOutcome::Succeeded));
        assert_eq!(run.count("failed"), 1);
        assert!(run.outcome_of(9).is_none());
    }
}
