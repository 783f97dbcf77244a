//! Ordered execution of the action list with deadline checks between actions.

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::deadline::DeadlineBudget;
use crate::executor::ActionExecutor;
use crate::model::Action;
use crate::reporter::ResponseStatus;

/// Reason reported when every action finished.
pub const COMPLETED_REASON: &str = "All actions completed successfully.";

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every action ran to completion.
    Completed {
        /// Number of actions.
        total: usize,
    },
    /// The deadline expired before all actions started.
    PartialCompleted {
        /// Actions that finished before the deadline.
        completed: usize,
        /// Number of actions.
        total: usize,
    },
    /// An action failed fatally.
    Failed {
        /// Actions that finished before the failure.
        completed: usize,
        /// Number of actions.
        total: usize,
        /// Report reason of the failure.
        reason: String,
    },
}

impl PipelineOutcome {
    /// Status reported to the caller.
    #[must_use]
    pub const fn status(&self) -> ResponseStatus {
        match self {
            Self::Completed { .. } | Self::PartialCompleted { .. } => ResponseStatus::Success,
            Self::Failed { .. } => ResponseStatus::Failed,
        }
    }

    /// Reason text reported to the caller.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Completed { .. } => COMPLETED_REASON.to_string(),
            Self::PartialCompleted { completed, total } => format!(
                "Execution approaching timeout after completing {completed}/{total} actions."
            ),
            Self::Failed { reason, .. } => reason.clone(),
        }
    }

    /// Whether finalization steps should run.
    #[must_use]
    pub const fn allows_finalization(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Whether the run stopped early because of the deadline.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        matches!(self, Self::PartialCompleted { .. })
    }

    /// Response data for this outcome.
    #[must_use]
    pub fn response_data(&self, preview_mode_id: &str) -> BTreeMap<String, String> {
        let mut data = BTreeMap::from([("previewModeId".to_string(), preview_mode_id.to_string())]);
        if self.is_partial() {
            data.insert("partialExecution".to_string(), "true".to_string());
        }
        data
    }
}

/// Observable pipeline state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// Not started.
    Idle,
    /// Executing the action at this index.
    Running {
        /// Zero-based index of the current action.
        action_index: usize,
    },
    /// Finished with this outcome.
    Finished(PipelineOutcome),
}

/// Runs actions in order until they are exhausted, one fails, or the deadline passes.
pub struct DeploymentPipeline {
    executor: ActionExecutor,
    state: PipelineState,
}

impl DeploymentPipeline {
    /// Idle pipeline over `executor`.
    #[must_use]
    pub const fn new(executor: ActionExecutor) -> Self {
        Self {
            executor,
            state: PipelineState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Run `actions` against `budget`.
    ///
    /// The deadline is checked before each action; an action already in flight
    /// always runs to completion or failure.
    pub async fn run(&mut self, actions: &[Action], budget: &DeadlineBudget) -> PipelineOutcome {
        let total = actions.len();
        for (index, action) in actions.iter().enumerate() {
            if budget.expired() {
                warn!(
                    completed = index,
                    total, "deadline reached, stopping before next action"
                );
                return self.finish(PipelineOutcome::PartialCompleted {
                    completed: index,
                    total,
                });
            }
            self.state = PipelineState::Running {
                action_index: index,
            };
            info!(
                action = index + 1,
                total,
                kind = action.kind().as_str(),
                remaining_ms = budget.remaining().as_millis(),
                "starting action"
            );
            match self.executor.execute(action).await {
                Ok(report) => info!(action = index + 1, total, ?report, "action completed"),
                Err(err) => {
                    let reason = err.report_reason();
                    error!(action = index + 1, total, error = %reason, "action failed");
                    return self.finish(PipelineOutcome::Failed {
                        completed: index,
                        total,
                        reason,
                    });
                }
            }
        }
        info!(total, "all actions completed");
        self.finish(PipelineOutcome::Completed { total })
    }

    fn finish(&mut self, outcome: PipelineOutcome) -> PipelineOutcome {
        self.state = PipelineState::Finished(outcome.clone());
        outcome
    }
}
