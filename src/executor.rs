//! Transition execution.
//!
//! [`TransitionExecutor::change_task_state`] is the single entry point for
//! status changes, whether the caller is the CLI, a hook, or the importer.
//! It validates, persists, then hands the required actions to an
//! [`ActionRunner`]. Action failures never undo the persisted transition.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::{BlockerReview, ContextCache};
use crate::error::{Error, Result};
use crate::store::TaskStore;
use crate::task::{Task, TaskStatus};
use crate::transition::{
    RequiredAction, TransitionMetadata, TransitionRecord, TransitionValidation, TransitionValidator,
};

/// Performs the side effects attached to a transition.
pub trait ActionRunner {
    fn run(&mut self, store: &TaskStore, action: &RequiredAction) -> Result<()>;
}

/// Default runner: keeps the context cache in step with task state.
pub struct ContextActionRunner {
    cache: ContextCache,
}

impl ContextActionRunner {
    pub fn new(cache: ContextCache) -> Self {
        Self { cache }
    }

    pub fn cache_mut(&mut self) -> &mut ContextCache {
        &mut self.cache
    }
}

impl ActionRunner for ContextActionRunner {
    fn run(&mut self, store: &TaskStore, action: &RequiredAction) -> Result<()> {
        match action {
            RequiredAction::UnfocusTask { task_id } => {
                let mut task = store
                    .get_task(task_id)?
                    .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;
                if task.status == TaskStatus::Focused {
                    task.status = TaskStatus::InProgress;
                    task.touch();
                    store.persist_transition(&task)?;
                    info!(task_id = %task.id, "unfocused sibling task");
                }
                self.cache.unfocus_task(task_id)
            }
            RequiredAction::TrackFocus { task_id } => self.cache.focus_task(task_id),
            RequiredAction::ReleaseFocus { task_id } => self.cache.unfocus_task(task_id),
            RequiredAction::ScheduleBlockerReview {
                task_id,
                review_at,
                reason,
            } => self.cache.schedule_blocker_review(BlockerReview {
                task_id: task_id.clone(),
                review_at: *review_at,
                reason: reason.clone(),
            }),
            RequiredAction::ClearBlockerReview { task_id } => {
                self.cache.clear_blocker_review(task_id)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFailure {
    pub action: RequiredAction,
    pub error: String,
}

/// What [`TransitionExecutor::execute_state_transition`] did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub task: Task,
    pub record: TransitionRecord,
    pub action_failures: Vec<ActionFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub success: bool,
    pub validation: TransitionValidation,
    pub required_actions: Vec<RequiredAction>,
    /// The task after the transition, or unchanged when rejected
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<TransitionRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub action_failures: Vec<ActionFailure>,
}

pub struct TransitionExecutor<'a, R> {
    store: &'a TaskStore,
    validator: TransitionValidator,
    runner: R,
}

impl<'a, R: ActionRunner> TransitionExecutor<'a, R> {
    pub fn new(store: &'a TaskStore, validator: TransitionValidator, runner: R) -> Self {
        Self {
            store,
            validator,
            runner,
        }
    }

    pub fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    /// Validate and, if allowed, apply a status change.
    ///
    /// A rejected transition is `Ok` with `success == false` and the task
    /// untouched. Unknown ids are [`Error::TaskNotFound`].
    pub fn change_task_state(
        &mut self,
        task_id: &str,
        to: TaskStatus,
        actor: &str,
        reason: Option<&str>,
        metadata: TransitionMetadata,
    ) -> Result<TransitionOutcome> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        let check = self
            .validator
            .validate(self.store, &task, to, actor, reason, metadata)?;
        if !check.is_valid() {
            debug!(
                task_id = %task.id,
                from = %task.status,
                to = %to,
                errors = check.validation.errors.len(),
                "transition rejected"
            );
            return Ok(TransitionOutcome {
                success: false,
                validation: check.validation,
                required_actions: check.required_actions,
                task,
                record: None,
                action_failures: Vec::new(),
            });
        }

        let required_actions = check.required_actions.clone();
        let report = self.execute_state_transition(task, to, actor, reason, check.required_actions)?;
        Ok(TransitionOutcome {
            success: true,
            validation: check.validation,
            required_actions,
            task: report.task,
            record: Some(report.record),
            action_failures: report.action_failures,
        })
    }

    /// Apply an already validated transition: update timestamps, persist,
    /// then run `actions` in order.
    pub fn execute_state_transition(
        &mut self,
        mut task: Task,
        to: TaskStatus,
        actor: &str,
        reason: Option<&str>,
        actions: Vec<RequiredAction>,
    ) -> Result<ExecutionReport> {
        let from = task.status;
        task.status = to;
        let now = task.touch();
        match to {
            TaskStatus::Done => task.completed_at = Some(now),
            TaskStatus::Archived if task.archived_at.is_none() => task.archived_at = Some(now),
            TaskStatus::Focused | TaskStatus::InProgress if task.assignee.is_none() => {
                task.assignee = Some(actor.to_string());
            }
            _ => {}
        }
        self.store.persist_transition(&task)?;
        info!(task_id = %task.id, from = %from, to = %to, actor, "task state changed");

        let record = TransitionRecord::new(
            task.id.clone(),
            from,
            to,
            actor,
            reason
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .map(str::to_string),
            now,
            actions.clone(),
        );

        let mut action_failures = Vec::new();
        for action in actions {
            if let Err(err) = self.runner.run(self.store, &action) {
                warn!(
                    task_id = %task.id,
                    action = %action.describe(),
                    error = %err,
                    "required action failed"
                );
                action_failures.push(ActionFailure {
                    action,
                    error: err.to_string(),
                });
            }
        }

        Ok(ExecutionReport {
            task,
            record,
            action_failures,
        })
    }
}
