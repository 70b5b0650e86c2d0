//! Status transition validation.
//!
//! Validation never fails with `Err` for business reasons: rejected
//! transitions come back as a [`TransitionCheck`] with `valid == false` and
//! every problem listed, so callers can render them all at once. `Err` is
//! reserved for storage failures while looking up sibling tasks.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TasksConfig;
use crate::error::Result;
use crate::store::TaskStore;
use crate::task::{Task, TaskStatus};

/// Caller-supplied switches for a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionMetadata {
    /// Move the assignee's currently focused task back to `in_progress`
    /// instead of rejecting the focus request.
    #[serde(default)]
    pub auto_unfocus: bool,
}

/// Side effect to attempt after a transition has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequiredAction {
    /// Move another focused task of the same assignee back to `in_progress`.
    UnfocusTask { task_id: String },
    /// Record the task as focused in the context cache.
    TrackFocus { task_id: String },
    /// Drop the task from the context cache's focused list.
    ReleaseFocus { task_id: String },
    /// Schedule a review of a blocked task.
    ScheduleBlockerReview {
        task_id: String,
        review_at: DateTime<Utc>,
        reason: String,
    },
    /// Remove a pending blocker review once the task is unblocked.
    ClearBlockerReview { task_id: String },
}

impl RequiredAction {
    pub fn describe(&self) -> String {
        match self {
            RequiredAction::UnfocusTask { task_id } => format!("unfocus {task_id}"),
            RequiredAction::TrackFocus { task_id } => format!("track focus on {task_id}"),
            RequiredAction::ReleaseFocus { task_id } => format!("release focus on {task_id}"),
            RequiredAction::ScheduleBlockerReview {
                task_id, review_at, ..
            } => format!("review blocker on {task_id} at {}", review_at.to_rfc3339()),
            RequiredAction::ClearBlockerReview { task_id } => {
                format!("clear blocker review for {task_id}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransitionValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    /// Advisory findings that do not block the transition
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Result of validating a requested transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionCheck {
    pub validation: TransitionValidation,
    pub required_actions: Vec<RequiredAction>,
}

impl TransitionCheck {
    fn rejected(errors: Vec<String>) -> Self {
        Self {
            validation: TransitionValidation {
                valid: false,
                errors,
                warnings: Vec::new(),
            },
            required_actions: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validation.valid
    }
}

/// One executed transition, as returned by the executor and appended to the
/// audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub id: String,
    pub task_id: String,
    pub from_status: TaskStatus,
    pub to_status: TaskStatus,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_actions: Vec<RequiredAction>,
}

impl TransitionRecord {
    pub fn new(
        task_id: impl Into<String>,
        from_status: TaskStatus,
        to_status: TaskStatus,
        actor: impl Into<String>,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
        required_actions: Vec<RequiredAction>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            from_status,
            to_status,
            actor: actor.into(),
            reason,
            timestamp,
            required_actions,
        }
    }
}

/// Checks the status graph and the business rules attached to each target
/// status.
#[derive(Debug, Clone)]
pub struct TransitionValidator {
    fragmentation_limit: usize,
    blocker_review_delay: Duration,
}

impl TransitionValidator {
    pub fn new(fragmentation_limit: usize, blocker_review_delay: Duration) -> Self {
        Self {
            fragmentation_limit,
            blocker_review_delay,
        }
    }

    pub fn from_config(config: &TasksConfig) -> Result<Self> {
        Ok(Self::new(
            config.fragmentation_limit,
            config.blocker_review_delay()?,
        ))
    }

    pub fn validate(
        &self,
        store: &TaskStore,
        task: &Task,
        target: TaskStatus,
        actor: &str,
        reason: Option<&str>,
        metadata: TransitionMetadata,
    ) -> Result<TransitionCheck> {
        if task.archived_at.is_some() {
            return Ok(TransitionCheck::rejected(vec![format!(
                "task {} is archived and cannot change state",
                task.id
            )]));
        }
        if !task.status.can_transition_to(target) {
            return Ok(TransitionCheck::rejected(vec![format!(
                "invalid transition {} → {}",
                task.status, target
            )]));
        }

        let owner = task.assignee.as_deref().unwrap_or(actor);
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut actions = Vec::new();

        match target {
            TaskStatus::Focused => {
                let focused = store.tasks_for_assignee(owner, TaskStatus::Focused, &task.id)?;
                if metadata.auto_unfocus {
                    actions.extend(focused.into_iter().map(|other| RequiredAction::UnfocusTask {
                        task_id: other.id,
                    }));
                } else if let Some(other) = focused.first() {
                    errors.push(format!(
                        "focus conflict: {owner} is already focused on {} ({}); \
                         unfocus it first or pass auto-unfocus",
                        other.id, other.title
                    ));
                }
                actions.push(RequiredAction::TrackFocus {
                    task_id: task.id.clone(),
                });
            }
            TaskStatus::Blocked => match reason.map(str::trim).filter(|r| !r.is_empty()) {
                Some(reason) => match Utc::now().checked_add_signed(self.blocker_review_delay) {
                    Some(review_at) => actions.push(RequiredAction::ScheduleBlockerReview {
                        task_id: task.id.clone(),
                        review_at,
                        reason: reason.to_string(),
                    }),
                    None => errors.push(format!(
                        "blocker review delay out of range: {}",
                        self.blocker_review_delay
                    )),
                },
                None => errors.push("blocked tasks require a non-empty reason".to_string()),
            },
            TaskStatus::Done => {
                for criterion in task.unmet_criteria() {
                    errors.push(format!(
                        "acceptance criterion not met: {}",
                        criterion.description
                    ));
                }
                for dependency in &task.dependencies {
                    match store.get_task(dependency)? {
                        Some(dep) if dep.is_completed() => {}
                        Some(dep) => errors.push(format!(
                            "unmet dependency: {} is {}",
                            dep.id, dep.status
                        )),
                        None => errors.push(format!("unmet dependency: {dependency} not found")),
                    }
                }
            }
            TaskStatus::InProgress => {
                let active = store.tasks_for_assignee(owner, TaskStatus::InProgress, &task.id)?;
                if active.len() > self.fragmentation_limit {
                    warnings.push(format!(
                        "{owner} already has {} other tasks in progress (limit {})",
                        active.len(),
                        self.fragmentation_limit
                    ));
                }
            }
            TaskStatus::Todo | TaskStatus::Cancelled | TaskStatus::Archived => {}
        }

        if task.status == TaskStatus::Focused {
            actions.push(RequiredAction::ReleaseFocus {
                task_id: task.id.clone(),
            });
        }
        if task.status == TaskStatus::Blocked {
            actions.push(RequiredAction::ClearBlockerReview {
                task_id: task.id.clone(),
            });
        }

        if !errors.is_empty() {
            return Ok(TransitionCheck {
                validation: TransitionValidation {
                    valid: false,
                    errors,
                    warnings,
                },
                required_actions: Vec::new(),
            });
        }

        Ok(TransitionCheck {
            validation: TransitionValidation {
                valid: true,
                errors,
                warnings,
            },
            required_actions: actions,
        })
    }
}
