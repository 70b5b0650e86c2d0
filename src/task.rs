//! Task data model.
//!
//! Tasks are persisted one JSON object per file using camelCase keys;
//! optional fields are omitted when absent. Status strings coming from the
//! outside world are normalized once through [`TaskStatus::from_str`]; the
//! rest of the crate only deals with the enum.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Canonical task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Focused,
    Blocked,
    Done,
    Cancelled,
    Archived,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Focused,
        TaskStatus::Blocked,
        TaskStatus::Done,
        TaskStatus::Cancelled,
        TaskStatus::Archived,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Focused => "focused",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Archived => "archived",
        }
    }

    /// Outgoing edges of the status graph.
    pub const fn allowed_transitions(self) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match self {
            Todo => &[InProgress, Blocked, Cancelled],
            InProgress => &[Focused, Blocked, Done, Todo, Cancelled],
            Focused => &[InProgress, Blocked, Done, Cancelled],
            Blocked => &[Todo, InProgress, Cancelled],
            Done => &[Archived],
            Cancelled => &[Archived],
            Archived => &[],
        }
    }

    pub fn can_transition_to(self, target: TaskStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let status = match normalized.as_str() {
            "todo" | "to_do" | "open" | "pending" | "backlog" => TaskStatus::Todo,
            "in_progress" | "inprogress" | "doing" | "wip" | "started" => TaskStatus::InProgress,
            "focused" | "focus" => TaskStatus::Focused,
            "blocked" => TaskStatus::Blocked,
            "done" | "complete" | "completed" | "closed" => TaskStatus::Done,
            "cancelled" | "canceled" => TaskStatus::Cancelled,
            "archived" => TaskStatus::Archived,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "unknown status '{}' (expected one of: {})",
                    value.trim(),
                    TaskStatus::ALL
                        .iter()
                        .map(|status| status.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )))
            }
        };
        Ok(status)
    }
}

/// Task priority, most urgent first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" | "p0" => Ok(Priority::Critical),
            "high" | "p1" => Ok(Priority::High),
            "medium" | "p2" => Ok(Priority::Medium),
            "low" | "p3" => Ok(Priority::Low),
            other => Err(Error::InvalidArgument(format!(
                "unknown priority '{other}' (expected critical, high, medium or low)"
            ))),
        }
    }
}

/// A single acceptance criterion; `done` must be true before the task can
/// be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub description: String,
    #[serde(default)]
    pub done: bool,
}

impl AcceptanceCriterion {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            done: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub draft: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some() || self.status == TaskStatus::Archived
    }

    /// Status as seen by listings and stats: any archived task reports
    /// `archived`, whatever status it was archived from.
    pub fn effective_status(&self) -> TaskStatus {
        if self.is_archived() {
            TaskStatus::Archived
        } else {
            self.status
        }
    }

    /// Case-insensitive substring match over title, description, labels and
    /// assignee. `needle` must already be lowercase.
    fn mentions(&self, needle: &str) -> bool {
        let contains = |text: &str| text.to_lowercase().contains(needle);
        contains(&self.title)
            || self.description.as_deref().is_some_and(contains)
            || self.labels.iter().any(|label| contains(label))
            || self.assignee.as_deref().is_some_and(contains)
    }

    /// A dependency counts as satisfied once it reached `done`, including
    /// when it was archived afterwards.
    pub fn is_completed(&self) -> bool {
        match self.status {
            TaskStatus::Done => true,
            TaskStatus::Archived => self.completed_at.is_some(),
            _ => false,
        }
    }

    pub fn unmet_criteria(&self) -> impl Iterator<Item = &AcceptanceCriterion> {
        self.acceptance_criteria.iter().filter(|c| !c.done)
    }

    /// Refresh `updated_at`, guaranteeing it moves strictly forward even when
    /// two writes land within the clock's resolution.
    pub fn touch(&mut self) -> DateTime<Utc> {
        let now = next_timestamp(self.updated_at);
        self.updated_at = now;
        now
    }
}

/// `Utc::now()`, bumped past `previous` when the clock has not advanced.
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Input for creating a task. Omitted fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Initial status; only `todo` is accepted; other statuses are reached
    /// through transitions.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub story_points: Option<u32>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub sprint: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub draft: bool,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update for non-status fields.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears an optional
/// field. Status is not patchable; it only moves through the transition
/// executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub assignee: Option<Option<String>>,
    pub labels: Option<Vec<String>>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
    pub story_points: Option<Option<u32>>,
    pub estimated_hours: Option<Option<f64>>,
    pub sprint: Option<Option<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub acceptance_criteria: Option<Vec<AcceptanceCriterion>>,
    pub add_criteria: Vec<String>,
    /// Zero-based indices of criteria to mark satisfied
    pub complete_criteria: Vec<usize>,
    pub parent_id: Option<Option<String>>,
    pub dependencies: Option<Vec<String>>,
    pub draft: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }
}

/// Listing filter. Archived tasks and drafts are hidden unless requested.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    /// Every label listed must be present on the task
    pub labels: Vec<String>,
    pub sprint: Option<String>,
    pub parent_id: Option<String>,
    /// Free-text search
    pub query: Option<String>,
    pub include_archived: bool,
    pub include_drafts: bool,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        let wants_archived = self.include_archived || self.status == Some(TaskStatus::Archived);
        if task.is_archived() && !wants_archived {
            return false;
        }
        if task.draft && !self.include_drafts {
            return false;
        }
        if self
            .status
            .is_some_and(|status| task.effective_status() != status)
        {
            return false;
        }
        if self.priority.is_some_and(|priority| task.priority != priority) {
            return false;
        }
        if let Some(assignee) = self.assignee.as_deref() {
            if task.assignee.as_deref() != Some(assignee) {
                return false;
            }
        }
        if !self.labels.iter().all(|label| task.labels.contains(label)) {
            return false;
        }
        if let Some(sprint) = self.sprint.as_deref() {
            if task.sprint.as_deref() != Some(sprint) {
                return false;
            }
        }
        if let Some(parent) = self.parent_id.as_deref() {
            if task.parent_id.as_deref() != Some(parent) {
                return false;
            }
        }
        if let Some(query) = self.query.as_deref().map(str::trim) {
            if !query.is_empty() && !task.mentions(&query.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    Priority,
    Created,
    Updated,
    Title,
    Status,
    Due,
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "priority" => Ok(SortField::Priority),
            "created" | "created_at" => Ok(SortField::Created),
            "updated" | "updated_at" => Ok(SortField::Updated),
            "title" => Ok(SortField::Title),
            "status" => Ok(SortField::Status),
            "due" | "due_date" => Ok(SortField::Due),
            other => Err(Error::InvalidArgument(format!(
                "unknown sort field '{other}' (expected priority, created, updated, title, status, due)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl TaskSort {
    pub fn compare(&self, left: &Task, right: &Task) -> Ordering {
        let primary = match self.field {
            SortField::Priority => left.priority.cmp(&right.priority),
            SortField::Created => left.created_at.cmp(&right.created_at),
            SortField::Updated => left.updated_at.cmp(&right.updated_at),
            SortField::Title => left.title.to_lowercase().cmp(&right.title.to_lowercase()),
            SortField::Status => left.status.cmp(&right.status),
            // Tasks without a due date sort last.
            SortField::Due => match (left.due_date, right.due_date) {
                (Some(l), Some(r)) => l.cmp(&r),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        let primary = match self.direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        primary
            .then_with(|| left.created_at.cmp(&right.created_at))
            .then_with(|| left.id.cmp(&right.id))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pagination {
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: TaskStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriorityCount {
    pub priority: Priority,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub active: usize,
    pub archived: usize,
    pub drafts: usize,
    pub by_status: Vec<StatusCount>,
    pub by_priority: Vec<PriorityCount>,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let by_status = TaskStatus::ALL
            .iter()
            .map(|status| StatusCount {
                status: *status,
                count: tasks
                    .iter()
                    .filter(|task| task.effective_status() == *status)
                    .count(),
            })
            .collect();
        let by_priority = Priority::ALL
            .iter()
            .map(|priority| PriorityCount {
                priority: *priority,
                count: tasks.iter().filter(|task| task.priority == *priority).count(),
            })
            .collect();
        let archived = tasks.iter().filter(|task| task.is_archived()).count();
        TaskStats {
            total: tasks.len(),
            active: tasks.len() - archived,
            archived,
            drafts: tasks.iter().filter(|task| task.draft).count(),
            by_status,
            by_priority,
        }
    }

    pub fn status_count(&self, status: TaskStatus) -> usize {
        self.by_status
            .iter()
            .find(|entry| entry.status == status)
            .map(|entry| entry.count)
            .unwrap_or(0)
    }
}
