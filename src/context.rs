//! Context/session cache.
//!
//! Holds ambient defaults (active sprint, recently used labels, focused
//! tasks, pending blocker reviews) in `.crit/context.json` together with the
//! time each field was last written. Fields older than their TTL fall back
//! to defaults on the next read. A missing or corrupt file is treated as an
//! empty context; the cache never fails a caller because of it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{parse_duration, ContextConfig};
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::task::NewTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    ActiveSprint,
    RecentLabels,
    FocusedTasks,
    BlockerReviews,
}

impl ContextField {
    pub const ALL: [ContextField; 4] = [
        ContextField::ActiveSprint,
        ContextField::RecentLabels,
        ContextField::FocusedTasks,
        ContextField::BlockerReviews,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ContextField::ActiveSprint => "active_sprint",
            ContextField::RecentLabels => "recent_labels",
            ContextField::FocusedTasks => "focused_tasks",
            ContextField::BlockerReviews => "blocker_reviews",
        }
    }
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextField {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        ContextField::ALL
            .into_iter()
            .find(|field| field.as_str() == normalized)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unknown context field '{}' (expected active_sprint, recent_labels, focused_tasks, blocker_reviews)",
                    value.trim()
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockerReview {
    pub task_id: String,
    pub review_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Context {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_sprint: Option<String>,
    /// Most recent first
    pub recent_labels: Vec<String>,
    pub focused_tasks: Vec<String>,
    pub blocker_reviews: Vec<BlockerReview>,
}

impl Context {
    fn reset(&mut self, field: ContextField) {
        match field {
            ContextField::ActiveSprint => self.active_sprint = None,
            ContextField::RecentLabels => self.recent_labels.clear(),
            ContextField::FocusedTasks => self.focused_tasks.clear(),
            ContextField::BlockerReviews => self.blocker_reviews.clear(),
        }
    }

    /// Reviews whose date has passed.
    pub fn due_reviews(&self, now: DateTime<Utc>) -> Vec<&BlockerReview> {
        self.blocker_reviews
            .iter()
            .filter(|review| review.review_at <= now)
            .collect()
    }
}

/// Partial context update. `Some(None)` clears the active sprint.
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    pub active_sprint: Option<Option<String>>,
    pub recent_labels: Option<Vec<String>>,
    pub focused_tasks: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CacheStamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    active_sprint: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recent_labels: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    focused_tasks: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocker_reviews: Option<DateTime<Utc>>,
}

impl CacheStamps {
    fn get(&self, field: ContextField) -> Option<DateTime<Utc>> {
        match field {
            ContextField::ActiveSprint => self.active_sprint,
            ContextField::RecentLabels => self.recent_labels,
            ContextField::FocusedTasks => self.focused_tasks,
            ContextField::BlockerReviews => self.blocker_reviews,
        }
    }

    fn set(&mut self, field: ContextField, value: Option<DateTime<Utc>>) {
        match field {
            ContextField::ActiveSprint => self.active_sprint = value,
            ContextField::RecentLabels => self.recent_labels = value,
            ContextField::FocusedTasks => self.focused_tasks = value,
            ContextField::BlockerReviews => self.blocker_reviews = value,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ContextFile {
    #[serde(flatten)]
    context: Context,
    cached_at: CacheStamps,
}

#[derive(Debug, Clone)]
struct ContextTtls {
    active_sprint: Duration,
    recent_labels: Duration,
    focused_tasks: Duration,
}

impl ContextTtls {
    /// Blocker reviews are a schedule rather than a cached value; they have
    /// no TTL.
    fn get(&self, field: ContextField) -> Option<Duration> {
        match field {
            ContextField::ActiveSprint => Some(self.active_sprint),
            ContextField::RecentLabels => Some(self.recent_labels),
            ContextField::FocusedTasks => Some(self.focused_tasks),
            ContextField::BlockerReviews => None,
        }
    }

    fn is_expired(&self, file: &ContextFile, field: ContextField, now: DateTime<Utc>) -> bool {
        match (self.get(field), file.cached_at.get(field)) {
            (Some(ttl), Some(stamp)) => now - stamp >= ttl,
            _ => false,
        }
    }

    fn any_expired(&self, file: &ContextFile, now: DateTime<Utc>) -> bool {
        ContextField::ALL
            .into_iter()
            .any(|field| self.is_expired(file, field, now))
    }

    /// Reset expired fields to defaults. Returns whether anything changed.
    fn expire(&self, file: &mut ContextFile, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for field in ContextField::ALL {
            if self.is_expired(file, field, now) {
                debug!(field = %field, "context field expired");
                file.context.reset(field);
                file.cached_at.set(field, None);
                changed = true;
            }
        }
        changed
    }
}

pub struct ContextCache {
    storage: Storage,
    ttls: ContextTtls,
    max_recent_labels: usize,
    snapshot: Option<ContextFile>,
}

impl ContextCache {
    pub fn new(storage: Storage, config: &ContextConfig) -> Result<Self> {
        Ok(Self {
            storage,
            ttls: ContextTtls {
                active_sprint: parse_duration(&config.active_sprint_ttl)?,
                recent_labels: parse_duration(&config.recent_labels_ttl)?,
                focused_tasks: parse_duration(&config.focused_tasks_ttl)?,
            },
            max_recent_labels: config.max_recent_labels,
            snapshot: None,
        })
    }

    /// Current context: the in-memory snapshot while every field is fresh,
    /// otherwise re-read from disk with expired fields reset.
    pub fn current_context(&mut self) -> Result<Context> {
        Ok(self.load()?.context.clone())
    }

    pub fn update_context(&mut self, patch: ContextPatch) -> Result<Context> {
        let mut touched = Vec::new();
        let file = self.load()?;
        if let Some(sprint) = patch.active_sprint {
            file.context.active_sprint = sprint
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
            touched.push(ContextField::ActiveSprint);
        }
        if let Some(labels) = patch.recent_labels {
            file.context.recent_labels = labels;
            touched.push(ContextField::RecentLabels);
        }
        if let Some(focused) = patch.focused_tasks {
            file.context.focused_tasks = focused;
            touched.push(ContextField::FocusedTasks);
        }
        let now = Utc::now();
        for field in touched {
            file.cached_at.set(field, Some(now));
        }
        let context = file.context.clone();
        self.persist()?;
        Ok(context)
    }

    /// Remember a label as most recently used.
    pub fn add_recent_label(&mut self, label: &str) -> Result<()> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::InvalidArgument("label cannot be empty".to_string()));
        }
        let max = self.max_recent_labels;
        self.mutate(ContextField::RecentLabels, |context| {
            context.recent_labels.retain(|existing| existing != label);
            context.recent_labels.insert(0, label.to_string());
            context.recent_labels.truncate(max);
        })
    }

    pub fn focus_task(&mut self, task_id: &str) -> Result<()> {
        self.mutate(ContextField::FocusedTasks, |context| {
            if !context.focused_tasks.iter().any(|id| id == task_id) {
                context.focused_tasks.insert(0, task_id.to_string());
            }
        })
    }

    pub fn unfocus_task(&mut self, task_id: &str) -> Result<()> {
        self.mutate(ContextField::FocusedTasks, |context| {
            context.focused_tasks.retain(|id| id != task_id);
        })
    }

    pub fn schedule_blocker_review(&mut self, review: BlockerReview) -> Result<()> {
        self.mutate(ContextField::BlockerReviews, |context| {
            context
                .blocker_reviews
                .retain(|existing| existing.task_id != review.task_id);
            context.blocker_reviews.push(review);
        })
    }

    pub fn clear_blocker_review(&mut self, task_id: &str) -> Result<()> {
        self.mutate(ContextField::BlockerReviews, |context| {
            context
                .blocker_reviews
                .retain(|review| review.task_id != task_id);
        })
    }

    /// Drop a cached field back to its default.
    pub fn invalidate_cache(&mut self, field: ContextField) -> Result<()> {
        let file = self.load()?;
        file.context.reset(field);
        file.cached_at.set(field, None);
        self.persist()
    }

    /// Fill omitted fields of a new task from the context.
    pub fn apply_defaults(&mut self, input: &mut NewTask) -> Result<()> {
        if input.sprint.is_none() {
            input.sprint = self.current_context()?.active_sprint;
        }
        Ok(())
    }

    fn mutate<F>(&mut self, field: ContextField, f: F) -> Result<()>
    where
        F: FnOnce(&mut Context),
    {
        let file = self.load()?;
        f(&mut file.context);
        file.cached_at.set(field, Some(Utc::now()));
        self.persist()
    }

    fn load(&mut self) -> Result<&mut ContextFile> {
        let now = Utc::now();
        let fresh = self
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| !self.ttls.any_expired(snapshot, now));
        if !fresh {
            let mut file = self.read_file();
            if self.ttls.expire(&mut file, now) {
                self.storage.write_json(&self.storage.context_file(), &file)?;
            }
            self.snapshot = Some(file);
        }
        Ok(self.snapshot.get_or_insert_with(ContextFile::default))
    }

    fn persist(&self) -> Result<()> {
        match self.snapshot.as_ref() {
            Some(file) => self.storage.write_json(&self.storage.context_file(), file),
            None => Ok(()),
        }
    }

    fn read_file(&self) -> ContextFile {
        let path = self.storage.context_file();
        match self.storage.read_json_opt::<ContextFile>(&path) {
            Ok(Some(file)) => file,
            Ok(None) => ContextFile::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "context file unreadable; reinitializing");
                ContextFile::default()
            }
        }
    }
}
