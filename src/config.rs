//! Configuration loading and management
//!
//! Handles parsing of `.crit.toml` configuration files. Every section rejects
//! unknown keys so typos surface at load time instead of silently falling
//! back to defaults.

use std::path::Path;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Name of the configuration file at the project root
pub const CONFIG_FILE: &str = ".crit.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Actor configuration
    #[serde(default)]
    pub actor: ActorConfig,

    /// Task store and state machine configuration
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Context cache configuration
    #[serde(default)]
    pub context: ContextConfig,

    /// Bulk import configuration
    #[serde(default)]
    pub import: ImportConfig,
}

/// Actor-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActorConfig {
    /// Default actor name when none specified
    #[serde(default = "default_actor")]
    pub default: String,
}

fn default_actor() -> String {
    "unknown".to_string()
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            default: default_actor(),
        }
    }
}

/// Tasks configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TasksConfig {
    /// Task ID prefix
    #[serde(default = "default_task_id_prefix")]
    pub id_prefix: String,

    /// Minimum task ID suffix length
    #[serde(default = "default_task_id_min_len")]
    pub id_min_len: usize,

    /// Maximum title length in characters
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,

    /// Number of other in-progress tasks an assignee may hold before
    /// starting another one produces a warning
    #[serde(default = "default_fragmentation_limit")]
    pub fragmentation_limit: usize,

    /// Delay before a blocked task is due for review (e.g., "3d")
    #[serde(default = "default_blocker_review_after")]
    pub blocker_review_after: String,
}

fn default_task_id_prefix() -> String {
    "crit".to_string()
}

fn default_task_id_min_len() -> usize {
    4
}

fn default_max_title_len() -> usize {
    200
}

fn default_fragmentation_limit() -> usize {
    2
}

fn default_blocker_review_after() -> String {
    "3d".to_string()
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            id_prefix: default_task_id_prefix(),
            id_min_len: default_task_id_min_len(),
            max_title_len: default_max_title_len(),
            fragmentation_limit: default_fragmentation_limit(),
            blocker_review_after: default_blocker_review_after(),
        }
    }
}

impl TasksConfig {
    pub fn blocker_review_delay(&self) -> Result<Duration> {
        parse_duration(&self.blocker_review_after)
    }

    fn validate(&self) -> Result<()> {
        let prefix = self.id_prefix.trim();
        if prefix.is_empty() {
            return Err(Error::InvalidConfig(
                "tasks.id_prefix cannot be empty".to_string(),
            ));
        }
        if !prefix.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(Error::InvalidConfig(
                "tasks.id_prefix must be alphanumeric".to_string(),
            ));
        }
        if !(4..=16).contains(&self.id_min_len) {
            return Err(Error::InvalidConfig(
                "tasks.id_min_len must be between 4 and 16".to_string(),
            ));
        }
        if self.max_title_len == 0 {
            return Err(Error::InvalidConfig(
                "tasks.max_title_len must be > 0".to_string(),
            ));
        }
        validate_duration(&self.blocker_review_after, "tasks.blocker_review_after")?;
        Ok(())
    }
}

/// Context cache configuration. Each cached field has its own TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    #[serde(default = "default_active_sprint_ttl")]
    pub active_sprint_ttl: String,

    #[serde(default = "default_recent_labels_ttl")]
    pub recent_labels_ttl: String,

    #[serde(default = "default_focused_tasks_ttl")]
    pub focused_tasks_ttl: String,

    /// Maximum number of labels remembered
    #[serde(default = "default_max_recent_labels")]
    pub max_recent_labels: usize,
}

fn default_active_sprint_ttl() -> String {
    "7d".to_string()
}

fn default_recent_labels_ttl() -> String {
    "24h".to_string()
}

fn default_focused_tasks_ttl() -> String {
    "8h".to_string()
}

fn default_max_recent_labels() -> usize {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            active_sprint_ttl: default_active_sprint_ttl(),
            recent_labels_ttl: default_recent_labels_ttl(),
            focused_tasks_ttl: default_focused_tasks_ttl(),
            max_recent_labels: default_max_recent_labels(),
        }
    }
}

impl ContextConfig {
    fn validate(&self) -> Result<()> {
        validate_duration(&self.active_sprint_ttl, "context.active_sprint_ttl")?;
        validate_duration(&self.recent_labels_ttl, "context.recent_labels_ttl")?;
        validate_duration(&self.focused_tasks_ttl, "context.focused_tasks_ttl")?;
        if self.max_recent_labels == 0 {
            return Err(Error::InvalidConfig(
                "context.max_recent_labels must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bulk import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    /// Concurrent file reads during import
    #[serde(default = "default_import_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_import_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_import_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_import_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_import_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_import_concurrency() -> usize {
    2
}

fn default_import_max_attempts() -> u32 {
    3
}

fn default_import_initial_delay_ms() -> u64 {
    100
}

fn default_import_backoff_factor() -> f64 {
    2.0
}

fn default_import_max_delay_ms() -> u64 {
    2000
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            concurrency: default_import_concurrency(),
            max_attempts: default_import_max_attempts(),
            initial_delay_ms: default_import_initial_delay_ms(),
            backoff_factor: default_import_backoff_factor(),
            max_delay_ms: default_import_max_delay_ms(),
        }
    }
}

impl ImportConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: StdDuration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: StdDuration::from_millis(self.max_delay_ms),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig(
                "import.concurrency must be >= 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "import.max_attempts must be >= 1".to_string(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(Error::InvalidConfig(
                "import.backoff_factor must be >= 1.0".to_string(),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(Error::InvalidConfig(
                "import.max_delay_ms must be >= import.initial_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a `.crit.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|err| Error::InvalidConfig(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the project root, or return defaults when the
    /// file is missing. A present but invalid file is an error.
    pub fn load_from_root(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.actor.default.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "actor.default cannot be empty".to_string(),
            ));
        }
        self.tasks.validate()?;
        self.context.validate()?;
        self.import.validate()?;
        Ok(())
    }
}

/// Longest accepted duration, about a century.
const MAX_DURATION_DAYS: i64 = 36_500;

/// Parse a duration string like "30m", "2h", "3d". A bare number is minutes.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidArgument("Duration cannot be empty".to_string()));
    }

    let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => s.split_at(pos),
        None => (s, "m"),
    };

    let num: i64 = num_str.parse().map_err(|_| {
        Error::InvalidArgument(format!("Invalid duration number: {num_str}"))
    })?;

    let duration = match unit.trim().to_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => Duration::try_seconds(num),
        "m" | "min" | "minute" | "minutes" => Duration::try_minutes(num),
        "h" | "hr" | "hour" | "hours" => Duration::try_hours(num),
        "d" | "day" | "days" => Duration::try_days(num),
        "w" | "week" | "weeks" => Duration::try_weeks(num),
        _ => {
            return Err(Error::InvalidArgument(format!(
                "Invalid duration unit '{unit}'. Expected: s, m, h, d, w"
            )));
        }
    };

    match duration {
        Some(duration) if duration.num_days() <= MAX_DURATION_DAYS => Ok(duration),
        _ => Err(Error::InvalidArgument(format!(
            "Duration too long: {s} (at most {MAX_DURATION_DAYS}d)"
        ))),
    }
}

fn validate_duration(value: &str, field: &str) -> Result<()> {
    parse_duration(value)
        .map(|_| ())
        .map_err(|err| Error::InvalidConfig(format!("{field}: {err}")))
}
