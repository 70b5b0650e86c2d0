//! crit - task state machine, task store and context cache
//!
//! This library provides the core of the crit CLI: tasks move through a
//! validated status lifecycle, are persisted as one JSON file each, and
//! carry ambient defaults from a small TTL-bound context cache.
//!
//! # Core Concepts
//!
//! - **Tasks**: units of work with priority, labels, estimates and links
//! - **Transitions**: status changes checked against a fixed graph plus
//!   business rules (one focused task per assignee, blocked needs a reason,
//!   done needs met criteria and finished dependencies)
//! - **Required actions**: side effects attempted after a transition
//! - **Context**: active sprint, recent labels and focused tasks, each with
//!   its own TTL
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `.crit.toml`
//! - `error`: Error types and result aliases
//! - `task`: Task model, filters, sorting and statistics
//! - `store`: Task persistence and queries
//! - `transition`: Transition validation
//! - `executor`: Transition execution and required actions
//! - `context`: Context cache with per-field TTLs
//! - `import`: Bulk import of task files
//! - `limiter` / `retry`: Bounded concurrency and backoff used by the importer
//! - `actor`: Actor identity management
//! - `events`: JSONL event output
//! - `storage`: File storage and directory layout
//! - `lock`: File locking and atomic writes

pub mod actor;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod import;
pub mod limiter;
pub mod lock;
pub mod output;
pub mod retry;
pub mod storage;
pub mod store;
pub mod task;
pub mod transition;

pub use error::{Error, Result};
