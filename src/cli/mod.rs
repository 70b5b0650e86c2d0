//! Command-line interface for crit
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::actor::ResolvedActor;
use crate::config::Config;
use crate::context::ContextCache;
use crate::error::{Error, Result};
use crate::events::{EventDestination, EventKind, EventSink, TaskEvent};
use crate::output::OutputOptions;
use crate::storage::{self, Storage};
use crate::store::TaskStore;

mod actor;
mod context;
mod init;
mod task;

/// crit - task state machine and context cache
///
/// Tracks tasks through a validated status lifecycle, keeps one focused task
/// per developer, and remembers ambient context such as the active sprint.
#[derive(Parser, Debug)]
#[command(name = "crit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root (defaults to the nearest directory containing .crit/)
    #[arg(long, global = true, env = "CRIT_ROOT")]
    pub root: Option<PathBuf>,

    /// Actor identity recorded on transitions
    #[arg(long, global = true, env = "CRIT_ACTOR")]
    pub actor: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit task events as JSONL to a file, or '-' for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize crit in a directory
    Init,

    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Context cache (active sprint, recent labels, focused tasks)
    #[command(subcommand)]
    Context(ContextCommands),

    /// Set or show actor identity
    #[command(subcommand)]
    Actor(ActorCommands),
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Create a task
    New {
        /// Task title
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        /// Priority: critical, high, medium, low
        #[arg(short, long)]
        priority: Option<String>,

        #[arg(long)]
        assignee: Option<String>,

        /// Label (repeatable)
        #[arg(short, long = "label")]
        labels: Vec<String>,

        /// Story points (positive integer)
        #[arg(long)]
        points: Option<u32>,

        /// Estimated hours
        #[arg(long)]
        hours: Option<f64>,

        /// Sprint (defaults to the active sprint)
        #[arg(long)]
        sprint: Option<String>,

        /// Due date (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,

        /// Acceptance criterion (repeatable)
        #[arg(long = "criterion")]
        criteria: Vec<String>,

        /// Parent task id
        #[arg(long)]
        parent: Option<String>,

        /// Dependency task id (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,

        /// Create as a draft (hidden from default listings)
        #[arg(long)]
        draft: bool,
    },

    /// List tasks
    List {
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        assignee: Option<String>,

        /// Require label (repeatable; all must match)
        #[arg(short, long = "label")]
        labels: Vec<String>,

        #[arg(long)]
        sprint: Option<String>,

        #[arg(long)]
        parent: Option<String>,

        /// Case-insensitive text search over title, description, labels and assignee
        #[arg(short = 's', long)]
        search: Option<String>,

        /// Include archived tasks
        #[arg(long)]
        all: bool,

        /// Include drafts
        #[arg(long)]
        drafts: bool,

        /// Sort field: priority, created, updated, title, status, due
        #[arg(long, default_value = "priority")]
        sort: String,

        /// Reverse the sort order
        #[arg(long)]
        desc: bool,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one task
    Show {
        /// Task id (or unique prefix)
        id: String,
    },

    /// Edit task fields other than status
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long, conflicts_with = "description")]
        clear_description: bool,

        #[arg(short, long)]
        priority: Option<String>,

        #[arg(long)]
        assignee: Option<String>,

        #[arg(long, conflicts_with = "assignee")]
        unassign: bool,

        #[arg(long = "add-label")]
        add_labels: Vec<String>,

        #[arg(long = "remove-label")]
        remove_labels: Vec<String>,

        #[arg(long)]
        points: Option<u32>,

        #[arg(long, conflicts_with = "points")]
        clear_points: bool,

        #[arg(long)]
        hours: Option<f64>,

        #[arg(long)]
        sprint: Option<String>,

        #[arg(long, conflicts_with = "sprint")]
        clear_sprint: bool,

        #[arg(long)]
        due: Option<String>,

        #[arg(long, conflicts_with = "due")]
        clear_due: bool,

        /// Append an acceptance criterion (repeatable)
        #[arg(long = "add-criterion")]
        add_criteria: Vec<String>,

        /// Mark criterion N (1-based) as met (repeatable)
        #[arg(long = "complete-criterion")]
        complete_criteria: Vec<usize>,

        #[arg(long)]
        parent: Option<String>,

        #[arg(long, conflicts_with = "parent")]
        clear_parent: bool,

        /// Replace dependencies (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,

        #[arg(long, conflicts_with = "depends_on")]
        clear_dependencies: bool,

        /// Mark as draft
        #[arg(long)]
        draft: bool,

        /// Clear the draft flag
        #[arg(long, conflicts_with = "draft")]
        ready: bool,
    },

    /// Delete a task permanently
    Delete { id: String },

    /// Archive a task (hidden from default listings)
    Archive { id: String },

    /// Change task status through the state machine
    State {
        id: String,

        /// Target status (todo, in_progress, focused, blocked, done, cancelled, archived)
        status: String,

        /// Reason (required when blocking)
        #[arg(short, long)]
        reason: Option<String>,

        /// Move the assignee's current focus back to in_progress
        #[arg(long)]
        auto_unfocus: bool,
    },

    /// Show the transition history of a task
    History { id: String },

    /// Task counts by status and priority
    Stats,

    /// Create tasks from JSON files (object or array of objects)
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Context subcommands
#[derive(Subcommand, Debug)]
pub enum ContextCommands {
    /// Show the current context
    Show,

    /// Set or clear the active sprint
    #[command(visible_alias = "set")]
    Sprint {
        name: Option<String>,

        #[arg(long, conflicts_with = "name")]
        clear: bool,
    },

    /// Record a recently used label
    Label { label: String },

    /// Add a task to the focused list without changing its status
    Focus { id: String },

    /// Remove a task from the focused list
    Unfocus { id: String },

    /// Reset a cached field: active_sprint, recent_labels, focused_tasks, blocker_reviews
    Invalidate { field: String },
}

/// Actor subcommands
#[derive(Subcommand, Debug)]
pub enum ActorCommands {
    /// Persist the actor identity for this project
    Set { name: String },

    /// Show the resolved actor identity
    Show,
}

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub root: Option<PathBuf>,
    pub actor: Option<String>,
    pub json: bool,
    pub quiet: bool,
    pub events: Option<String>,
}

impl GlobalOptions {
    fn events_to_stdout(&self) -> bool {
        matches!(
            EventDestination::from_flag(self.events.as_deref()),
            Some(EventDestination::Stdout)
        )
    }

    /// Events on stdout take over the stream, so regular output is silenced.
    fn output(&self) -> OutputOptions {
        let events_to_stdout = self.events_to_stdout();
        OutputOptions {
            json: self.json && !events_to_stdout,
            quiet: self.quiet || events_to_stdout,
        }
    }

    fn start_dir(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

/// Everything a command needs from an initialized project.
struct Session {
    storage: Storage,
    config: Config,
    store: TaskStore,
    actor: ResolvedActor,
    output: OutputOptions,
    events: Option<EventSink>,
}

impl Session {
    fn open(global: &GlobalOptions) -> Result<Self> {
        let root = project_root(global)?;
        let storage = Storage::new(&root);
        let config = Config::load_from_root(&root)?;
        let store = TaskStore::new(storage.clone(), config.tasks.clone());
        let actor = crate::actor::resolve_actor(&storage, &config.actor, global.actor.as_deref())?;
        let events = EventDestination::from_flag(global.events.as_deref())
            .map(|destination| destination.open())
            .transpose()?;
        Ok(Self {
            storage,
            config,
            store,
            actor,
            output: global.output(),
            events,
        })
    }

    fn context_cache(&self) -> Result<ContextCache> {
        ContextCache::new(self.storage.clone(), &self.config.context)
    }

    /// Emit an event; failures come back as a warning for the output.
    fn emit_event<T: Serialize>(&mut self, kind: EventKind, data: &T) -> Option<String> {
        let sink = self.events.as_mut()?;
        let event = match TaskEvent::new(kind, &self.actor.name, data) {
            Ok(event) => event,
            Err(err) => return Some(format!("event output failed: {err}")),
        };
        sink.emit(&event)
            .err()
            .map(|err| format!("event output failed: {err}"))
    }
}

fn project_root(global: &GlobalOptions) -> Result<PathBuf> {
    let start = global.start_dir()?;
    if global.root.is_some() {
        return if Storage::new(&start).is_initialized() {
            Ok(start)
        } else {
            Err(Error::NotInitialized(start))
        };
    }
    storage::discover_root(&start).ok_or(Error::NotInitialized(start))
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

impl Cli {
    fn global(&self) -> GlobalOptions {
        GlobalOptions {
            root: self.root.clone(),
            actor: self.actor.clone(),
            json: self.json,
            quiet: self.quiet,
            events: self.events.clone(),
        }
    }

    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let global = self.global();
        match self.command {
            Commands::Init => init::run(&global),
            Commands::Task(cmd) => task::run(cmd, &global),
            Commands::Context(cmd) => context::run(cmd, &global),
            Commands::Actor(cmd) => match cmd {
                ActorCommands::Set { name } => actor::run_set(&global, &name),
                ActorCommands::Show => actor::run_show(&global),
            },
        }
    }
}
