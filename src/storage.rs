//! Storage layer for crit
//!
//! All persistent state lives under `.crit/` at the project root:
//!
//! ```text
//! .crit/
//!   .lock                 # Advisory lock held around every mutation
//!   actor                 # Persisted actor identity
//!   context.json          # Context cache snapshot + per-field timestamps
//!   transitions.jsonl     # Audit log of executed transitions
//!   tasks/
//!     <task-id>.json      # One record per task
//! ```

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};

/// Name of the data directory at the project root
pub const DATA_DIR: &str = ".crit";

const TASKS_DIR: &str = "tasks";
const CONTEXT_FILE: &str = "context.json";
const AUDIT_FILE: &str = "transitions.jsonl";
const ACTOR_FILE: &str = "actor";
const LOCK_FILE: &str = ".lock";

/// Walk up from `start` to the nearest directory holding `.crit/`.
pub fn discover_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(DATA_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// Storage manager for crit state
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a storage manager rooted at the project directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    /// Project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the `.crit/` directory
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    /// Directory holding one JSON file per task
    pub fn tasks_dir(&self) -> PathBuf {
        self.data_dir().join(TASKS_DIR)
    }

    /// Path of the record file for a task id
    pub fn task_file(&self, task_id: &str) -> PathBuf {
        self.tasks_dir().join(format!("{task_id}.json"))
    }

    pub fn context_file(&self) -> PathBuf {
        self.data_dir().join(CONTEXT_FILE)
    }

    pub fn audit_file(&self) -> PathBuf {
        self.data_dir().join(AUDIT_FILE)
    }

    pub fn actor_file(&self) -> PathBuf {
        self.data_dir().join(ACTOR_FILE)
    }

    fn lock_file(&self) -> PathBuf {
        self.data_dir().join(LOCK_FILE)
    }

    // =========================================================================
    // Directory initialization
    // =========================================================================

    /// Create the `.crit/` directory structure
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.tasks_dir())?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.tasks_dir().exists()
    }

    // =========================================================================
    // Locking
    // =========================================================================

    /// Run `f` while holding the data directory lock.
    pub fn locked<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let lock = FileLock::acquire(self.lock_file(), DEFAULT_LOCK_TIMEOUT_MS)?;
        tracing::trace!(path = %lock.path().display(), "acquired data lock");
        f()
    }

    // =========================================================================
    // File I/O helpers
    // =========================================================================

    /// Write JSON data atomically (temp file + rename)
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic(path, json.as_bytes())
    }

    /// Read JSON data from a file
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        let data: T = serde_json::from_str(&content)?;
        Ok(data)
    }

    /// Read JSON data if the file exists
    pub fn read_json_opt<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        self.read_json(path).map(Some)
    }

    /// Append a line to a JSONL file
    pub fn append_jsonl<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(record)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        writeln!(file, "{json}")?;
        file.sync_all()?;

        Ok(())
    }

    /// Read all records from a JSONL file, skipping blank lines
    pub fn read_jsonl<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: T = serde_json::from_str(&line)?;
            records.push(record);
        }

        Ok(records)
    }

    /// Remove a file, returning whether it existed
    pub fn remove_file(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    // =========================================================================
    // Actor persistence
    // =========================================================================

    /// Read the persisted actor identity
    pub fn read_actor(&self) -> Result<Option<String>> {
        let path = self.actor_file();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let actor = raw.trim();
        Ok((!actor.is_empty()).then(|| actor.to_string()))
    }

    /// Persist the actor identity
    pub fn write_actor(&self, actor: &str) -> Result<()> {
        lock::write_atomic(self.actor_file(), format!("{actor}\n").as_bytes())
    }
}
