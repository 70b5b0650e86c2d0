//! Task event stream for external integrations.
//!
//! `--events -` writes one JSON line per mutation to stdout and silences the
//! regular output; `--events <path>` appends the same lines to a file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

pub const EVENT_SCHEMA_VERSION: &str = "crit.event.v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    /// Interpret the `--events` flag. Blank values disable events.
    pub fn from_flag(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim) {
            None | Some("") => None,
            Some("-") => Some(EventDestination::Stdout),
            Some(path) => Some(EventDestination::File(PathBuf::from(path))),
        }
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::Stdout(io::stdout())),
            EventDestination::File(path) => EventSink::append(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskArchived,
    TaskStateChanged,
    TaskImported,
}

/// One line of the event stream.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub schema_version: &'static str,
    pub event: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl TaskEvent {
    /// Build an event around `data`. The task id is lifted from the payload's
    /// `taskId` (transition records) or `id` (tasks) when present.
    pub fn new<T: Serialize>(event: EventKind, actor: &str, data: &T) -> Result<Self> {
        let data = serde_json::to_value(data)?;
        let task_id = ["taskId", "id"]
            .iter()
            .find_map(|key| data.get(*key).and_then(|value| value.as_str()))
            .map(str::to_string);
        Ok(Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event,
            task_id,
            actor: actor.to_string(),
            timestamp: Utc::now(),
            data,
        })
    }
}

pub enum EventSink {
    Stdout(io::Stdout),
    File(BufWriter<File>),
}

impl EventSink {
    fn append(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(EventSink::File(BufWriter::new(file)))
    }

    /// Write one event line and flush it.
    pub fn emit(&mut self, event: &TaskEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        match self {
            EventSink::Stdout(stdout) => {
                let mut out = stdout.lock();
                writeln!(out, "{line}")?;
                out.flush()?;
            }
            EventSink::File(writer) => {
                writeln!(writer, "{line}")?;
                writer.flush()?;
            }
        }
        Ok(())
    }
}
