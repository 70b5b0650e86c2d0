//! Bulk task import from JSON files.
//!
//! Each file holds one task input object or an array of them. Files are read
//! concurrently through the [`AnalysisLimiter`]; transient read errors are
//! retried with backoff. Tasks are then created one by one in input order so
//! ids and timestamps follow the order the caller gave.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::ImportConfig;
use crate::error::{Error, Result};
use crate::limiter::AnalysisLimiter;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::TaskStore;
use crate::task::{NewTask, Task};

#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    /// `path` for a whole file, `path#index` for one entry of an array
    pub source: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub created: Vec<Task>,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Import every task found in `paths`.
///
/// `prepare` runs on each input before creation, e.g. to fill context
/// defaults. Per-file and per-entry problems are collected in the report;
/// `Err` is reserved for failures of the import machinery itself.
pub fn import_tasks<F>(
    store: &TaskStore,
    paths: &[PathBuf],
    config: &ImportConfig,
    mut prepare: F,
) -> Result<ImportReport>
where
    F: FnMut(&mut NewTask) -> Result<()>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let payloads = runtime.block_on(read_payloads(paths, config))?;

    let mut report = ImportReport::default();
    for (path, payload) in payloads {
        let entries = match payload {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "import file skipped");
                report.failures.push(ImportFailure {
                    source: path.display().to_string(),
                    error: err.to_string(),
                });
                continue;
            }
        };
        let many = entries.len() > 1;
        for (index, entry) in entries.into_iter().enumerate() {
            let source = if many {
                format!("{}#{index}", path.display())
            } else {
                path.display().to_string()
            };
            let created = entry.and_then(|mut input| {
                prepare(&mut input)?;
                store.create_task(input)
            });
            match created {
                Ok(task) => report.created.push(task),
                Err(err) => report.failures.push(ImportFailure {
                    source,
                    error: err.to_string(),
                }),
            }
        }
    }
    debug!(
        created = report.created.len(),
        failed = report.failures.len(),
        "import finished"
    );
    Ok(report)
}

type Payload = Result<Vec<Result<NewTask>>>;

async fn read_payloads(paths: &[PathBuf], config: &ImportConfig) -> Result<Vec<(PathBuf, Payload)>> {
    let limiter = AnalysisLimiter::new(config.concurrency);
    let policy = config.retry_policy();

    let mut set = JoinSet::new();
    for (index, path) in paths.iter().cloned().enumerate() {
        let limiter = limiter.clone();
        let policy = policy.clone();
        set.spawn(async move {
            let payload = limiter
                .run(read_payload(&policy, &path))
                .await
                .and_then(|payload| payload);
            (index, path, payload)
        });
    }

    let mut slots: Vec<Option<(PathBuf, Payload)>> = paths.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, path, payload) =
            joined.map_err(|err| Error::OperationFailed(format!("import worker failed: {err}")))?;
        slots[index] = Some((path, payload));
    }
    Ok(slots.into_iter().flatten().collect())
}

async fn read_payload(policy: &RetryPolicy, path: &Path) -> Payload {
    let raw = retry_with_backoff(policy, is_transient, |_| async {
        tokio::fs::read_to_string(path).await.map_err(Error::from)
    })
    .await?;

    let value: Value = serde_json::from_str(&raw)?;
    let entries = match value {
        Value::Array(items) => items.into_iter().map(parse_entry).collect(),
        other => vec![parse_entry(other)],
    };
    Ok(entries)
}

fn parse_entry(value: Value) -> Result<NewTask> {
    Ok(serde_json::from_value(value)?)
}

fn is_transient(err: &Error) -> bool {
    match err {
        Error::Io(io_err) => !matches!(
            io_err.kind(),
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidData
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TasksConfig;
    use crate::storage::Storage;
    use std::fs;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> TaskStore {
        let storage = Storage::new(dir.path());
        storage.init().unwrap();
        TaskStore::new(storage, TasksConfig::default())
    }

    #[test]
    fn imports_objects_and_arrays_in_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let single = dir.path().join("single.json");
        let batch = dir.path().join("batch.json");
        fs::write(&single, r#"{"title": "first", "priority": "high"}"#).unwrap();
        fs::write(
            &batch,
            r#"[{"title": "second"}, {"title": "third", "labels": ["ai"]}]"#,
        )
        .unwrap();

        let report = import_tasks(&store, &[single, batch], &ImportConfig::default(), |_| Ok(())).unwrap();

        assert!(report.is_clean(), "{:?}", report.failures);
        let titles: Vec<_> = report.created.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
        assert_eq!(store.load_all().unwrap().len(), 3);
    }

    #[test]
    fn bad_entries_are_reported_without_stopping() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let batch = dir.path().join("batch.json");
        let broken = dir.path().join("broken.json");
        fs::write(&batch, r#"[{"title": ""}, {"title": "ok"}, {"title": "x", "bogus": 1}]"#).unwrap();
        fs::write(&broken, "{ nope").unwrap();
        let missing = dir.path().join("missing.json");

        let report = import_tasks(
            &store,
            &[batch.clone(), broken.clone(), missing],
            &ImportConfig::default(),
            |_| Ok(()),
        )
        .unwrap();

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].title, "ok");
        let sources: Vec<_> = report.failures.iter().map(|f| f.source.clone()).collect();
        assert_eq!(sources.len(), 4);
        assert!(sources.contains(&format!("{}#0", batch.display())));
        assert!(sources.contains(&format!("{}#2", batch.display())));
        assert!(sources.contains(&broken.display().to_string()));
    }

    #[test]
    fn prepare_hook_sees_every_input() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let file = dir.path().join("tasks.json");
        fs::write(&file, r#"[{"title": "a"}, {"title": "b", "sprint": "keep"}]"#).unwrap();

        let report = import_tasks(&store, &[file], &ImportConfig::default(), |input| {
            if input.sprint.is_none() {
                input.sprint = Some("s9".to_string());
            }
            Ok(())
        })
        .unwrap();

        let sprints: Vec<_> = report
            .created
            .iter()
            .map(|t| t.sprint.clone().unwrap())
            .collect();
        assert_eq!(sprints, vec!["s9", "keep"]);
    }
}
