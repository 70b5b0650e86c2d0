//! Advisory locking and atomic file replacement under `.crit/`.
//!
//! Every store mutation runs while holding an exclusive flock on
//! `.crit/.lock`. Record files are replaced through a sibling temp file so a
//! reader never observes a half-written task.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

const FIRST_POLL: Duration = Duration::from_millis(5);
const MAX_POLL: Duration = Duration::from_millis(100);

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Exclusive lock on a file, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Wait up to `timeout_ms` for the lock, polling with a growing interval.
    ///
    /// Returns [`Error::LockFailed`] when the deadline passes.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;
        let started = Instant::now();
        let deadline = started + Duration::from_millis(timeout_ms);
        let mut poll = FIRST_POLL;

        loop {
            if try_lock(&file)? {
                let waited = started.elapsed();
                if waited >= FIRST_POLL {
                    debug!(path = %path.display(), waited_ms = waited.as_millis() as u64, "lock acquired after wait");
                }
                return Ok(FileLock {
                    file,
                    path: path.to_path_buf(),
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::LockFailed(path.to_path_buf()));
            }
            thread::sleep(poll.min(deadline - now));
            poll = (poll * 2).min(MAX_POLL);
        }
    }

    /// Take the lock only if it is free right now.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;
        Ok(try_lock(&file)?.then(|| FileLock {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// `Ok(false)` when another holder has the lock.
fn try_lock(file: &File) -> Result<bool> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(true),
        Err(err) if is_contended(&err) => Ok(false),
        Err(err) => Err(Error::Io(err)),
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Replace `path` with `data` via a synced sibling temp file and a rename.
///
/// The temp file is removed if anything fails before the rename. Callers
/// serialize writers with [`FileLock`]; this function takes no lock.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidArgument(format!("not a file path: {}", path.display())))?;
    let temp_path = parent.join(format!(
        ".{file_name}.tmp.{}.{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let written = File::create(&temp_path).and_then(|mut temp| {
        temp.write_all(data)?;
        temp.sync_all()
    });
    if let Err(err) = written.and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    Ok(())
}
