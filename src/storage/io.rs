//! Blocking file primitives
//!
//! Every function here runs either on the caller's thread (sync API) or on a
//! pipeline worker (async API). Transient failures are retried in place.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crate::config::RetryPolicy;

/// Too many open files in this process
const EMFILE: i32 = 24;
/// Too many open files system-wide
const ENFILE: i32 = 23;

/// Distinguishes concurrent temp files for the same target
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Missing intermediate directory or descriptor exhaustion
pub(crate) fn is_transient(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound
        || matches!(err.raw_os_error(), Some(EMFILE) | Some(ENFILE))
}

/// Run `op`, retrying transient failures with a fixed delay
pub(crate) fn with_retry<T>(
    policy: RetryPolicy,
    mut op: impl FnMut() -> io::Result<T>,
) -> io::Result<T> {
    let mut remaining = policy.attempts;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if remaining > 0 && is_transient(&e) => {
                remaining -= 1;
                tracing::warn!(error = %e, remaining, "transient I/O error, retrying");
                thread::sleep(policy.delay());
            }
            Err(e) => return Err(e),
        }
    }
}

/// Read a whole file; `Ok(None)` when it does not exist
pub(crate) fn read_file(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Replace a file's contents, creating parent directories as needed
pub(crate) fn write_file(path: &Path, bytes: &[u8], atomic: bool) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    if !atomic {
        return fs::write(path, bytes);
    }

    let temp_path = temp_path_for(path);
    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Remove a file or directory; absent targets are not an error
pub(crate) fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Remove empty directories below `root`, never `root` itself.
///
/// Returns the number of directories removed.
pub(crate) fn prune_empty_dirs(root: &Path) -> io::Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            removed += prune_subtree(&entry.path())?;
        }
    }
    Ok(removed)
}

fn prune_subtree(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            removed += prune_subtree(&entry.path())?;
        }
    }
    if fs::read_dir(dir)?.next().is_none() && fs::remove_dir(dir).is_ok() {
        removed += 1;
    }
    Ok(removed)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!("{}.{}.{}.tmp", name, std::process::id(), seq))
}
