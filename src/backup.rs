//! Online copy of a live database into another file, a few pages at a time.

use std::path::Path;
use std::thread;
use std::time::Duration;

use rusqlite::backup::{Backup, StepResult};
use rusqlite::{Connection, ErrorCode, OpenFlags};

use crate::error::PoolExecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupOptions {
    /// Pages copied per step.
    pub pages_per_step: i32,
    /// Pause before retrying a step that found the source busy or locked.
    pub retry_delay: Duration,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            pages_per_step: 5,
            retry_delay: Duration::from_millis(250),
        }
    }
}

/// Copy `source` into `dest` with [`BackupOptions::default`].
///
/// # Errors
/// See [`backup_database_with`].
pub fn backup_database(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<(), PoolExecError> {
    backup_database_with(source, dest, BackupOptions::default())
}

/// Copy `source` (opened read-only) into `dest` (created if missing).
///
/// Blocks the calling thread; run it under `spawn_blocking` from async code.
///
/// # Errors
/// `BackupOpen` if either file cannot be opened, `BackupInit` if the copy cannot start,
/// `BackupStep` for any step failure other than a busy or locked source.
pub fn backup_database_with(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
    options: BackupOptions,
) -> Result<(), PoolExecError> {
    let source = source.as_ref();
    let dest = dest.as_ref();

    let src = open(source, OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI)?;
    let mut dst = open(
        dest,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_URI,
    )?;

    let backup = Backup::new(&src, &mut dst).map_err(PoolExecError::BackupInit)?;
    let mut steps = 0_u64;
    loop {
        match backup.step(options.pages_per_step) {
            Ok(StepResult::Done) => break,
            Ok(StepResult::More) => steps += 1,
            Ok(_) => retry(options.retry_delay),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                retry(options.retry_delay);
            }
            Err(e) => return Err(PoolExecError::BackupStep(e)),
        }
    }
    tracing::info!(
        source = %source.display(),
        dest = %dest.display(),
        steps,
        "backup complete"
    );
    Ok(())
}

fn open(path: &Path, flags: OpenFlags) -> Result<Connection, PoolExecError> {
    Connection::open_with_flags(path, flags).map_err(|source| PoolExecError::BackupOpen {
        path: path.to_path_buf(),
        source,
    })
}

fn retry(delay: Duration) {
    tracing::warn!(?delay, "backup source busy; retrying");
    thread::sleep(delay);
}
