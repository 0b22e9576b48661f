use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolExecError {
    #[error("pool not initialized")]
    PoolNotInitialized,

    #[error("failed to init pool: [{target}] {source}")]
    Init {
        target: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to take connection from pool: {0}")]
    Acquire(#[source] rusqlite::Error),

    #[error("timed out waiting for a pooled connection")]
    AcquireTimeout,

    #[error("operation cancelled while waiting for a pooled connection")]
    Cancelled,

    #[error("deadline exceeded while waiting for a pooled connection")]
    DeadlineExceeded,

    #[error("statement/parameter count mismatch: {statements} statements, {params} parameter sets")]
    ShapeMismatch { statements: usize, params: usize },

    #[error("error executing statement {index}: {source}")]
    Statement {
        /// 1-based position of the failing statement.
        index: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to begin transaction: {0}")]
    TransactionBegin(#[source] rusqlite::Error),

    #[error("failed to commit transaction: {0}")]
    TransactionCommit(#[source] rusqlite::Error),

    #[error("row consumer went away before the statement finished")]
    RowConsumerClosed,

    #[error("failed to insert zeroblob row into {table}: {source}")]
    Insert {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("no blob at {table}.{column} for row {row_id}: {source}")]
    RowNotFound {
        table: String,
        column: String,
        row_id: i64,
        #[source]
        source: rusqlite::Error,
    },

    #[error("blob write error on row {row_id}: wrote {written} bytes, expected {expected}")]
    WriteLengthMismatch {
        row_id: i64,
        written: usize,
        expected: usize,
    },

    #[error("blob size mismatch: declared {declared} bytes, source provided {actual}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("blob stream aborted by its source")]
    StreamAborted,

    #[error("blob I/O error on row {row_id}: {source}")]
    BlobIo {
        row_id: i64,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("SQLite worker error: {0}")]
    Worker(String),

    #[error("failed to open database: [{}] {source}", path.display())]
    BackupOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to init backup: {0}")]
    BackupInit(#[source] rusqlite::Error),

    #[error("backup step failed: {0}")]
    BackupStep(#[source] rusqlite::Error),
}

impl PoolExecError {
    /// The 1-based statement index carried by a [`PoolExecError::Statement`].
    #[must_use]
    pub fn statement_index(&self) -> Option<usize> {
        match self {
            PoolExecError::Statement { index, .. } => Some(*index),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_row_not_found(&self) -> bool {
        matches!(self, PoolExecError::RowNotFound { .. })
    }
}
