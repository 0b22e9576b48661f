//! Async connection pool and execution core for one `SQLite` database.
//!
//! A [`DbPool`] owns a fixed set of connections. The [`exec`] functions run positional
//! statement/parameter batches (optionally in one transaction) and stream rows to a callback,
//! and the [`blob`] functions move large values in and out of rows in chunks.
//!
//! ```rust,no_run
//! use sqlite_pool_exec::prelude::*;
//!
//! # async fn demo() -> Result<(), PoolExecError> {
//! let pool = DbPool::new();
//! pool.init("app.db", 4).await?;
//! let ctx = ExecContext::background();
//!
//! execute_transactional(
//!     &pool,
//!     &ctx,
//!     &["INSERT INTO users (name) VALUES ($name)"],
//!     &[NamedParams::new().with("$name", "alice")],
//!     None,
//! )
//! .await?;
//!
//! let mut names = Vec::new();
//! execute(
//!     &pool,
//!     &ctx,
//!     &["SELECT name FROM users"],
//!     &[NamedParams::new()],
//!     Some(&mut |_: usize, row: Row| names.push(row.get("name").cloned())),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod blob;
pub mod context;
pub mod error;
pub mod exec;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod test_utils;
pub mod types;

mod transaction;

pub use backup::{BackupOptions, backup_database, backup_database_with};
pub use blob::{BlobRef, create_blob, read_range, stream_insert, write_chunk};
pub use context::ExecContext;
pub use error::PoolExecError;
pub use exec::{RowCallback, execute, execute_script, execute_transactional};
pub use pool::{DbPool, Lease, PoolOptions, PoolOptionsBuilder, PoolStatus, SqliteManager};
pub use results::{ColumnShape, Row};
pub use types::{ExtraColumns, NamedParams, RowValues};
