//! Isolated in-memory fixtures for tests.
//!
//! Each call gets its own shared-cache in-memory database, so tests running in parallel never
//! see each other's tables. The database lives while at least one pooled connection is open.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::ExecContext;
use crate::error::PoolExecError;
use crate::pool::DbPool;

static NEXT_DB: AtomicU64 = AtomicU64::new(0);

/// A unique `file:` URI for a private shared-cache in-memory database.
#[must_use]
pub fn memory_uri(label: &str) -> String {
    let n = NEXT_DB.fetch_add(1, Ordering::Relaxed);
    format!(
        "file:sqlite-pool-exec-{}-{n}-{label}?mode=memory&cache=shared",
        process::id()
    )
}

/// Open a pool on a fresh in-memory database and apply `migration` to it.
///
/// # Errors
/// Returns `PoolExecError` if the pool cannot be opened or the migration fails.
pub async fn memory_pool(migration: &str, capacity: u32) -> Result<DbPool, PoolExecError> {
    let pool = DbPool::new();
    pool.init(memory_uri("fixture"), capacity).await?;
    migrate(&pool, migration).await?;
    Ok(pool)
}

/// Run a multi-statement SQL script on one pooled connection.
///
/// # Errors
/// Returns `PoolExecError` if no connection is available or the script fails.
pub async fn migrate(pool: &DbPool, sql: &str) -> Result<(), PoolExecError> {
    if sql.trim().is_empty() {
        return Ok(());
    }
    let sql = sql.to_owned();
    let lease = pool.acquire(&ExecContext::background()).await?;
    lease
        .with_connection(move |conn| conn.execute_batch(&sql).map_err(PoolExecError::from))
        .await
}
