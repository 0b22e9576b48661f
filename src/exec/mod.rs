//! Statement executor.
//!
//! Statements and parameter sets are paired by position. One connection is leased for the
//! whole call; statements run in order on a blocking worker and rows stream back to the
//! caller's callback through a bounded channel, so a result set is never held in full.
//!
//! Blank statements are skipped and do not count. The callback receives the 0-based index of
//! the statement that produced the row among the non-blank ones, and an owned [`Row`]. A
//! failing statement is reported by its 1-based index in [`PoolExecError::Statement`].

mod statement;

use tokio::sync::mpsc;

use crate::context::ExecContext;
use crate::error::PoolExecError;
use crate::pool::{DbPool, join};
use crate::results::Row;
use crate::types::NamedParams;

use statement::{Batch, run_batch};

/// Consumer for streamed rows: `(statement index, row)`.
pub type RowCallback<'a> = &'a mut (dyn FnMut(usize, Row) + Send);

const ROW_CHANNEL_DEPTH: usize = 32;

/// Separator used by [`execute_script`] to split a script into statements.
pub const SCRIPT_SEPARATOR: &str = ";\n";

/// Run statements in autocommit mode.
///
/// # Errors
/// `ShapeMismatch` before any connection is touched when the slices differ in length;
/// acquisition errors from [`DbPool::acquire`]; `Statement` for the first failing statement.
pub async fn execute<S: AsRef<str>>(
    pool: &DbPool,
    ctx: &ExecContext,
    statements: &[S],
    params: &[NamedParams],
    on_row: Option<RowCallback<'_>>,
) -> Result<(), PoolExecError> {
    run(pool, ctx, statements, params, on_row, false).await
}

/// Run statements inside one transaction. Any failure, including a failed commit, rolls back
/// before the error is returned.
///
/// # Errors
/// As [`execute`], plus `TransactionBegin` and `TransactionCommit`.
pub async fn execute_transactional<S: AsRef<str>>(
    pool: &DbPool,
    ctx: &ExecContext,
    statements: &[S],
    params: &[NamedParams],
    on_row: Option<RowCallback<'_>>,
) -> Result<(), PoolExecError> {
    run(pool, ctx, statements, params, on_row, true).await
}

/// Split `script` on [`SCRIPT_SEPARATOR`] and run every piece with the same parameters.
///
/// # Errors
/// As [`execute`].
pub async fn execute_script(
    pool: &DbPool,
    ctx: &ExecContext,
    script: &str,
    params: &NamedParams,
    on_row: Option<RowCallback<'_>>,
) -> Result<(), PoolExecError> {
    let statements: Vec<&str> = script.split(SCRIPT_SEPARATOR).collect();
    let params = vec![params.clone(); statements.len()];
    execute(pool, ctx, &statements, &params, on_row).await
}

async fn run<S: AsRef<str>>(
    pool: &DbPool,
    ctx: &ExecContext,
    statements: &[S],
    params: &[NamedParams],
    on_row: Option<RowCallback<'_>>,
    transactional: bool,
) -> Result<(), PoolExecError> {
    if statements.len() != params.len() {
        return Err(PoolExecError::ShapeMismatch {
            statements: statements.len(),
            params: params.len(),
        });
    }
    let batch: Batch = statements
        .iter()
        .map(|s| s.as_ref().to_owned())
        .zip(params.iter().cloned())
        .collect();

    let lease = pool.acquire(ctx).await?;
    tracing::debug!(statements = batch.len(), transactional, "executing batch");

    let Some(on_row) = on_row else {
        return join(lease.spawn_blocking(move |conn| run_batch(conn, &batch, transactional, None)))
            .await;
    };

    let (tx, mut rx) = mpsc::channel(ROW_CHANNEL_DEPTH);
    let handle = lease.spawn_blocking(move |conn| run_batch(conn, &batch, transactional, Some(&tx)));
    while let Some((pos, row)) = rx.recv().await {
        on_row(pos, row);
    }
    let result = join(handle).await;
    drop(lease);
    result
}
