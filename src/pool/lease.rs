use std::fmt;
use std::sync::Arc;

use bb8::PooledConnection;
use tokio::task::JoinHandle;

use super::manager::{SharedSqliteConnection, SqliteManager};
use crate::error::PoolExecError;

/// Exclusive hold on one pooled connection.
///
/// The connection returns to the pool when the lease drops. Work scheduled through
/// [`Lease::spawn_blocking`] must be joined before the lease goes away so a connection is never
/// handed to a second caller while a worker still uses it.
pub struct Lease {
    conn: PooledConnection<'static, SqliteManager>,
}

impl Lease {
    pub(crate) fn new(conn: PooledConnection<'static, SqliteManager>) -> Self {
        Self { conn }
    }

    pub(crate) fn handle(&self) -> SharedSqliteConnection {
        Arc::clone(&*self.conn)
    }

    /// Run `func` on a blocking worker with the leased connection locked.
    pub(crate) fn spawn_blocking<F, R>(&self, func: F) -> JoinHandle<Result<R, PoolExecError>>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, PoolExecError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.handle();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            func(&mut guard)
        })
    }

    /// Run `func` against the raw connection and wait for it.
    ///
    /// # Errors
    /// Returns whatever `func` returns, or `PoolExecError::Worker` if the worker panicked.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, PoolExecError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, PoolExecError> + Send + 'static,
        R: Send + 'static,
    {
        join(self.spawn_blocking(func)).await
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").field("conn", &*self.conn).finish()
    }
}

pub(crate) async fn join<R>(handle: JoinHandle<Result<R, PoolExecError>>) -> Result<R, PoolExecError> {
    handle
        .await
        .map_err(|e| PoolExecError::Worker(format!("sqlite spawn_blocking join error: {e}")))?
}
