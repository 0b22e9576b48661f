use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bb8::{ManageConnection, Pool};
use rusqlite::{Connection, OpenFlags};
use tokio::sync::Mutex;

use super::PoolOptions;
use super::functions::register_functions;
use crate::error::PoolExecError;

/// A pooled connection. The mutex hands the connection to one blocking worker at a time.
pub type SharedSqliteConnection = Arc<Mutex<Connection>>;

/// bb8 manager that opens and prepares `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    target: Arc<str>,
    busy_timeout: Duration,
}

impl SqliteManager {
    #[must_use]
    pub fn new(target: impl Into<String>, busy_timeout: Duration) -> Self {
        Self {
            target: Arc::from(target.into()),
            busy_timeout,
        }
    }

    #[must_use]
    pub fn from_options(opts: &PoolOptions) -> Self {
        Self::new(opts.target.clone(), opts.busy_timeout)
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Build a pool that opens every connection up front.
    ///
    /// # Errors
    /// Returns `PoolExecError::Init` if any connection fails to open or configure.
    pub async fn build_pool(self, opts: &PoolOptions) -> Result<Pool<SqliteManager>, PoolExecError> {
        let target = self.target.to_string();
        Pool::builder()
            .max_size(opts.capacity)
            .min_idle(Some(opts.capacity))
            .retry_connection(false)
            .test_on_check_out(false)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connection_timeout(opts.acquire_timeout)
            .build(self)
            .await
            .map_err(|source| PoolExecError::Init { target, source })
    }

    fn open_blocking(&self) -> rusqlite::Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&*self.target, flags)?;
        configure_connection(&conn, self.busy_timeout)?;
        Ok(conn)
    }
}

/// Per-connection setup: busy timeout, pragmas, WAL journal, scalar functions.
pub(crate) fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA trusted_schema = ON;")?;
    // In-memory databases report "memory" and cannot switch to WAL.
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    tracing::debug!(journal_mode = %mode, "sqlite connection configured");
    register_functions(conn)
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = rusqlite::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let manager = self.clone();
        async move {
            let conn = tokio::task::spawn_blocking(move || manager.open_blocking())
                .await
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))??;
            Ok(Arc::new(Mutex::new(conn)))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let conn = Arc::clone(conn);
        async move {
            let guard = conn.lock().await;
            guard.execute_batch("SELECT 1")
        }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
