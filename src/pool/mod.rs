//! Connection pool lifecycle.
//!
//! A [`DbPool`] owns at most one bb8 pool at a time. Lifecycle calls (`init`, `close`,
//! `reset`, `inject`) serialize on one lock; checkouts only take that lock long enough to
//! clone the pool handle, so any number of leases can be acquired concurrently.

mod config;
mod functions;
mod lease;
mod manager;

use std::fmt;

use bb8::{Pool, RunError};
use tokio::sync::Mutex;

pub use config::{PoolOptions, PoolOptionsBuilder};
pub use lease::Lease;
pub(crate) use lease::join;
pub use manager::{SharedSqliteConnection, SqliteManager};

use crate::context::ExecContext;
use crate::error::PoolExecError;

/// Connection counts reported by [`DbPool::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub connections: u32,
    pub idle: u32,
}

struct PoolState {
    pool: Pool<SqliteManager>,
    /// `None` for an injected pool.
    options: Option<PoolOptions>,
}

/// Explicitly owned handle to a `SQLite` connection pool.
///
/// ```rust,no_run
/// use sqlite_pool_exec::prelude::*;
///
/// # async fn demo() -> Result<(), PoolExecError> {
/// let pool = DbPool::new();
/// pool.init("app.db", 4).await?;
/// let lease = pool.acquire(&ExecContext::background()).await?;
/// drop(lease);
/// pool.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct DbPool {
    state: Mutex<Option<PoolState>>,
}

impl DbPool {
    /// An empty handle; call [`DbPool::init`] before use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct and initialize in one step.
    ///
    /// # Errors
    /// Returns `PoolExecError` if the options are invalid or any connection fails to open.
    pub async fn open(options: PoolOptions) -> Result<Self, PoolExecError> {
        let pool = Self::new();
        pool.init_with(options).await?;
        Ok(pool)
    }

    /// Open `capacity` connections against `target` with default timeouts.
    ///
    /// A no-op when a pool is already active, even if `target` or `capacity` differ.
    ///
    /// # Errors
    /// Returns `PoolExecError::Init` if any connection fails to open or configure, or
    /// `PoolExecError::Config` for a zero capacity.
    pub async fn init(&self, target: impl Into<String>, capacity: u32) -> Result<(), PoolExecError> {
        self.init_with(PoolOptions::new(target, capacity)).await
    }

    /// Like [`DbPool::init`] with explicit options.
    ///
    /// # Errors
    /// See [`DbPool::init`].
    pub async fn init_with(&self, options: PoolOptions) -> Result<(), PoolExecError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            tracing::debug!(db = %options.target, "pool already initialized; init is a no-op");
            return Ok(());
        }
        *state = Some(open_state(options).await?);
        Ok(())
    }

    /// Wait for a free connection.
    ///
    /// The wait ends early when `ctx` is cancelled or its deadline passes; in both cases no
    /// connection is touched.
    ///
    /// # Errors
    /// `PoolNotInitialized`, `Cancelled`, `DeadlineExceeded`, `AcquireTimeout`, or `Acquire`
    /// when the pool could not produce a connection.
    pub async fn acquire(&self, ctx: &ExecContext) -> Result<Lease, PoolExecError> {
        if ctx.is_cancelled() {
            return Err(PoolExecError::Cancelled);
        }
        if ctx.is_expired() {
            return Err(PoolExecError::DeadlineExceeded);
        }
        // A slow init or reset holds the lifecycle lock; the context bounds that wait too.
        let pool = tokio::select! {
            biased;
            () = ctx.token().cancelled() => return Err(PoolExecError::Cancelled),
            () = ctx.expired() => return Err(PoolExecError::DeadlineExceeded),
            state = self.state.lock() => state
                .as_ref()
                .map(|s| s.pool.clone())
                .ok_or(PoolExecError::PoolNotInitialized)?,
        };

        tokio::select! {
            biased;
            () = ctx.token().cancelled() => Err(PoolExecError::Cancelled),
            () = ctx.expired() => Err(PoolExecError::DeadlineExceeded),
            checkout = pool.get_owned() => match checkout {
                Ok(conn) => {
                    tracing::trace!("connection checked out");
                    Ok(Lease::new(conn))
                }
                Err(RunError::User(e)) => Err(PoolExecError::Acquire(e)),
                Err(RunError::TimedOut) => Err(PoolExecError::AcquireTimeout),
            },
        }
    }

    /// Drop the active pool. Connections still leased close when their leases drop.
    ///
    /// Callers must not close with operations outstanding. A [`DbPool::acquire`] already
    /// waiting for a connection holds its own handle to the old pool and can still be handed a
    /// connection after `close` returns.
    ///
    /// # Errors
    /// Returns `PoolExecError::PoolNotInitialized` if there is no active pool.
    pub async fn close(&self) -> Result<(), PoolExecError> {
        let mut state = self.state.lock().await;
        let Some(old) = state.take() else {
            return Err(PoolExecError::PoolNotInitialized);
        };
        tracing::info!(db = %old.target(), "sqlite pool closed");
        drop(old);
        Ok(())
    }

    /// Close the active pool and reopen the same target with a new capacity.
    ///
    /// # Errors
    /// `PoolNotInitialized` without an active pool; `Config` for an injected pool (no target
    /// recorded) or a zero capacity, in which case the current pool is kept; `Init` if the
    /// reopen fails, in which case no pool is left active.
    pub async fn reset(&self, capacity: u32) -> Result<(), PoolExecError> {
        let mut state = self.state.lock().await;
        let Some(current) = state.as_ref() else {
            return Err(PoolExecError::PoolNotInitialized);
        };
        let Some(options) = current.options.clone() else {
            return Err(PoolExecError::Config(
                "cannot reset an injected pool: no target recorded".into(),
            ));
        };
        let options = PoolOptions { capacity, ..options };
        options.validate()?;

        *state = None;
        tracing::info!(db = %options.target, capacity, "resetting sqlite pool");
        *state = Some(open_state(options).await?);
        Ok(())
    }

    /// Replace the active pool (closing it first) with a caller-built one.
    ///
    /// The recorded target becomes empty, so [`DbPool::reset`] is unavailable afterwards.
    pub async fn inject(&self, pool: Pool<SqliteManager>) {
        let mut state = self.state.lock().await;
        if let Some(old) = state.take() {
            tracing::info!(db = %old.target(), "replacing sqlite pool with injected pool");
        }
        *state = Some(PoolState {
            pool,
            options: None,
        });
    }

    /// Target recorded at initialization; empty when uninitialized or injected.
    pub async fn current_target(&self) -> String {
        let state = self.state.lock().await;
        state
            .as_ref()
            .map(|s| s.target().to_owned())
            .unwrap_or_default()
    }

    /// Capacity recorded at initialization; `None` when uninitialized or injected.
    pub async fn capacity(&self) -> Option<u32> {
        let state = self.state.lock().await;
        state
            .as_ref()
            .and_then(|s| s.options.as_ref())
            .map(|o| o.capacity)
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// # Errors
    /// Returns `PoolExecError::PoolNotInitialized` if there is no active pool.
    pub async fn status(&self) -> Result<PoolStatus, PoolExecError> {
        let state = self.state.lock().await;
        let current = state.as_ref().ok_or(PoolExecError::PoolNotInitialized)?;
        let pool_state = current.pool.state();
        Ok(PoolStatus {
            connections: pool_state.connections,
            idle: pool_state.idle_connections,
        })
    }
}

impl fmt::Debug for DbPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbPool").finish_non_exhaustive()
    }
}

impl PoolState {
    fn target(&self) -> &str {
        self.options.as_ref().map_or("", |o| o.target.as_str())
    }
}

async fn open_state(options: PoolOptions) -> Result<PoolState, PoolExecError> {
    options.validate()?;
    let pool = SqliteManager::from_options(&options)
        .build_pool(&options)
        .await?;
    tracing::info!(db = %options.target, capacity = options.capacity, "sqlite pool initialized");
    Ok(PoolState {
        pool,
        options: Some(options),
    })
}
