use std::time::Duration;

use crate::error::PoolExecError;

use super::DbPool;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for configuring a `SQLite` pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Filesystem path or `file:` URI (e.g. `file:name?mode=memory&cache=shared`).
    pub target: String,
    /// Number of connections opened up front. Fixed for the life of the pool.
    pub capacity: u32,
    /// How long a connection waits on a locked database before reporting `SQLITE_BUSY`.
    pub busy_timeout: Duration,
    /// Upper bound on waiting for a free connection when the caller sets no deadline.
    pub acquire_timeout: Duration,
}

impl PoolOptions {
    #[must_use]
    pub fn new(target: impl Into<String>, capacity: u32) -> Self {
        Self {
            target: target.into(),
            capacity,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), PoolExecError> {
        if self.capacity == 0 {
            return Err(PoolExecError::Config(
                "pool capacity must be greater than zero".into(),
            ));
        }
        if self.acquire_timeout.is_zero() {
            return Err(PoolExecError::Config(
                "acquire timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`PoolOptions`].
#[derive(Debug, Clone)]
pub struct PoolOptionsBuilder {
    opts: PoolOptions,
}

impl PoolOptionsBuilder {
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            opts: PoolOptions::new(target, 4),
        }
    }

    #[must_use]
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.opts.capacity = capacity;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.opts.acquire_timeout = acquire_timeout;
        self
    }

    #[must_use]
    pub fn finish(self) -> PoolOptions {
        self.opts
    }

    /// Open a [`DbPool`] with these options.
    ///
    /// # Errors
    ///
    /// Returns `PoolExecError` if the options are invalid or any connection fails to open.
    pub async fn build(self) -> Result<DbPool, PoolExecError> {
        DbPool::open(self.finish()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_overrides() {
        let opts = PoolOptionsBuilder::new("app.db")
            .capacity(8)
            .busy_timeout(Duration::from_millis(250))
            .finish();
        assert_eq!(opts.target, "app.db");
        assert_eq!(opts.capacity, 8);
        assert_eq!(opts.busy_timeout, Duration::from_millis(250));
        assert_eq!(opts.acquire_timeout, DEFAULT_ACQUIRE_TIMEOUT);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = PoolOptions::new("app.db", 0).validate().unwrap_err();
        assert!(matches!(err, PoolExecError::Config(_)));
    }
}
