//! Scope guard for an explicit transaction on a locked connection.

use std::thread;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode};

use crate::error::PoolExecError;

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

/// Open transaction that rolls back on drop unless [`TxGuard::commit`] succeeds.
pub(crate) struct TxGuard<'c> {
    conn: &'c Connection,
    finished: bool,
}

impl<'c> TxGuard<'c> {
    pub(crate) fn begin(conn: &'c Connection) -> Result<Self, PoolExecError> {
        conn.execute_batch("BEGIN")
            .map_err(PoolExecError::TransactionBegin)?;
        tracing::trace!("transaction begun");
        Ok(Self {
            conn,
            finished: false,
        })
    }

    pub(crate) fn conn(&self) -> &'c Connection {
        self.conn
    }

    /// Commit. On failure the guard still rolls back when it drops.
    pub(crate) fn commit(mut self) -> Result<(), PoolExecError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(PoolExecError::TransactionCommit)?;
        self.finished = true;
        tracing::trace!("transaction committed");
        Ok(())
    }
}

impl Drop for TxGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // The engine already rolled back (e.g. after SQLITE_FULL or an interrupted COMMIT).
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(e) = rollback_with_busy_retries(self.conn) {
            tracing::warn!(error = %e, "transaction rollback failed");
        }
    }
}

fn rollback_with_busy_retries(conn: &Connection) -> rusqlite::Result<()> {
    for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
        match conn.execute_batch("ROLLBACK") {
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::DatabaseBusy && idx + 1 < ROLLBACK_BUSY_RETRIES.len() =>
            {
                thread::sleep(delay);
            }
            result => return result,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .expect("schema");
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .expect("count")
    }

    #[test]
    fn drop_without_commit_rolls_back() {
        let conn = setup();
        {
            let tx = TxGuard::begin(&conn).expect("begin");
            tx.conn().execute("INSERT INTO t (id) VALUES (1)", []).expect("insert");
        }
        assert!(conn.is_autocommit());
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn commit_persists() {
        let conn = setup();
        let tx = TxGuard::begin(&conn).expect("begin");
        tx.conn().execute("INSERT INTO t (id) VALUES (1)", []).expect("insert");
        tx.commit().expect("commit");
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn nested_begin_is_a_begin_error() {
        let conn = setup();
        let _outer = TxGuard::begin(&conn).expect("begin");
        let err = TxGuard::begin(&conn).err().expect("nested begin must fail");
        assert!(matches!(err, PoolExecError::TransactionBegin(_)));
    }
}
