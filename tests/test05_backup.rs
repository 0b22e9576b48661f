use std::time::Duration;

use sqlite_pool_exec::prelude::*;
use sqlite_pool_exec::test_utils::migrate;
use sqlite_pool_exec::{BackupOptions, backup_database, backup_database_with};
use tempfile::tempdir;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backup_copies_a_live_database() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let source = dir.path().join("source.db");
    let dest = dir.path().join("copy.db");

    let pool = DbPool::open(PoolOptions::new(source.to_string_lossy(), 2)).await?;
    migrate(
        &pool,
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);
         WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 2000)
         INSERT INTO notes (body) SELECT printf('note %d with some padding text', x) FROM c;",
    )
    .await?;

    // The pool stays open while the copy runs.
    let (src, dst) = (source.clone(), dest.clone());
    tokio::task::spawn_blocking(move || backup_database(&src, &dst)).await??;

    let copy = DbPool::open(PoolOptions::new(dest.to_string_lossy(), 1)).await?;
    let mut count = 0;
    execute(
        &copy,
        &ExecContext::background(),
        &["SELECT COUNT(*) AS n FROM notes"],
        &[NamedParams::new()],
        Some(&mut |_: usize, row: Row| count = row.get("n").and_then(RowValues::as_int).copied().unwrap_or(0)),
    )
    .await?;
    assert_eq!(count, 2000);

    copy.close().await?;
    pool.close().await?;
    Ok(())
}

#[test]
fn backup_with_custom_step_size() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let source = dir.path().join("source.db");
    let dest = dir.path().join("copy.db");
    {
        let conn = rusqlite::Connection::open(&source)?;
        conn.execute_batch("CREATE TABLE t (v BLOB); INSERT INTO t (v) VALUES (zeroblob(100000));")?;
    }

    backup_database_with(
        &source,
        &dest,
        BackupOptions {
            pages_per_step: 1,
            retry_delay: Duration::from_millis(10),
        },
    )?;

    let conn = rusqlite::Connection::open(&dest)?;
    let len: i64 = conn.query_row("SELECT length(v) FROM t", [], |r| r.get(0))?;
    assert_eq!(len, 100_000);
    Ok(())
}

#[test]
fn missing_source_is_an_open_error() {
    let dir = tempdir().expect("tempdir");
    let source = dir.path().join("does-not-exist.db");
    let err = backup_database(&source, dir.path().join("copy.db")).unwrap_err();
    match err {
        PoolExecError::BackupOpen { path, .. } => assert_eq!(path, source),
        other => panic!("expected open error, got {other:?}"),
    }
}
