use std::sync::Arc;
use std::time::Duration;

use sqlite_pool_exec::prelude::*;
use sqlite_pool_exec::test_utils::{memory_pool, migrate};
use tempfile::tempdir;

const MIGRATION: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL
    );
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        product TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        FOREIGN KEY(user_id) REFERENCES users(id)
    );
    INSERT INTO users (name, email) VALUES ('Initial User', 'initial@example.com');
";

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

async fn file_pool(prefix: &str, capacity: u32) -> Result<Arc<DbPool>, PoolExecError> {
    let pool = PoolOptionsBuilder::new(unique_db_path(prefix))
        .capacity(capacity)
        .busy_timeout(Duration::from_secs(10))
        .build()
        .await?;
    migrate(&pool, MIGRATION).await?;
    Ok(Arc::new(pool))
}

async fn scalar(pool: &DbPool, sql: &str, params: NamedParams) -> Result<i64, PoolExecError> {
    let mut value = None;
    execute(
        pool,
        &ExecContext::background(),
        &[sql],
        &[params],
        Some(&mut |_: usize, row: Row| value = row.get_by_index(0).and_then(RowValues::as_int).copied()),
    )
    .await?;
    Ok(value.unwrap_or_default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_autocommit_and_transactional_calls() -> Result<(), Box<dyn std::error::Error>> {
    let pool = file_pool("mixed", 4).await?;

    let insert_user = "INSERT INTO users (name, email) VALUES ($name, $email);";
    let insert_order = "INSERT INTO orders (user_id, product, quantity) VALUES ($user_id, $product, $quantity);";

    let mut handles = Vec::new();
    for i in 1..=2 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let params = NamedParams::new()
                .with("$name", format!("Concurrent User {i}"))
                .with("$email", format!("concurrent{i}@example.com"));
            execute(&pool, &ExecContext::background(), &[insert_user], &[params], None)
                .await
                .map(|()| true)
        }));
    }
    {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let params = NamedParams::new()
                .with("$user_id", 1_i64)
                .with("$product", "Concurrent Product")
                .with("$quantity", 10_i64);
            execute_transactional(&pool, &ExecContext::background(), &[insert_order], &[params], None)
                .await
                .map(|()| true)
        }));
    }
    let failing = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            execute_transactional(
                &pool,
                &ExecContext::background(),
                &[insert_user, insert_order],
                &[
                    NamedParams::new()
                        .with("$name", "Concurrent User 3")
                        .with("$email", "concurrent3@example.com"),
                    NamedParams::new()
                        .with("$user_id", 999_i64)
                        .with("$product", "Invalid Order")
                        .with("$quantity", 5_i64),
                ],
                None,
            )
            .await
        })
    };

    for handle in handles {
        assert!(handle.await??);
    }
    let err = failing.await?.unwrap_err();
    assert_eq!(err.statement_index(), Some(2));

    for i in 1..=2 {
        let n = scalar(
            &pool,
            "SELECT COUNT(1) FROM users WHERE email = $email",
            NamedParams::new().with("$email", format!("concurrent{i}@example.com")),
        )
        .await?;
        assert_eq!(n, 1, "Concurrent User {i} should exist");
    }
    let ghost = scalar(
        &pool,
        "SELECT COUNT(1) FROM users WHERE email = $email",
        NamedParams::new().with("$email", "concurrent3@example.com"),
    )
    .await?;
    assert_eq!(ghost, 0);
    let orders = scalar(&pool, "SELECT COUNT(1) FROM orders", NamedParams::new()).await?;
    assert_eq!(orders, 1);

    pool.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_inserts_all_land() -> Result<(), Box<dyn std::error::Error>> {
    let pool = file_pool("many", 4).await?;

    let mut handles = Vec::new();
    for i in 0..64 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let params = NamedParams::new()
                .with("$name", format!("user-{i}"))
                .with("$email", format!("user-{i}@example.com"));
            let statements = ["INSERT INTO users (name, email) VALUES ($name, $email)"];
            if i % 2 == 0 {
                execute(&pool, &ExecContext::background(), &statements, &[params], None).await
            } else {
                execute_transactional(&pool, &ExecContext::background(), &statements, &[params], None)
                    .await
            }
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let total = scalar(&pool, "SELECT COUNT(*) FROM users", NamedParams::new()).await?;
    assert_eq!(total, 65);
    assert_eq!(pool.status().await?.idle, 4);
    pool.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiters_proceed_as_leases_free_up() -> Result<(), Box<dyn std::error::Error>> {
    let pool = file_pool("waiters", 1).await?;
    let held = pool.acquire(&ExecContext::background()).await?;

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            scalar(&pool, "SELECT COUNT(*) FROM users", NamedParams::new()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    drop(held);
    assert_eq!(waiter.await??, 1);
    pool.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_cache_memory_pool_waits_for_table_locks() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(memory_pool("CREATE TABLE nums (n INTEGER NOT NULL);", 4).await?);

    let mut handles = Vec::new();
    for i in 0..16_i64 {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let ctx = ExecContext::background();
            if i % 2 == 0 {
                execute_transactional(
                    &pool,
                    &ctx,
                    &["WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 500) \
                       INSERT INTO nums (n) SELECT x + $base FROM c"],
                    &[NamedParams::new().with("$base", i * 1000)],
                    None,
                )
                .await
            } else {
                let mut rows = 0_usize;
                execute(
                    &pool,
                    &ctx,
                    &["SELECT n FROM nums"],
                    &[NamedParams::new()],
                    Some(&mut |_: usize, _: Row| rows += 1),
                )
                .await
                .map(|()| assert_eq!(rows % 500, 0))
            }
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let total = scalar(&pool, "SELECT COUNT(*) FROM nums", NamedParams::new()).await?;
    assert_eq!(total, 8 * 500);
    pool.close().await?;
    Ok(())
}
