use std::process::ExitCode;

use clap::Parser;
use sqlite_pool_exec::prelude::*;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a SQL script against a pooled SQLite database")]
struct Args {
    /// Path to the SQLite database file
    #[arg(long, default_value = "sqlite.db")]
    db_path: String,
    /// Number of connections in the pool
    #[arg(long, default_value_t = 4)]
    pool_size: u32,
    /// SQL to execute; statements are separated by ";\n"
    #[arg(long)]
    query: String,
    #[arg(long, default_value = "warn")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(args.log_level)
        .init();

    let pool = DbPool::new();
    if let Err(err) = pool.init(args.db_path.as_str(), args.pool_size).await {
        eprintln!("Failed to initialize database pool: {err}");
        return ExitCode::FAILURE;
    }

    let ctx = ExecContext::background();
    let mut print_row = |index: usize, row: Row| {
        let rendered = serde_json::to_string(&row).unwrap_or_else(|_| format!("{:?}", row.values()));
        println!("Result {index}: {rendered}");
    };
    let result = execute_script(&pool, &ctx, &args.query, &NamedParams::new(), Some(&mut print_row)).await;

    if let Err(err) = pool.close().await {
        eprintln!("Failed to close database pool: {err}");
    }

    match result {
        Ok(()) => {
            println!("Query executed successfully");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Failed to execute query: {err}");
            ExitCode::FAILURE
        }
    }
}
