use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

pub async fn create_pool(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

/// Single-connection in-memory database; every connection would otherwise
/// see its own empty database
#[cfg(test)]
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
}

/// Drops every table owned by the orchestrator
pub async fn clean(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("DROP TABLE IF EXISTS measurements")
        .execute(pool)
        .await?;

    sqlx::query("DROP TABLE IF EXISTS completions")
        .execute(pool)
        .await?;

    tracing::info!("Dropped benchmark tables");
    Ok(())
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // One row per measurement, with the setup it was taken under
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measurements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            name TEXT NOT NULL,
            package TEXT NOT NULL,
            iterations INTEGER NOT NULL,
            ns_per_op REAL NOT NULL,
            duration_slot INTEGER NOT NULL,
            iteration_index INTEGER NOT NULL,
            suite_run_index INTEGER NOT NULL,
            repetition_index INTEGER NOT NULL,
            revision_tag TEXT NOT NULL,
            setup_bed INTEGER NOT NULL,
            setup_iterations INTEGER NOT NULL,
            setup_suite_runs INTEGER NOT NULL,
            setup_workers INTEGER NOT NULL,
            received_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS completions (
            run_id TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            completed_at TEXT NOT NULL,
            PRIMARY KEY (run_id, ordinal)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_measurements_run ON measurements(run_id, name, package)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
