//! Completion Repository
//!
//! Records the order in which workers finished.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Record that the worker with `ordinal` finished
pub async fn record(
    pool: &SqlitePool,
    run_id: Uuid,
    ordinal: u32,
    completed_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO completions (run_id, ordinal, completed_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(run_id.to_string())
    .bind(ordinal)
    .bind(completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the recorded worker ordinals of a run
pub async fn ordinals_by_run(pool: &SqlitePool, run_id: Uuid) -> Result<Vec<u32>, sqlx::Error> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT ordinal FROM completions WHERE run_id = ? ORDER BY ordinal ASC")
            .bind(run_id.to_string())
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(o,)| o as u32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn test_record_completions() {
        let pool = db::memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let run_id = Uuid::new_v4();

        record(&pool, run_id, 2, Utc::now()).await.unwrap();
        record(&pool, run_id, 1, Utc::now()).await.unwrap();

        assert_eq!(ordinals_by_run(&pool, run_id).await.unwrap(), vec![1, 2]);
        // the same ordinal cannot be recorded twice
        assert!(record(&pool, run_id, 1, Utc::now()).await.is_err());
    }
}
