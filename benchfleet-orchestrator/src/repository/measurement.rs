//! Measurement Repository
//!
//! Stores every measurement received from the runners together with the
//! setup it was taken under.

use benchfleet_core::domain::{Benchmark, Measurement, Setup};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Insert all measurements carried by `bench`
///
/// # Returns
/// The number of rows written
pub async fn insert_all(
    pool: &SqlitePool,
    run_id: Uuid,
    bench: &Benchmark,
    setup: &Setup,
) -> Result<u64, sqlx::Error> {
    if bench.measurements.is_empty() {
        return Ok(0);
    }

    let received_at = chrono::Utc::now();
    let run_id = run_id.to_string();
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for m in &bench.measurements {
        let result = sqlx::query(
            r#"
            INSERT INTO measurements (
                run_id, name, package, iterations, ns_per_op,
                duration_slot, iteration_index, suite_run_index, repetition_index,
                revision_tag, setup_bed, setup_iterations, setup_suite_runs,
                setup_workers, received_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run_id)
        .bind(&bench.name)
        .bind(&bench.package)
        .bind(m.iterations as i64)
        .bind(m.ns_per_op)
        .bind(m.duration_slot)
        .bind(m.iteration_index)
        .bind(m.suite_run_index)
        .bind(m.repetition_index)
        .bind(&m.revision_tag)
        .bind(setup.duration_per_job)
        .bind(setup.iterations)
        .bind(setup.suite_runs)
        .bind(setup.worker_count)
        .bind(received_at)
        .execute(&mut *tx)
        .await?;

        written += result.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// Get the measurements of one benchmark in insertion order
pub async fn find_by_benchmark(
    pool: &SqlitePool,
    run_id: Uuid,
    name: &str,
    package: &str,
) -> Result<Vec<Measurement>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MeasurementRow>(
        r#"
        SELECT iterations, ns_per_op, duration_slot, iteration_index,
               suite_run_index, repetition_index, revision_tag
        FROM measurements
        WHERE run_id = ? AND name = ? AND package = ?
        ORDER BY id ASC
        "#,
    )
    .bind(run_id.to_string())
    .bind(name)
    .bind(package)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Get measurement count for a run
pub async fn count_by_run(pool: &SqlitePool, run_id: Uuid) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM measurements WHERE run_id = ?")
        .bind(run_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

#[derive(sqlx::FromRow)]
struct MeasurementRow {
    iterations: i64,
    ns_per_op: f64,
    duration_slot: i64,
    iteration_index: i64,
    suite_run_index: i64,
    repetition_index: i64,
    revision_tag: String,
}

impl From<MeasurementRow> for Measurement {
    fn from(row: MeasurementRow) -> Self {
        Measurement {
            iterations: row.iterations.max(0) as u64,
            ns_per_op: row.ns_per_op,
            duration_slot: row.duration_slot as u32,
            iteration_index: row.iteration_index as u32,
            suite_run_index: row.suite_run_index as u32,
            repetition_index: row.repetition_index as u32,
            revision_tag: row.revision_tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::path::Path;

    fn measurement(slot: u32, tag: &str) -> Measurement {
        Measurement {
            iterations: 1000,
            ns_per_op: 12.5,
            duration_slot: slot,
            iteration_index: 1,
            suite_run_index: 1,
            repetition_index: 1,
            revision_tag: tag.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let pool = db::memory_pool().await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let run_id = Uuid::new_v4();
        let setup = Setup {
            duration_per_job: 2,
            iterations: 1,
            suite_runs: 1,
            worker_count: 1,
        };
        let mut bench = Benchmark::new("BenchmarkSort", "example.com/sort", Path::new(""));
        bench.measurements = vec![measurement(1, "v1"), measurement(2, "v2")];

        let written = insert_all(&pool, run_id, &bench, &setup).await.unwrap();
        assert_eq!(written, 2);

        let stored = find_by_benchmark(&pool, run_id, "BenchmarkSort", "example.com/sort")
            .await
            .unwrap();
        assert_eq!(stored, bench.measurements);
        assert_eq!(count_by_run(&pool, run_id).await.unwrap(), 2);
        assert_eq!(count_by_run(&pool, Uuid::new_v4()).await.unwrap(), 0);
    }
}
