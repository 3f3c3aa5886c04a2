//! Experiment context
//!
//! State shared by the main sequence and every connection handler: the
//! current setup, the central catalog, the completion counter with its
//! barrier and the database handle.

use benchfleet_core::domain::{Benchmark, Catalog, Setup};
use sqlx::SqlitePool;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

use crate::barrier::{CompletionBarrier, Release};
use crate::repository::{completion_repository, measurement_repository};

pub struct ExperimentContext {
    run_id: Uuid,
    setup: Mutex<Setup>,
    catalog: Mutex<Catalog>,
    completions: Mutex<u32>,
    barrier: CompletionBarrier,
    pool: SqlitePool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ExperimentContext {
    pub fn new(pool: SqlitePool, catalog: Catalog) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            setup: Mutex::new(Setup::default()),
            catalog: Mutex::new(catalog),
            completions: Mutex::new(0),
            barrier: CompletionBarrier::new(),
            pool,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Installs the setup of the experiment and resets the completion counter
    pub fn begin(&self, setup: Setup) {
        *lock(&self.setup) = setup;
        *lock(&self.completions) = 0;
        info!("Experiment {} started with setup {}", self.run_id, setup);
    }

    pub fn setup(&self) -> Setup {
        *lock(&self.setup)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn barrier(&self) -> &CompletionBarrier {
        &self.barrier
    }

    /// The job list as handed to runners
    pub fn catalog_snapshot(&self) -> Vec<Benchmark> {
        lock(&self.catalog).without_measurements()
    }

    pub fn measurement_count(&self) -> usize {
        lock(&self.catalog).measurement_count()
    }

    /// Persists a result update and merges it into the central catalog
    ///
    /// # Returns
    /// The number of measurements merged
    pub async fn ingest(&self, update: Benchmark) -> Result<usize, sqlx::Error> {
        let setup = self.setup();
        measurement_repository::insert_all(&self.pool, self.run_id, &update, &setup).await?;

        let name = update.name.clone();
        let merged = lock(&self.catalog).merge(update);
        debug!("Merged {} measurements for {}", merged, name);
        Ok(merged)
    }

    /// Handles a completion sentinel
    ///
    /// # Returns
    /// The ordinal of the finished worker
    pub async fn complete_worker(&self) -> Result<u32, sqlx::Error> {
        let ordinal = {
            let mut completions = lock(&self.completions);
            *completions += 1;
            *completions
        };

        match self.barrier.release() {
            Release::Counted(n) => {
                let (_, expected) = self.barrier.progress();
                info!("Worker {} finished ({} of {} done)", ordinal, n, expected);
            }
            Release::Ignored => info!("Worker {} finished after the barrier opened", ordinal),
        }

        completion_repository::record(&self.pool, self.run_id, ordinal, chrono::Utc::now())
            .await?;
        Ok(ordinal)
    }
}
