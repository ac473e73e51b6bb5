//! Background job scheduler.
//!
//! Registers one refresh job per ranking category, each on the cron cadence
//! the catalogue gives that category.

mod refresh;

use std::sync::Arc;

use pulse_core::{Catalog, RankingCategory};
use pulse_engine::Orchestrator;
use sqlx::PgPool;
use tokio::sync::watch;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

pub(crate) use refresh::run_refresh;

/// Builds and starts the background job scheduler.
///
/// Categories that no enabled provider feeds get no job. Returns the
/// running [`JobScheduler`] handle, which must be kept alive for the
/// lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a cadence is not a valid cron expression, or the scheduler fails to
/// start.
pub async fn build_scheduler(
    pool: PgPool,
    orchestrator: Arc<Orchestrator>,
    catalog: &Catalog,
    shutdown: watch::Receiver<bool>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    for category in RankingCategory::ALL {
        if orchestrator.registry().for_category(category).is_empty() {
            tracing::warn!(%category, "scheduler: no enabled provider; category not scheduled");
            continue;
        }
        let cadence = catalog.cadence(category);
        register_refresh_job(
            &scheduler,
            &cadence,
            category,
            pool.clone(),
            Arc::clone(&orchestrator),
            shutdown.clone(),
        )
        .await?;
        tracing::info!(%category, cadence = %cadence, "scheduler: refresh job registered");
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_refresh_job(
    scheduler: &JobScheduler,
    cadence: &str,
    category: RankingCategory,
    pool: PgPool,
    orchestrator: Arc<Orchestrator>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async(cadence, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let orchestrator = Arc::clone(&orchestrator);
        let shutdown = shutdown.clone();

        Box::pin(async move {
            let stopping = *shutdown.borrow();
            if stopping {
                return;
            }
            tracing::info!(%category, "scheduler: starting refresh");
            run_refresh(&pool, &orchestrator, category, "scheduler", &shutdown).await;
            tracing::info!(%category, "scheduler: refresh finished");
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
