//! Database operations for `refresh_runs` and `refresh_run_providers`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `refresh_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub category: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub signal_count: i32,
    pub groups_published: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `refresh_run_providers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshRunProviderRow {
    pub id: i64,
    pub refresh_run_id: i64,
    pub provider: String,
    pub status: String,
    pub signal_count: i32,
    pub retryable: bool,
    pub error_message: Option<String>,
    pub elapsed_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// One provider's outcome within a run.
#[derive(Debug, Clone, Copy)]
pub struct NewRunProvider<'a> {
    pub provider: &'a str,
    /// `succeeded`, `failed`, `timed_out` or `skipped`.
    pub status: &'a str,
    pub signal_count: i32,
    pub retryable: bool,
    pub error_message: Option<&'a str>,
    pub elapsed_ms: i64,
}

const RUN_COLUMNS: &str = "id, public_id, category, trigger_source, status, started_at, \
     completed_at, signal_count, groups_published, error_message, created_at";

// ---------------------------------------------------------------------------
// refresh_runs operations
// ---------------------------------------------------------------------------

/// Creates a new refresh run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_refresh_run(
    pool: &PgPool,
    category: &str,
    trigger_source: &str,
) -> Result<RefreshRunRow, DbError> {
    let row = sqlx::query_as::<_, RefreshRunRow>(&format!(
        "INSERT INTO refresh_runs (public_id, category, trigger_source, status) \
         VALUES ($1, $2, $3, 'queued') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(category)
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRefreshRunTransition`] if the run is not
/// `queued`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_refresh_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE refresh_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRefreshRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` and records its totals.
///
/// # Errors
///
/// Returns [`DbError::InvalidRefreshRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_refresh_run(
    pool: &PgPool,
    id: i64,
    signal_count: i32,
    groups_published: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE refresh_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             signal_count = $1, groups_published = $2 \
         WHERE id = $3 AND status = 'running'",
    )
    .bind(signal_count)
    .bind(groups_published)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRefreshRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed`. Groups published before the failure are kept.
///
/// A `queued` run that never managed to start may also be failed.
///
/// # Errors
///
/// Returns [`DbError::InvalidRefreshRunTransition`] if the run is already
/// finished, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_refresh_run(
    pool: &PgPool,
    id: i64,
    error_message: &str,
    signal_count: i32,
    groups_published: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE refresh_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1, \
             signal_count = $2, groups_published = $3 \
         WHERE id = $4 AND status IN ('queued', 'running')",
    )
    .bind(error_message)
    .bind(signal_count)
    .bind(groups_published)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRefreshRunTransition {
            id,
            expected_status: "queued or running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_refresh_run(pool: &PgPool, id: i64) -> Result<RefreshRunRow, DbError> {
    sqlx::query_as::<_, RefreshRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM refresh_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Fetches a single run by its public UUID.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has the given `public_id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_refresh_run_by_public_id(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<RefreshRunRow, DbError> {
    sqlx::query_as::<_, RefreshRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM refresh_runs WHERE public_id = $1"
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first, optionally for one
/// category.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_refresh_runs(
    pool: &PgPool,
    category: Option<&str>,
    limit: i64,
) -> Result<Vec<RefreshRunRow>, DbError> {
    let rows = sqlx::query_as::<_, RefreshRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM refresh_runs \
         WHERE ($1::TEXT IS NULL OR category = $1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(category)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// refresh_run_providers operations
// ---------------------------------------------------------------------------

/// Records a provider's outcome for a run, replacing any earlier record
/// for the same provider.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_refresh_run_provider(
    pool: &PgPool,
    refresh_run_id: i64,
    outcome: &NewRunProvider<'_>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO refresh_run_providers \
             (refresh_run_id, provider, status, signal_count, retryable, error_message, elapsed_ms) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (refresh_run_id, provider) DO UPDATE \
           SET status = EXCLUDED.status, \
               signal_count = EXCLUDED.signal_count, \
               retryable = EXCLUDED.retryable, \
               error_message = EXCLUDED.error_message, \
               elapsed_ms = EXCLUDED.elapsed_ms",
    )
    .bind(refresh_run_id)
    .bind(outcome.provider)
    .bind(outcome.status)
    .bind(outcome.signal_count)
    .bind(outcome.retryable)
    .bind(outcome.error_message)
    .bind(outcome.elapsed_ms)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns every provider record for a run, ordered by provider id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_refresh_run_providers(
    pool: &PgPool,
    refresh_run_id: i64,
) -> Result<Vec<RefreshRunProviderRow>, DbError> {
    let rows = sqlx::query_as::<_, RefreshRunProviderRow>(
        "SELECT id, refresh_run_id, provider, status, signal_count, retryable, \
                error_message, elapsed_ms, created_at \
         FROM refresh_run_providers \
         WHERE refresh_run_id = $1 \
         ORDER BY provider",
    )
    .bind(refresh_run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
