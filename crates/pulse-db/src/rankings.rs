//! Database operations for `ranking_snapshots` and `ranking_entries`.

use chrono::{DateTime, Utc};
use pulse_core::{Entity, EntityType, Period, RankingCategory, RankingEntry, Trend};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `ranking_entries` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankingEntryRow {
    pub id: i64,
    pub snapshot_id: Uuid,
    pub category: String,
    pub period: String,
    pub entity_type: String,
    pub entity_name: String,
    pub country_code: Option<String>,
    pub parent_name: Option<String>,
    pub rank: i32,
    pub stat: String,
    /// The schema defines this as `NUMERIC(16,4)`.
    pub score: Decimal,
    pub trend: String,
    pub explanation: Option<String>,
    pub snapshot_at: DateTime<Utc>,
}

impl RankingEntryRow {
    /// Decode the row back into the domain type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRow`] if an enum column holds an unknown
    /// value or the rank/score is out of range.
    pub fn into_entry(self) -> Result<RankingEntry, DbError> {
        let invalid = |e: &dyn std::fmt::Display| DbError::InvalidRow(format!("entry {}: {e}", self.id));
        let category = self.category.parse::<RankingCategory>().map_err(|e| invalid(&e))?;
        let period = self.period.parse::<Period>().map_err(|e| invalid(&e))?;
        let entity_type = self.entity_type.parse::<EntityType>().map_err(|e| invalid(&e))?;
        let trend = self.trend.parse::<Trend>().map_err(|e| invalid(&e))?;
        let rank = u32::try_from(self.rank).map_err(|e| invalid(&e))?;
        let score = self
            .score
            .to_f64()
            .ok_or_else(|| invalid(&"score does not fit in f64"))?;

        Ok(RankingEntry {
            category,
            entity: Entity {
                entity_type,
                name: self.entity_name,
                country_code: self.country_code,
                parent: self.parent_name,
            },
            period,
            rank,
            stat: self.stat,
            score,
            trend,
            explanation: self.explanation,
            snapshot_at: self.snapshot_at,
        })
    }
}

/// A row from the `ranking_snapshots` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankingSnapshotRow {
    pub id: Uuid,
    pub category: String,
    pub period: String,
    pub snapshot_at: DateTime<Utc>,
    pub published_at: DateTime<Utc>,
    pub entry_count: i32,
    pub signal_count: i32,
    /// JSON array of provider ids.
    pub providers: Value,
}

/// Everything needed to replace one `(category, period)` snapshot.
#[derive(Debug, Clone, Copy)]
pub struct NewSnapshot<'a> {
    pub category: RankingCategory,
    pub period: Period,
    pub snapshot_at: DateTime<Utc>,
    pub signal_count: usize,
    pub providers: &'a [String],
    pub entries: &'a [RankingEntry],
}

/// Input filters for ranking reads.
///
/// `limit` caps the rank returned within each group, so a limit of 3
/// yields the top three countries, the top three states of each country
/// and so on.
#[derive(Debug, Clone, Copy)]
pub struct RankingFilters<'a> {
    pub category: RankingCategory,
    pub period: Period,
    pub entity_type: Option<&'a str>,
    pub country_code: Option<&'a str>,
    pub parent: Option<&'a str>,
    pub limit: i64,
}

const ENTRY_COLUMNS: &str = "id, snapshot_id, category, period, entity_type, entity_name, \
     country_code, parent_name, rank, stat, score, trend, explanation, snapshot_at";

// Countries before their states before their cities, then root subjects.
// Only states and cities are grouped under a country and parent.
const GROUP_ORDER: &str = "CASE entity_type \
         WHEN 'country' THEN 0 WHEN 'state' THEN 1 WHEN 'city' THEN 2 ELSE 3 END, \
     entity_type, \
     CASE WHEN entity_type IN ('state', 'city') THEN country_code END NULLS FIRST, \
     CASE WHEN entity_type IN ('state', 'city') THEN parent_name END NULLS FIRST, \
     rank";

fn to_decimal(entry: &RankingEntry) -> Result<Decimal, DbError> {
    Decimal::from_f64(entry.score)
        .map(|d| d.round_dp(4))
        .filter(|d| d.abs() < Decimal::from(1_000_000_000_000_i64))
        .ok_or_else(|| DbError::UnrepresentableScore {
            entity: entry.entity.name.clone(),
            score: entry.score,
        })
}

fn to_i32<T>(value: T, what: &str) -> Result<i32, DbError>
where
    T: TryInto<i32> + Copy + std::fmt::Display,
{
    value
        .try_into()
        .map_err(|_| DbError::InvalidRow(format!("{what} {value} exceeds INTEGER")))
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Atomically replace the published snapshot for one `(category, period)`.
///
/// Runs in a single transaction holding an advisory lock on the group:
/// the old snapshot row is deleted (its entries cascade), then the new
/// snapshot row and entries are inserted. Readers see either the old
/// snapshot or the new one. Any failure rolls everything back.
///
/// Returns the new snapshot id.
///
/// # Errors
///
/// Returns [`DbError::UnrepresentableScore`] before touching the database
/// if a score cannot be stored, or [`DbError::Sqlx`] if any statement fails.
pub async fn replace_ranking_snapshot(
    pool: &PgPool,
    snapshot: &NewSnapshot<'_>,
) -> Result<Uuid, DbError> {
    let scores = snapshot
        .entries
        .iter()
        .map(to_decimal)
        .collect::<Result<Vec<_>, _>>()?;
    let ranks = snapshot
        .entries
        .iter()
        .map(|e| to_i32(e.rank, "rank"))
        .collect::<Result<Vec<_>, _>>()?;
    let entry_count = to_i32(snapshot.entries.len(), "entry count")?;
    let signal_count = to_i32(snapshot.signal_count, "signal count")?;
    let category = snapshot.category.as_str();
    let period = snapshot.period.as_str();
    let snapshot_id = Uuid::new_v4();

    let mut tx = pool.begin().await?;

    // Serializes concurrent writers of the same group; released on commit/rollback.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("ranking:{category}:{period}"))
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM ranking_snapshots WHERE category = $1 AND period = $2")
        .bind(category)
        .bind(period)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO ranking_snapshots \
             (id, category, period, snapshot_at, entry_count, signal_count, providers) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(snapshot_id)
    .bind(category)
    .bind(period)
    .bind(snapshot.snapshot_at)
    .bind(entry_count)
    .bind(signal_count)
    .bind(Value::from(snapshot.providers.to_vec()))
    .execute(&mut *tx)
    .await?;

    for ((entry, score), rank) in snapshot.entries.iter().zip(scores).zip(ranks) {
        sqlx::query(
            "INSERT INTO ranking_entries \
                 (snapshot_id, category, period, entity_type, entity_name, country_code, \
                  parent_name, rank, stat, score, trend, explanation, snapshot_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(snapshot_id)
        .bind(entry.category.as_str())
        .bind(entry.period.as_str())
        .bind(entry.entity.entity_type.as_str())
        .bind(&entry.entity.name)
        .bind(entry.entity.country_code.as_deref())
        .bind(entry.entity.parent.as_deref())
        .bind(rank)
        .bind(&entry.stat)
        .bind(score)
        .bind(entry.trend.as_str())
        .bind(entry.explanation.as_deref())
        .bind(entry.snapshot_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(snapshot_id)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Load every entry of the published `(category, period)` snapshot.
///
/// Returns `None` when nothing has been published for the group yet.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// if a stored row cannot be decoded.
pub async fn load_ranking_snapshot(
    pool: &PgPool,
    category: RankingCategory,
    period: Period,
) -> Result<Option<Vec<RankingEntry>>, DbError> {
    let rows = sqlx::query_as::<_, RankingEntryRow>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ranking_entries \
         WHERE category = $1 AND period = $2 \
         ORDER BY {GROUP_ORDER}"
    ))
    .bind(category.as_str())
    .bind(period.as_str())
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Ok(None);
    }
    rows.into_iter()
        .map(RankingEntryRow::into_entry)
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Returns published entries matching `filters`, grouped then by rank.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_rankings(
    pool: &PgPool,
    filters: RankingFilters<'_>,
) -> Result<Vec<RankingEntryRow>, DbError> {
    let rows = sqlx::query_as::<_, RankingEntryRow>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ranking_entries \
         WHERE category = $1 \
           AND period = $2 \
           AND ($3::TEXT IS NULL OR entity_type = $3) \
           AND ($4::TEXT IS NULL OR country_code = $4) \
           AND ($5::TEXT IS NULL OR parent_name = $5) \
           AND rank <= $6 \
         ORDER BY {GROUP_ORDER}"
    ))
    .bind(filters.category.as_str())
    .bind(filters.period.as_str())
    .bind(filters.entity_type)
    .bind(filters.country_code)
    .bind(filters.parent)
    .bind(filters.limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns the current snapshot row for every published `(category, period)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_latest_snapshots(pool: &PgPool) -> Result<Vec<RankingSnapshotRow>, DbError> {
    let rows = sqlx::query_as::<_, RankingSnapshotRow>(
        "SELECT id, category, period, snapshot_at, published_at, entry_count, \
                signal_count, providers \
         FROM ranking_snapshots \
         ORDER BY category, \
                  CASE period WHEN 'today' THEN 0 WHEN 'week' THEN 1 \
                              WHEN 'month' THEN 2 ELSE 3 END",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
