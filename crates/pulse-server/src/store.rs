//! Postgres-backed [`SnapshotStore`].

use async_trait::async_trait;
use pulse_core::{Period, RankingCategory, RankingEntry};
use pulse_db::{DbError, NewSnapshot};
use pulse_engine::{validate_snapshot, PersistError, SnapshotMeta, SnapshotStore};
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn persist_error(error: DbError) -> PersistError {
    match error {
        DbError::UnrepresentableScore { .. } | DbError::InvalidRow(_) => {
            PersistError::Rejected(error.to_string())
        }
        other => PersistError::Store(other.to_string()),
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn previous(
        &self,
        category: RankingCategory,
        period: Period,
    ) -> Result<Option<Vec<RankingEntry>>, PersistError> {
        pulse_db::load_ranking_snapshot(&self.pool, category, period)
            .await
            .map_err(|e| PersistError::Store(e.to_string()))
    }

    async fn publish(
        &self,
        entries: &[RankingEntry],
        category: RankingCategory,
        period: Period,
        meta: &SnapshotMeta,
    ) -> Result<(), PersistError> {
        validate_snapshot(entries, category, period)?;
        let snapshot = NewSnapshot {
            category,
            period,
            snapshot_at: meta.snapshot_at,
            signal_count: meta.signal_count,
            providers: &meta.providers,
            entries,
        };
        let id = pulse_db::replace_ranking_snapshot(&self.pool, &snapshot)
            .await
            .map_err(persist_error)?;
        tracing::debug!(%category, %period, snapshot_id = %id, "snapshot row replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstorable_scores_are_rejections_not_store_failures() {
        let err = persist_error(DbError::UnrepresentableScore {
            entity: "Kuwait".to_string(),
            score: f64::INFINITY,
        });
        assert!(matches!(err, PersistError::Rejected(_)));

        let err = persist_error(DbError::NotFound);
        assert!(matches!(err, PersistError::Store(_)));
    }
}
