//! Snapshot publishing contract and an in-memory store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::{GroupKey, Period, RankingCategory, RankingEntry};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::assemble::check_hierarchy;
use crate::error::PersistError;

/// Facts about a published snapshot that are not per-entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotMeta {
    pub snapshot_at: DateTime<Utc>,
    /// Signals that fed the snapshot's period.
    pub signal_count: usize,
    /// Provider ids that contributed at least one signal.
    pub providers: Vec<String>,
}

/// Where published snapshots live.
///
/// `publish` replaces the whole `(category, period)` snapshot or nothing:
/// readers never observe a mix of old and new entries.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The currently published entries for `(category, period)`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Store`] if the backing store fails.
    async fn previous(
        &self,
        category: RankingCategory,
        period: Period,
    ) -> Result<Option<Vec<RankingEntry>>, PersistError>;

    /// Atomically replace the `(category, period)` snapshot with `entries`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Rejected`] if `entries` fail
    /// [`validate_snapshot`], or [`PersistError::Store`] if the write
    /// fails. Either way the previous snapshot is left in place.
    async fn publish(
        &self,
        entries: &[RankingEntry],
        category: RankingCategory,
        period: Period,
        meta: &SnapshotMeta,
    ) -> Result<(), PersistError>;
}

/// Checks a snapshot before it may replace the published one.
///
/// Entries must be non-empty, all belong to `(category, period)`, have
/// ranks `1..=n` within each group and keep the parent hierarchy intact.
///
/// # Errors
///
/// Returns [`PersistError::Rejected`] describing the first violation.
pub fn validate_snapshot(
    entries: &[RankingEntry],
    category: RankingCategory,
    period: Period,
) -> Result<(), PersistError> {
    if entries.is_empty() {
        return Err(PersistError::Rejected(format!(
            "{category}/{period}: refusing to publish an empty snapshot"
        )));
    }

    let mut groups: BTreeMap<GroupKey, Vec<u32>> = BTreeMap::new();
    for entry in entries {
        if entry.category != category || entry.period != period {
            return Err(PersistError::Rejected(format!(
                "entry '{}' is {}/{}, expected {category}/{period}",
                entry.entity.name, entry.category, entry.period
            )));
        }
        groups.entry(entry.group_key()).or_default().push(entry.rank);
    }

    for (key, mut ranks) in groups {
        ranks.sort_unstable();
        let contiguous = ranks
            .iter()
            .zip(1u32..)
            .all(|(rank, expected)| *rank == expected);
        if !contiguous {
            return Err(PersistError::Rejected(format!(
                "{category}/{period}: ranks {ranks:?} in {} group are not contiguous from 1",
                key.entity_type
            )));
        }
    }

    check_hierarchy(entries).map_err(|e| PersistError::Rejected(e.to_string()))
}

#[derive(Debug, Clone)]
struct StoredSnapshot {
    entries: Vec<RankingEntry>,
    meta: SnapshotMeta,
}

/// In-process [`SnapshotStore`].
///
/// A publish stages rows into a fresh vector and swaps it in under the
/// lock. [`MemorySnapshotStore::fail_after`] makes staging fail after `k`
/// rows, which is how atomicity is exercised without a database.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<(RankingCategory, Period), StoredSnapshot>>,
    fail_after: Mutex<Option<usize>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent publish after staging `rows` rows; `None`
    /// clears the fault.
    pub async fn fail_after(&self, rows: Option<usize>) {
        *self.fail_after.lock().await = rows;
    }

    /// Published entries for `(category, period)`.
    pub async fn entries(&self, category: RankingCategory, period: Period) -> Option<Vec<RankingEntry>> {
        self.snapshots
            .lock()
            .await
            .get(&(category, period))
            .map(|s| s.entries.clone())
    }

    pub async fn meta(&self, category: RankingCategory, period: Period) -> Option<SnapshotMeta> {
        self.snapshots
            .lock()
            .await
            .get(&(category, period))
            .map(|s| s.meta.clone())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn previous(
        &self,
        category: RankingCategory,
        period: Period,
    ) -> Result<Option<Vec<RankingEntry>>, PersistError> {
        Ok(self.entries(category, period).await)
    }

    async fn publish(
        &self,
        entries: &[RankingEntry],
        category: RankingCategory,
        period: Period,
        meta: &SnapshotMeta,
    ) -> Result<(), PersistError> {
        validate_snapshot(entries, category, period)?;
        let fail_after = *self.fail_after.lock().await;

        let mut staged = Vec::with_capacity(entries.len());
        for entry in entries {
            if fail_after.is_some_and(|k| staged.len() >= k) {
                return Err(PersistError::Store(format!(
                    "injected fault after {} staged rows",
                    staged.len()
                )));
            }
            staged.push(entry.clone());
        }

        self.snapshots.lock().await.insert(
            (category, period),
            StoredSnapshot {
                entries: staged,
                meta: meta.clone(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pulse_core::{Entity, Trend};

    use super::*;

    fn entry(entity: Entity, rank: u32) -> RankingEntry {
        RankingEntry {
            category: RankingCategory::Hottest,
            entity,
            period: Period::Today,
            rank,
            stat: "50.0°C".to_string(),
            score: 100.0 - f64::from(rank),
            trend: Trend::Same,
            explanation: None,
            snapshot_at: Utc::now(),
        }
    }

    fn countries(names: &[(&str, &str)]) -> Vec<RankingEntry> {
        names
            .iter()
            .zip(1u32..)
            .map(|((code, name), rank)| entry(Entity::country(code, name), rank))
            .collect()
    }

    fn meta() -> SnapshotMeta {
        SnapshotMeta {
            snapshot_at: Utc::now(),
            signal_count: 3,
            providers: vec!["open_meteo".to_string()],
        }
    }

    #[test]
    fn validate_rejects_gapped_ranks() {
        let mut entries = countries(&[("KW", "Kuwait"), ("SA", "Saudi Arabia")]);
        entries[1].rank = 3;
        let err = validate_snapshot(&entries, RankingCategory::Hottest, Period::Today).unwrap_err();
        assert!(matches!(err, PersistError::Rejected(ref m) if m.contains("not contiguous")));
    }

    #[test]
    fn validate_rejects_foreign_period() {
        let entries = countries(&[("KW", "Kuwait")]);
        let err = validate_snapshot(&entries, RankingCategory::Hottest, Period::Week).unwrap_err();
        assert!(matches!(err, PersistError::Rejected(_)));
    }

    #[test]
    fn validate_rejects_empty_and_orphans() {
        assert!(validate_snapshot(&[], RankingCategory::Hottest, Period::Today).is_err());
        let orphan = vec![entry(Entity::state("US", "United States", "Texas"), 1)];
        assert!(validate_snapshot(&orphan, RankingCategory::Hottest, Period::Today).is_err());
    }

    #[tokio::test]
    async fn publish_replaces_whole_snapshot() {
        let store = MemorySnapshotStore::new();
        let first = countries(&[("KW", "Kuwait"), ("SA", "Saudi Arabia"), ("AE", "United Arab Emirates")]);
        store
            .publish(&first, RankingCategory::Hottest, Period::Today, &meta())
            .await
            .unwrap();

        let second = countries(&[("IQ", "Iraq")]);
        store
            .publish(&second, RankingCategory::Hottest, Period::Today, &meta())
            .await
            .unwrap();

        let stored = store
            .previous(RankingCategory::Hottest, Period::Today)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, second);
    }

    #[tokio::test]
    async fn fault_mid_publish_leaves_previous_snapshot_intact() {
        let store = MemorySnapshotStore::new();
        let original = countries(&[("KW", "Kuwait"), ("SA", "Saudi Arabia")]);
        store
            .publish(&original, RankingCategory::Hottest, Period::Today, &meta())
            .await
            .unwrap();

        store.fail_after(Some(2)).await;
        let replacement = countries(&[("IQ", "Iraq"), ("EG", "Egypt"), ("IN", "India")]);
        let err = store
            .publish(&replacement, RankingCategory::Hottest, Period::Today, &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Store(_)));

        let stored = store.entries(RankingCategory::Hottest, Period::Today).await.unwrap();
        assert_eq!(stored, original);

        store.fail_after(None).await;
        store
            .publish(&replacement, RankingCategory::Hottest, Period::Today, &meta())
            .await
            .unwrap();
        assert_eq!(
            store.entries(RankingCategory::Hottest, Period::Today).await.unwrap(),
            replacement
        );
    }

    #[tokio::test]
    async fn rejected_publish_writes_nothing() {
        let store = MemorySnapshotStore::new();
        let mut bad = countries(&[("KW", "Kuwait"), ("SA", "Saudi Arabia")]);
        bad[0].rank = 2;
        assert!(store
            .publish(&bad, RankingCategory::Hottest, Period::Today, &meta())
            .await
            .is_err());
        assert!(store
            .entries(RankingCategory::Hottest, Period::Today)
            .await
            .is_none());
    }
}
