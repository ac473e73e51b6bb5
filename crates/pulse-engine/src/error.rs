use pulse_core::{EntityType, Period, RankingCategory};
use thiserror::Error;

/// Invariant violations caught while assembling a snapshot. The group is
/// skipped and the previous snapshot stays published.
#[derive(Debug, Error, PartialEq)]
pub enum AssemblyError {
    #[error("{entity_type} '{name}' has no emitted parent '{parent}'")]
    OrphanedEntity {
        entity_type: EntityType,
        name: String,
        parent: String,
    },

    #[error("{category}/{period}: {scored} scored entities produced an empty snapshot")]
    EmptySnapshot {
        category: RankingCategory,
        period: Period,
        scored: usize,
    },
}

/// Errors returned by a [`crate::SnapshotStore`].
#[derive(Debug, Error)]
pub enum PersistError {
    /// The snapshot failed validation; nothing was written.
    #[error("snapshot rejected: {0}")]
    Rejected(String),

    /// The backing store failed; the previous snapshot is intact.
    #[error("snapshot store failure: {0}")]
    Store(String),
}

/// Errors that abort a whole cycle rather than one group.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a {0} cycle is already running")]
    AlreadyRunning(RankingCategory),

    #[error("no enabled provider feeds {0}")]
    NoProviders(RankingCategory),
}
