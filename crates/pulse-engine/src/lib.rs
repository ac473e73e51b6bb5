//! Scoring, ranking and snapshot publishing for the Pulse ranking engine.
//!
//! Data flows provider signals → [`score_signals`] → [`assemble`] →
//! [`diff`] → [`SnapshotStore::publish`], driven per category by the
//! [`Orchestrator`].

pub mod assemble;
pub mod cycle;
pub mod error;
pub mod keywords;
pub mod scorer;
pub mod snapshot;
pub mod trend;

pub use assemble::{assemble, check_hierarchy, AssemblySettings, MAX_EXPLANATION_CHARS};
pub use cycle::{
    CycleReport, CycleSettings, GroupOutcome, GroupStatus, Orchestrator, ProviderOutcome,
    ProviderStatus,
};
pub use error::{AssemblyError, CycleError, PersistError};
pub use keywords::{extract, MAX_TOPICS};
pub use scorer::{rank_order, score, score_signals, PulseScore, ScoredEntity};
pub use snapshot::{validate_snapshot, MemorySnapshotStore, SnapshotMeta, SnapshotStore};
pub use trend::diff;
