//! One refresh cycle for one category.
//!
//! Providers are fetched concurrently (each under its own limiter and time
//! budget), then every period is scored, assembled, diffed against the
//! published snapshot and published as an independent group. A failure in
//! one provider or one group never takes down the rest of the cycle.
//!
//! Windowed providers are fetched once per period and their signals only
//! feed that period. Every other provider is fetched once over a year and
//! each period filters the shared batch.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use pulse_core::{Catalog, Period, RankingCategory, Signal, TimeWindow};
use pulse_providers::{ProviderError, ProviderHandle, ProviderRegistry};
use serde::Serialize;
use tokio::sync::watch;

use crate::assemble::{assemble, AssemblySettings};
use crate::error::CycleError;
use crate::scorer::score_signals;
use crate::snapshot::{SnapshotMeta, SnapshotStore};
use crate::trend::diff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSettings {
    pub assembly: AssemblySettings,
    /// Providers fetched at once within one cycle.
    pub max_concurrent_fetches: usize,
    pub provider_timeout: Duration,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            assembly: AssemblySettings::default(),
            max_concurrent_fetches: 4,
            provider_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Succeeded,
    Failed,
    TimedOut,
    /// Not attempted or abandoned because shutdown was requested.
    Skipped,
}

impl ProviderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderStatus::Succeeded => "succeeded",
            ProviderStatus::Failed => "failed",
            ProviderStatus::TimedOut => "timed_out",
            ProviderStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderOutcome {
    pub provider: String,
    pub status: ProviderStatus,
    pub signal_count: usize,
    pub retryable: bool,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    Published { entries: usize },
    /// No signal fell inside the period; the previous snapshot stands.
    NoSignals,
    /// Signals arrived but none could be attributed to a rankable entity.
    NoEntities,
    Cancelled,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOutcome {
    pub period: Period,
    pub signal_count: usize,
    #[serde(flatten)]
    pub status: GroupStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub category: RankingCategory,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub providers: Vec<ProviderOutcome>,
    pub groups: Vec<GroupOutcome>,
}

impl CycleReport {
    #[must_use]
    pub fn signal_count(&self) -> usize {
        self.providers.iter().map(|p| p.signal_count).sum()
    }

    #[must_use]
    pub fn published_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.status, GroupStatus::Published { .. }))
            .count()
    }

    #[must_use]
    pub fn failed_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.status, GroupStatus::Failed { .. }))
            .count()
    }

    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.groups.iter().any(|g| g.status == GroupStatus::Cancelled)
    }

    #[must_use]
    pub fn group(&self, period: Period) -> Option<&GroupOutcome> {
        self.groups.iter().find(|g| g.period == period)
    }
}

/// Releases a category's single-flight slot on drop.
struct RunningSlot<'a> {
    running: &'a Mutex<HashSet<RankingCategory>>,
    category: RankingCategory,
}

impl Drop for RunningSlot<'_> {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.category);
    }
}

/// Runs refresh cycles against a provider registry and a snapshot store.
pub struct Orchestrator {
    registry: ProviderRegistry,
    store: Arc<dyn SnapshotStore>,
    catalog: Arc<Catalog>,
    settings: CycleSettings,
    running: Mutex<HashSet<RankingCategory>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        registry: ProviderRegistry,
        store: Arc<dyn SnapshotStore>,
        catalog: Arc<Catalog>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            registry,
            store,
            catalog,
            settings,
            running: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    fn claim(&self, category: RankingCategory) -> Option<RunningSlot<'_>> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        running.insert(category).then(|| RunningSlot {
            running: &self.running,
            category,
        })
    }

    /// Run one cycle for `category` as of now.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::run_cycle_at`].
    pub async fn run_cycle(
        &self,
        category: RankingCategory,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, CycleError> {
        self.run_cycle_at(category, Utc::now(), shutdown).await
    }

    /// Run one cycle for `category` with `now` as the snapshot time.
    ///
    /// Setting `shutdown` to `true` abandons in-flight fetches and stops
    /// before the next publish; groups already published stay published.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::AlreadyRunning`] if a cycle for the same
    /// category is in progress, or [`CycleError::NoProviders`] if no
    /// enabled provider feeds the category. Provider and group failures
    /// are reported in the [`CycleReport`] instead.
    pub async fn run_cycle_at(
        &self,
        category: RankingCategory,
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, CycleError> {
        let Some(_slot) = self.claim(category) else {
            tracing::warn!(%category, "cycle already running; skipping tick");
            return Err(CycleError::AlreadyRunning(category));
        };

        let providers = self.registry.for_category(category);
        if providers.is_empty() {
            return Err(CycleError::NoProviders(category));
        }

        tracing::info!(%category, providers = providers.len(), "cycle started");

        let timeout = self.settings.provider_timeout;
        let requests = fetch_plan(providers, category);

        let mut fetched: Vec<Fetched> = stream::iter(requests)
            .map(|(handle, sample)| {
                let period = sample.unwrap_or(Period::Year);
                let window = TimeWindow::for_period(category, period, now);
                let shutdown = shutdown.clone();
                async move {
                    let (outcome, signals) = fetch_provider(handle, window, timeout, shutdown).await;
                    Fetched {
                        sample,
                        outcome,
                        signals,
                    }
                }
            })
            .buffer_unordered(self.settings.max_concurrent_fetches.max(1))
            .collect()
            .await;
        fetched.sort_by(|a, b| {
            (a.outcome.provider.as_str(), a.sample).cmp(&(b.outcome.provider.as_str(), b.sample))
        });

        let (outcomes, signals) = merge_fetched(fetched);

        let mut groups = Vec::with_capacity(Period::ALL.len());
        for period in Period::ALL {
            let outcome = if stopping(shutdown) {
                GroupOutcome {
                    period,
                    signal_count: 0,
                    status: GroupStatus::Cancelled,
                }
            } else {
                self.run_group(category, period, &signals, now, shutdown).await
            };
            groups.push(outcome);
        }

        let report = CycleReport {
            category,
            started_at: now,
            finished_at: Utc::now(),
            providers: outcomes,
            groups,
        };
        tracing::info!(
            %category,
            signals = report.signal_count(),
            published = report.published_groups(),
            failed = report.failed_groups(),
            cancelled = report.cancelled(),
            "cycle finished"
        );
        Ok(report)
    }

    async fn run_group(
        &self,
        category: RankingCategory,
        period: Period,
        signals: &[Sampled],
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> GroupOutcome {
        let window = TimeWindow::for_period(category, period, now);
        let in_window: Vec<Signal> = signals
            .iter()
            .filter(|s| s.sample.is_none_or(|p| p == period))
            .map(|s| &s.signal)
            .filter(|s| window.contains(s.observed_at))
            .cloned()
            .collect();
        let signal_count = in_window.len();
        let outcome = |status| GroupOutcome {
            period,
            signal_count,
            status,
        };

        if in_window.is_empty() {
            tracing::info!(%category, %period, "no signals in window; keeping previous snapshot");
            return outcome(GroupStatus::NoSignals);
        }

        let scored = score_signals(&in_window, category, period, self.catalog.decay(category), now);
        if scored.is_empty() {
            tracing::info!(%category, %period, signal_count, "no rankable entities; keeping previous snapshot");
            return outcome(GroupStatus::NoEntities);
        }

        let entries = match assemble(scored, category, period, &self.settings.assembly, now) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(%category, %period, error = %e, "assembly failed; group skipped");
                return outcome(GroupStatus::Failed {
                    reason: e.to_string(),
                });
            }
        };

        let previous = match self.store.previous(category, period).await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::error!(%category, %period, error = %e, "failed to load previous snapshot");
                return outcome(GroupStatus::Failed {
                    reason: e.to_string(),
                });
            }
        };
        let entries = diff(entries, previous.as_deref());

        if stopping(shutdown) {
            tracing::info!(%category, %period, "shutdown requested; not publishing");
            return outcome(GroupStatus::Cancelled);
        }

        let mut providers: Vec<String> = in_window.iter().map(|s| s.provider.clone()).collect();
        providers.sort();
        providers.dedup();
        let meta = SnapshotMeta {
            snapshot_at: now,
            signal_count,
            providers,
        };

        match self.store.publish(&entries, category, period, &meta).await {
            Ok(()) => {
                tracing::info!(%category, %period, entries = entries.len(), "snapshot published");
                outcome(GroupStatus::Published {
                    entries: entries.len(),
                })
            }
            Err(e) => {
                tracing::error!(%category, %period, error = %e, "publish failed; previous snapshot kept");
                outcome(GroupStatus::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// A signal tagged with the period it was sampled for, if any.
struct Sampled {
    sample: Option<Period>,
    signal: Signal,
}

struct Fetched {
    sample: Option<Period>,
    outcome: ProviderOutcome,
    signals: Vec<Signal>,
}

/// One request per period for windowed providers, one shared request for
/// the rest.
fn fetch_plan(
    providers: Vec<ProviderHandle>,
    category: RankingCategory,
) -> Vec<(ProviderHandle, Option<Period>)> {
    let mut requests = Vec::new();
    for handle in providers {
        if handle.adapter().windowed(category) {
            tracing::debug!(provider = handle.id(), %category, "fetching each period separately");
            for period in Period::ALL {
                requests.push((handle.clone(), Some(period)));
            }
        } else {
            requests.push((handle, None));
        }
    }
    requests
}

/// Folds per-period fetches into one outcome per provider.
///
/// `fetched` must be sorted by provider. A provider succeeded if any of its
/// requests did; errors keep the period they came from.
fn merge_fetched(fetched: Vec<Fetched>) -> (Vec<ProviderOutcome>, Vec<Sampled>) {
    let mut outcomes: Vec<ProviderOutcome> = Vec::new();
    let mut signals = Vec::new();

    for Fetched {
        sample,
        mut outcome,
        signals: batch,
    } in fetched
    {
        if let (Some(period), Some(error)) = (sample, outcome.error.as_mut()) {
            *error = format!("{period}: {error}");
        }
        signals.extend(batch.into_iter().map(|signal| Sampled { sample, signal }));

        match outcomes.last_mut() {
            Some(merged) if merged.provider == outcome.provider => {
                if merged.status != ProviderStatus::Succeeded
                    && outcome.status == ProviderStatus::Succeeded
                {
                    merged.status = ProviderStatus::Succeeded;
                    merged.retryable = false;
                }
                if merged.status != ProviderStatus::Succeeded {
                    merged.retryable |= outcome.retryable;
                }
                merged.signal_count += outcome.signal_count;
                merged.elapsed_ms = merged.elapsed_ms.max(outcome.elapsed_ms);
                merged.error = match (merged.error.take(), outcome.error) {
                    (Some(a), Some(b)) => Some(format!("{a}; {b}")),
                    (a, b) => a.or(b),
                };
            }
            _ => outcomes.push(outcome),
        }
    }

    (outcomes, signals)
}

fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolves once shutdown is requested. A dropped sender never resolves.
async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

async fn fetch_provider(
    handle: ProviderHandle,
    window: TimeWindow,
    timeout: Duration,
    shutdown: watch::Receiver<bool>,
) -> (ProviderOutcome, Vec<Signal>) {
    let provider = handle.id();
    let started = Instant::now();
    tracing::debug!(provider, category = %window.category, "fetching");

    let attempt = async {
        // The limiter is never closed, so a failed acquire cannot happen.
        let _permit = handle.limiter().acquire().await.ok();
        tokio::time::timeout(timeout, handle.adapter().fetch(&window)).await
    };

    let result = tokio::select! {
        biased;
        () = cancelled(shutdown) => None,
        result = attempt => Some(result.unwrap_or_else(|_| Err(ProviderError::Timeout(timeout.as_secs())))),
    };

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let outcome = |status, signal_count, retryable, error| ProviderOutcome {
        provider: provider.to_string(),
        status,
        signal_count,
        retryable,
        error,
        elapsed_ms,
    };

    match result {
        None => {
            tracing::info!(provider, "fetch abandoned for shutdown");
            (
                outcome(ProviderStatus::Skipped, 0, true, Some("shutdown requested".to_string())),
                Vec::new(),
            )
        }
        Some(Ok(mut signals)) => {
            signals.retain(|s| s.category == window.category);
            tracing::info!(provider, category = %window.category, signals = signals.len(), elapsed_ms, "fetch succeeded");
            (
                outcome(ProviderStatus::Succeeded, signals.len(), false, None),
                signals,
            )
        }
        Some(Err(e)) => {
            let status = if matches!(e, ProviderError::Timeout(_)) {
                ProviderStatus::TimedOut
            } else {
                ProviderStatus::Failed
            };
            tracing::warn!(
                provider,
                category = %window.category,
                kind = e.kind(),
                retryable = e.is_retryable(),
                error = %e,
                "fetch failed"
            );
            (
                outcome(status, 0, e.is_retryable(), Some(e.to_string())),
                Vec::new(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use pulse_core::Attribution;

    use super::*;

    fn fetched(sample: Option<Period>, status: ProviderStatus, error: Option<&str>) -> Fetched {
        let signals = if status == ProviderStatus::Succeeded {
            vec![Signal {
                provider: "gdelt".to_string(),
                category: RankingCategory::Crime,
                title: "Kuwait police arrest smugglers".to_string(),
                magnitude: Some(1.0),
                reliability: 0.8,
                observed_at: Utc::now(),
                attribution: Attribution::country("KW"),
            }]
        } else {
            Vec::new()
        };
        Fetched {
            sample,
            outcome: ProviderOutcome {
                provider: "gdelt".to_string(),
                status,
                signal_count: signals.len(),
                retryable: status != ProviderStatus::Succeeded,
                error: error.map(str::to_string),
                elapsed_ms: 10,
            },
            signals,
        }
    }

    #[test]
    fn partial_period_failure_still_succeeds() {
        let (outcomes, signals) = merge_fetched(vec![
            fetched(Some(Period::Today), ProviderStatus::Succeeded, None),
            fetched(Some(Period::Week), ProviderStatus::Failed, Some("HTTP 503")),
            fetched(Some(Period::Month), ProviderStatus::Succeeded, None),
        ]);

        assert_eq!(outcomes.len(), 1);
        let gdelt = &outcomes[0];
        assert_eq!(gdelt.status, ProviderStatus::Succeeded);
        assert_eq!(gdelt.signal_count, 2);
        assert!(!gdelt.retryable);
        assert_eq!(gdelt.error.as_deref(), Some("week: HTTP 503"));

        let samples: Vec<_> = signals.iter().map(|s| s.sample).collect();
        assert_eq!(samples, vec![Some(Period::Today), Some(Period::Month)]);
    }

    #[test]
    fn every_period_failing_keeps_the_first_status() {
        let (outcomes, _) = merge_fetched(vec![
            fetched(Some(Period::Today), ProviderStatus::TimedOut, Some("timed out")),
            fetched(Some(Period::Week), ProviderStatus::Failed, Some("HTTP 429")),
        ]);

        assert_eq!(outcomes[0].status, ProviderStatus::TimedOut);
        assert!(outcomes[0].retryable);
        assert_eq!(
            outcomes[0].error.as_deref(),
            Some("today: timed out; week: HTTP 429")
        );
    }

    #[test]
    fn shared_fetch_errors_carry_no_period() {
        let (outcomes, signals) =
            merge_fetched(vec![fetched(None, ProviderStatus::Failed, Some("HTTP 500"))]);
        assert_eq!(outcomes[0].error.as_deref(), Some("HTTP 500"));
        assert!(signals.is_empty());
    }
}
