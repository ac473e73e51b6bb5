//! One ledgered refresh: a `refresh_runs` row wrapped around an
//! [`Orchestrator`] cycle.

use pulse_core::RankingCategory;
use pulse_db::NewRunProvider;
use pulse_engine::{CycleReport, GroupStatus, Orchestrator, ProviderStatus};
use sqlx::PgPool;
use tokio::sync::watch;

/// Decide whether a finished cycle counts as a successful run.
///
/// # Errors
///
/// Returns the message stored on the failed run.
pub(crate) fn run_verdict(report: &CycleReport) -> Result<(), String> {
    if report.cancelled() {
        return Err("cycle cancelled by shutdown".to_string());
    }

    let reasons: Vec<String> = report
        .groups
        .iter()
        .filter_map(|g| match &g.status {
            GroupStatus::Failed { reason } => Some(format!("{}: {reason}", g.period)),
            _ => None,
        })
        .collect();
    if !reasons.is_empty() {
        return Err(reasons.join("; "));
    }

    if !report
        .providers
        .iter()
        .any(|p| p.status == ProviderStatus::Succeeded)
    {
        return Err("no provider succeeded".to_string());
    }

    Ok(())
}

fn clamp_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Marks the run failed, logging rather than returning a ledger error.
async fn fail_run_best_effort(
    pool: &PgPool,
    run_id: i64,
    reason: &str,
    signal_count: i32,
    groups_published: i32,
) {
    if let Err(e) =
        pulse_db::fail_refresh_run(pool, run_id, reason, signal_count, groups_published).await
    {
        tracing::error!(run_id, error = %e, "scheduler: failed to mark run failed");
    }
}

async fn record_providers(pool: &PgPool, run_id: i64, report: &CycleReport) {
    for outcome in &report.providers {
        let row = NewRunProvider {
            provider: &outcome.provider,
            status: outcome.status.as_str(),
            signal_count: clamp_i32(outcome.signal_count),
            retryable: outcome.retryable,
            error_message: outcome.error.as_deref(),
            elapsed_ms: i64::try_from(outcome.elapsed_ms).unwrap_or(i64::MAX),
        };
        if let Err(e) = pulse_db::upsert_refresh_run_provider(pool, run_id, &row).await {
            tracing::warn!(
                run_id,
                provider = %outcome.provider,
                error = %e,
                "scheduler: failed to record provider outcome"
            );
        }
    }
}

/// Run one ledgered refresh for `category`.
///
/// Failures are logged and recorded on the run; nothing is returned so the
/// scheduler job can simply await it.
pub(crate) async fn run_refresh(
    pool: &PgPool,
    orchestrator: &Orchestrator,
    category: RankingCategory,
    trigger_source: &str,
    shutdown: &watch::Receiver<bool>,
) {
    let run = match pulse_db::create_refresh_run(pool, category.as_str(), trigger_source).await {
        Ok(run) => run,
        Err(e) => {
            tracing::error!(%category, error = %e, "scheduler: failed to create refresh run");
            return;
        }
    };

    if let Err(e) = pulse_db::start_refresh_run(pool, run.id).await {
        tracing::error!(%category, run_id = run.id, error = %e, "scheduler: failed to start refresh run");
        fail_run_best_effort(pool, run.id, &format!("could not start run: {e}"), 0, 0).await;
        return;
    }

    let report = match orchestrator.run_cycle(category, shutdown).await {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(%category, run_id = run.id, error = %e, "scheduler: refresh skipped");
            fail_run_best_effort(pool, run.id, &e.to_string(), 0, 0).await;
            return;
        }
    };

    record_providers(pool, run.id, &report).await;

    let signal_count = clamp_i32(report.signal_count());
    let groups_published = clamp_i32(report.published_groups());

    match run_verdict(&report) {
        Ok(()) => {
            tracing::info!(
                %category,
                run_id = run.id,
                signal_count,
                groups_published,
                "scheduler: refresh succeeded"
            );
            if let Err(e) =
                pulse_db::complete_refresh_run(pool, run.id, signal_count, groups_published).await
            {
                tracing::error!(run_id = run.id, error = %e, "scheduler: failed to finish refresh run");
            }
        }
        Err(reason) => {
            tracing::warn!(
                %category,
                run_id = run.id,
                signal_count,
                groups_published,
                reason = %reason,
                "scheduler: refresh failed"
            );
            fail_run_best_effort(pool, run.id, &reason, signal_count, groups_published).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::Period;
    use pulse_engine::{GroupOutcome, ProviderOutcome};

    fn provider(status: ProviderStatus) -> ProviderOutcome {
        ProviderOutcome {
            provider: "open_meteo".to_string(),
            status,
            signal_count: if status == ProviderStatus::Succeeded { 3 } else { 0 },
            retryable: false,
            error: None,
            elapsed_ms: 12,
        }
    }

    fn report(providers: Vec<ProviderOutcome>, groups: Vec<GroupStatus>) -> CycleReport {
        CycleReport {
            category: RankingCategory::Hottest,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            providers,
            groups: groups
                .into_iter()
                .zip(Period::ALL)
                .map(|(status, period)| GroupOutcome {
                    period,
                    signal_count: 3,
                    status,
                })
                .collect(),
        }
    }

    #[test]
    fn clean_cycle_succeeds() {
        let report = report(
            vec![provider(ProviderStatus::Succeeded)],
            vec![GroupStatus::Published { entries: 2 }, GroupStatus::NoSignals],
        );
        assert_eq!(run_verdict(&report), Ok(()));
    }

    #[test]
    fn failed_group_fails_the_run_with_its_period() {
        let report = report(
            vec![provider(ProviderStatus::Succeeded)],
            vec![
                GroupStatus::Published { entries: 2 },
                GroupStatus::Failed {
                    reason: "store down".to_string(),
                },
            ],
        );
        assert_eq!(run_verdict(&report), Err("week: store down".to_string()));
    }

    #[test]
    fn cancelled_cycle_fails() {
        let report = report(
            vec![provider(ProviderStatus::Succeeded)],
            vec![GroupStatus::Published { entries: 1 }, GroupStatus::Cancelled],
        );
        assert!(run_verdict(&report).is_err());
    }

    #[test]
    fn cycle_without_any_successful_provider_fails() {
        let report = report(
            vec![
                provider(ProviderStatus::Failed),
                provider(ProviderStatus::TimedOut),
            ],
            vec![GroupStatus::NoSignals],
        );
        assert_eq!(run_verdict(&report), Err("no provider succeeded".to_string()));
    }
}
