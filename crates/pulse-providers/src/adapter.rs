use async_trait::async_trait;
use pulse_core::{RankingCategory, Signal, TimeWindow};

use crate::error::ProviderError;

/// One external data source.
///
/// Adapters hold an HTTP client and read-only configuration, nothing else,
/// so fetching the same window twice yields the same signals as far as the
/// upstream allows. Items observed before `window.start` are skipped.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider id, matching the catalogue key.
    fn id(&self) -> &'static str;

    /// Categories this adapter can produce signals for.
    fn categories(&self) -> &'static [RankingCategory];

    /// Whether the upstream's capped sample for `category` depends on the
    /// requested window.
    ///
    /// Windowed providers are fetched once per period. The rest are fetched
    /// once over the longest window and every period filters that batch.
    fn windowed(&self, _category: RankingCategory) -> bool {
        false
    }

    /// Fetch signals for `window.category` observed within the window.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when nothing usable could be fetched.
    async fn fetch(&self, window: &TimeWindow) -> Result<Vec<Signal>, ProviderError>;
}

/// Combines the results of an adapter's sub-requests (one per edition,
/// place or symbol).
///
/// Partial success wins: failed sub-requests are logged and the collected
/// signals returned. Only when nothing was collected does the first error
/// surface.
pub(crate) fn settle(
    provider: &'static str,
    signals: Vec<Signal>,
    errors: Vec<ProviderError>,
) -> Result<Vec<Signal>, ProviderError> {
    if signals.is_empty() {
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
        return Ok(signals);
    }
    for error in &errors {
        tracing::warn!(provider, error = %error, "sub-request failed; keeping partial results");
    }
    Ok(signals)
}
