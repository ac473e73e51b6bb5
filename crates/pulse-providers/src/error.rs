use thiserror::Error;

/// Errors returned by provider adapters.
///
/// Every failure an adapter can hit is one of these; nothing panics past
/// the adapter boundary. [`ProviderError::is_retryable`] tells the
/// orchestrator whether the next cadence tick is worth trying.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The adapter did not finish within the cycle's per-provider budget.
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// The provider asked us to slow down (HTTP 429 or an in-body notice).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Missing, invalid or exhausted credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The payload did not match the expected JSON or XML shape.
    #[error("malformed payload for {context}: {reason}")]
    Malformed { context: String, reason: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ProviderError {
    /// Whether a later attempt can reasonably succeed without operator action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            ProviderError::Timeout(_) | ProviderError::RateLimited(_) => true,
            ProviderError::UnexpectedStatus { status, .. } => *status >= 500,
            ProviderError::Unauthorized(_)
            | ProviderError::Malformed { .. }
            | ProviderError::InvalidBaseUrl { .. } => false,
        }
    }

    /// Short, stable label for logs and the run ledger.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Http(_) => "http",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Unauthorized(_) => "unauthorized",
            ProviderError::Malformed { .. } => "malformed",
            ProviderError::UnexpectedStatus { .. } => "unexpected_status",
            ProviderError::InvalidBaseUrl { .. } => "invalid_base_url",
        }
    }

    pub(crate) fn malformed(context: impl Into<String>, reason: impl ToString) -> Self {
        ProviderError::Malformed {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}
