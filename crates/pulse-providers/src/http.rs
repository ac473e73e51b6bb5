//! Shared HTTP plumbing for adapters: client construction, base-URL
//! normalisation and status-to-error mapping.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::error::ProviderError;

/// Builds the HTTP client shared by every adapter.
///
/// # Errors
///
/// Returns [`ProviderError::Http`] if the underlying `reqwest::Client`
/// cannot be constructed.
pub fn build_client(user_agent: &str, timeout_secs: u64) -> Result<Client, ProviderError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .build()?;
    Ok(client)
}

/// Parses a base URL, making sure it ends with exactly one slash so that
/// `Url::join` appends to it instead of replacing the last segment.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url, ProviderError> {
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| ProviderError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })
}

/// Joins `path` onto `base` and appends the query pairs.
pub(crate) fn endpoint(
    base: &Url,
    path: &str,
    query: &[(&str, &str)],
) -> Result<Url, ProviderError> {
    let mut url = base.join(path).map_err(|e| ProviderError::InvalidBaseUrl {
        url: format!("{base}{path}"),
        reason: e.to_string(),
    })?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

/// Sends a GET request and returns the body of a 2xx response.
///
/// # Errors
///
/// - [`ProviderError::Unauthorized`] on 401/403.
/// - [`ProviderError::RateLimited`] on 429.
/// - [`ProviderError::UnexpectedStatus`] on any other non-2xx status.
/// - [`ProviderError::Http`] on network failure.
pub(crate) async fn get_text(client: &Client, url: Url) -> Result<String, ProviderError> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response.text().await?);
    }
    // Never echo query strings: they may carry API keys.
    let where_ = format!("{}{}", url.origin().ascii_serialization(), url.path());
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Unauthorized(format!("HTTP {status} from {where_}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            ProviderError::RateLimited(format!("HTTP {status} from {where_}"))
        }
        _ => ProviderError::UnexpectedStatus {
            status: status.as_u16(),
            url: where_,
        },
    })
}

/// Sends a GET request and deserializes the JSON body.
///
/// # Errors
///
/// Same as [`get_text`], plus [`ProviderError::Malformed`] when the body
/// does not match `T`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: Url,
    context: &str,
) -> Result<T, ProviderError> {
    let body = get_text(client, url).await?;
    serde_json::from_str(&body).map_err(|e| ProviderError::malformed(context, e))
}
