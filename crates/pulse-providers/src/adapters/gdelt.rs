//! GDELT DOC 2.0 article-list adapter.
//!
//! Each matching article counts once for the country of its source and,
//! when the headline names a catalogue city or state of that country, once
//! more at each finer level: a city mention also counts for its state.
//!
//! The API caps every answer at 250 articles, so each period is fetched with
//! its own window and a relevance sort spreads the sample across it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use pulse_core::{geo, Attribution, Catalog, RankingCategory, Signal, TimeWindow};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::adapter::ProviderAdapter;
use crate::error::ProviderError;
use crate::http::{get_text, parse_base_url};

pub const ID: &str = "gdelt";

const DEFAULT_BASE_URL: &str = "https://api.gdeltproject.org/";
const MAX_RECORDS: usize = 250;
/// The DOC API only searches the trailing three months.
const MAX_LOOKBACK_DAYS: i64 = 90;
const SEEN_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const QUERY_DATE_FORMAT: &str = "%Y%m%d%H%M%S";
/// GDELT throttles clients that ask more than once every five seconds.
const MIN_REQUEST_GAP: Duration = Duration::from_secs(5);

const CATEGORIES: &[RankingCategory] = &[
    RankingCategory::Crime,
    RankingCategory::Violent,
    RankingCategory::Safest,
    RankingCategory::Fun,
];

#[derive(Debug, Deserialize)]
struct GdeltResponse {
    #[serde(default)]
    articles: Vec<GdeltArticle>,
}

#[derive(Debug, Deserialize)]
struct GdeltArticle {
    title: Option<String>,
    #[serde(rename = "seendate")]
    seen_date: Option<String>,
    #[serde(rename = "sourcecountry")]
    source_country: Option<String>,
}

fn query_for(category: RankingCategory) -> Option<&'static str> {
    match category {
        RankingCategory::Crime => {
            Some("(crime OR robbery OR burglary OR theft OR arrested) sourcelang:english")
        }
        RankingCategory::Violent => {
            Some("(shooting OR stabbing OR assault OR murder OR killed) sourcelang:english")
        }
        RankingCategory::Safest => Some(
            "(\"crime falls\" OR \"crime drops\" OR \"safest city\" OR \"low crime\") sourcelang:english",
        ),
        RankingCategory::Fun => {
            Some("(festival OR concert OR carnival OR parade OR nightlife) sourcelang:english")
        }
        _ => None,
    }
}

pub struct GdeltAdapter {
    client: Client,
    base_url: Url,
    reliability: f64,
    catalog: Arc<Catalog>,
    request_gap: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl GdeltAdapter {
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidBaseUrl`] only if the built-in URL is broken.
    pub fn new(client: Client, reliability: f64, catalog: Arc<Catalog>) -> Result<Self, ProviderError> {
        Self::with_base_url(client, reliability, catalog, DEFAULT_BASE_URL)
    }

    /// Creates an adapter against a custom base URL (for wiremock tests).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        client: Client,
        reliability: f64,
        catalog: Arc<Catalog>,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            reliability,
            catalog,
            request_gap: MIN_REQUEST_GAP,
            last_request: tokio::sync::Mutex::new(None),
        })
    }

    /// Overrides the minimum gap between requests.
    #[must_use]
    pub fn with_request_gap(mut self, gap: Duration) -> Self {
        self.request_gap = gap;
        self
    }

    /// Waits until `request_gap` has passed since the previous request.
    async fn wait_for_request_slot(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.request_gap {
                tokio::time::sleep(self.request_gap.saturating_sub(elapsed)).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn build_url(&self, query: &str, window: &TimeWindow) -> Result<Url, ProviderError> {
        let earliest = window.end - TimeDelta::days(MAX_LOOKBACK_DAYS);
        let start = window.start.max(earliest);
        let encoded = utf8_percent_encode(query, NON_ALPHANUMERIC).to_string();
        let raw = format!(
            "{}api/v2/doc/doc?query={encoded}&mode=ArtList&maxrecords={MAX_RECORDS}&format=json&sort=HybridRel&startdatetime={}&enddatetime={}",
            self.base_url,
            start.format(QUERY_DATE_FORMAT),
            window.end.format(QUERY_DATE_FORMAT),
        );
        Url::parse(&raw).map_err(|e| ProviderError::InvalidBaseUrl {
            url: raw,
            reason: e.to_string(),
        })
    }

    fn signal(&self, category: RankingCategory, title: &str, at: DateTime<Utc>, attribution: Attribution) -> Signal {
        Signal {
            provider: ID.to_string(),
            category,
            title: title.to_string(),
            magnitude: Some(1.0),
            reliability: self.reliability,
            observed_at: at,
            attribution,
        }
    }

    fn article_signals(&self, window: &TimeWindow, articles: Vec<GdeltArticle>) -> Vec<Signal> {
        let mut signals = Vec::new();
        for article in articles {
            let Some(title) = article.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
            else {
                continue;
            };
            let Some(observed_at) = article.seen_date.as_deref().and_then(parse_seen_date) else {
                tracing::debug!(provider = ID, title, "skipping article without a usable seendate");
                continue;
            };
            if !window.contains(observed_at) {
                continue;
            }
            let Some(code) = article.source_country.as_deref().and_then(geo::country_code) else {
                continue;
            };

            signals.push(self.signal(window.category, title, observed_at, Attribution::country(code)));
            let Some(finer) = self.catalog.find_place_mention(code, title) else {
                continue;
            };
            if let Attribution::Place {
                country_code,
                state: Some(state),
                city: Some(_),
            } = &finer
            {
                let state = Attribution::Place {
                    country_code: country_code.clone(),
                    state: Some(state.clone()),
                    city: None,
                };
                signals.push(self.signal(window.category, title, observed_at, state));
            }
            signals.push(self.signal(window.category, title, observed_at, finer));
        }
        signals
    }
}

/// Parses GDELT's compact `seendate`, e.g. `20250301T081500Z`.
fn parse_seen_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, SEEN_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// GDELT answers throttled clients with a plain-text 200 instead of JSON.
fn parse_response(body: &str) -> Result<GdeltResponse, ProviderError> {
    let trimmed = body.trim_start();
    if trimmed.is_empty() {
        return Ok(GdeltResponse {
            articles: Vec::new(),
        });
    }
    if !trimmed.starts_with('{') {
        let lower = trimmed.to_lowercase();
        if lower.contains("limit requests") || lower.contains("rate limit") {
            return Err(ProviderError::RateLimited(
                trimmed.chars().take(120).collect(),
            ));
        }
    }
    serde_json::from_str(body).map_err(|e| ProviderError::malformed("gdelt artlist", e))
}

#[async_trait]
impl ProviderAdapter for GdeltAdapter {
    fn id(&self) -> &'static str {
        ID
    }

    fn categories(&self) -> &'static [RankingCategory] {
        CATEGORIES
    }

    fn windowed(&self, _category: RankingCategory) -> bool {
        true
    }

    async fn fetch(&self, window: &TimeWindow) -> Result<Vec<Signal>, ProviderError> {
        let Some(query) = query_for(window.category) else {
            return Ok(Vec::new());
        };
        let url = self.build_url(query, window)?;
        self.wait_for_request_slot().await;
        let body = get_text(&self.client, url).await?;
        let response = parse_response(&body)?;
        let article_count = response.articles.len();
        let signals = self.article_signals(window, response.articles);
        tracing::debug!(
            provider = ID,
            category = %window.category,
            articles = article_count,
            signals = signals.len(),
            "fetched articles"
        );
        Ok(signals)
    }
}
