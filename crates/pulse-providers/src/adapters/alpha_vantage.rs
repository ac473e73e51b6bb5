//! Alpha Vantage `GLOBAL_QUOTE` adapter for `business`.
//!
//! Each catalogue market stands in for its country; the absolute daily
//! percent move is the magnitude.

use std::sync::Arc;

use async_trait::async_trait;
use pulse_core::{Attribution, Catalog, MarketConfig, RankingCategory, Signal, TimeWindow};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::adapter::{settle, ProviderAdapter};
use crate::error::ProviderError;
use crate::http::{endpoint, get_text, parse_base_url};

pub const ID: &str = "alpha_vantage";

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/";

const CATEGORIES: &[RankingCategory] = &[RankingCategory::Business];

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

pub struct AlphaVantageAdapter {
    client: Client,
    base_url: Url,
    api_key: String,
    reliability: f64,
    catalog: Arc<Catalog>,
}

impl AlphaVantageAdapter {
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidBaseUrl`] only if the built-in URL is broken.
    pub fn new(
        client: Client,
        api_key: &str,
        reliability: f64,
        catalog: Arc<Catalog>,
    ) -> Result<Self, ProviderError> {
        Self::with_base_url(client, api_key, reliability, catalog, DEFAULT_BASE_URL)
    }

    /// Creates an adapter against a custom base URL (for wiremock tests).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        client: Client,
        api_key: &str,
        reliability: f64,
        catalog: Arc<Catalog>,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            api_key: api_key.to_owned(),
            reliability,
            catalog,
        })
    }

    /// Absolute percent move for one symbol, or `None` when the API knows
    /// the symbol but has no quote for it.
    async fn quote(&self, market: &MarketConfig) -> Result<Option<f64>, ProviderError> {
        let url = endpoint(
            &self.base_url,
            "query",
            &[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", market.symbol.as_str()),
                ("apikey", self.api_key.as_str()),
            ],
        )?;
        let body = get_text(&self.client, url).await?;
        parse_quote(&body, &market.symbol)
    }
}

fn parse_quote(body: &str, symbol: &str) -> Result<Option<f64>, ProviderError> {
    let context = format!("alpha vantage quote for {symbol}");
    let envelope: QuoteEnvelope =
        serde_json::from_str(body).map_err(|e| ProviderError::malformed(context.as_str(), e))?;

    // Throttled and quota-exhausted keys get HTTP 200 with a notice instead of data.
    if let Some(notice) = envelope.note.or(envelope.information) {
        return Err(ProviderError::RateLimited(notice));
    }
    if let Some(message) = envelope.error_message {
        return Err(ProviderError::malformed(context, message));
    }

    let Some(quote) = envelope.global_quote else {
        return Err(ProviderError::malformed(context, "missing Global Quote"));
    };
    if quote.symbol.is_none() {
        return Ok(None);
    }
    let Some(raw) = quote.change_percent else {
        return Ok(None);
    };
    raw.trim()
        .trim_end_matches('%')
        .parse::<f64>()
        .map(|pct| Some(pct.abs()))
        .map_err(|e| ProviderError::malformed(context, format!("change percent '{raw}': {e}")))
}

#[async_trait]
impl ProviderAdapter for AlphaVantageAdapter {
    fn id(&self) -> &'static str {
        ID
    }

    fn categories(&self) -> &'static [RankingCategory] {
        CATEGORIES
    }

    async fn fetch(&self, window: &TimeWindow) -> Result<Vec<Signal>, ProviderError> {
        if window.category != RankingCategory::Business {
            return Ok(Vec::new());
        }

        let mut signals = Vec::new();
        let mut errors = Vec::new();
        for market in &self.catalog.markets {
            match self.quote(market).await {
                Ok(Some(move_pct)) => signals.push(Signal {
                    provider: ID.to_string(),
                    category: RankingCategory::Business,
                    title: format!("{} moved {move_pct:.2}%", market.symbol),
                    magnitude: Some(move_pct),
                    reliability: self.reliability,
                    // Quotes are current as of the request.
                    observed_at: window.end,
                    attribution: Attribution::country(&market.country_code.to_uppercase()),
                }),
                Ok(None) => {
                    tracing::debug!(provider = ID, symbol = %market.symbol, "no quote returned");
                }
                Err(e) => {
                    let stop = matches!(e, ProviderError::RateLimited(_));
                    errors.push(e);
                    // The quota is per key; further symbols would be refused too.
                    if stop {
                        break;
                    }
                }
            }
        }
        settle(ID, signals, errors)
    }
}
