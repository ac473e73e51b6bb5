//! Open-Meteo current-conditions adapter.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use pulse_core::{Catalog, RankingCategory, Signal, TimeWindow, WeatherPoint};
use reqwest::{Client, Url};
use serde::Deserialize;

use super::weather::{reading_signal, Reading, CATEGORIES};
use crate::adapter::{settle, ProviderAdapter};
use crate::error::ProviderError;
use crate::http::{endpoint, get_json, parse_base_url};

pub const ID: &str = "open_meteo";

const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/";

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    /// ISO-8601 local time without seconds, e.g. `2025-03-01T12:00`.
    time: Option<String>,
    temperature_2m: f64,
    wind_speed_10m: f64,
}

pub struct OpenMeteoAdapter {
    client: Client,
    base_url: Url,
    reliability: f64,
    catalog: Arc<Catalog>,
}

impl OpenMeteoAdapter {
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
        })
    }

    async fn read(&self, point: &WeatherPoint, fallback_at: DateTime<Utc>) -> Result<Reading, ProviderError> {
        let lat = format!("{:.4}", point.lat);
        let lon = format!("{:.4}", point.lon);
        let url = endpoint(
            &self.base_url,
            "v1/forecast",
            &[
                ("latitude", lat.as_str()),
                ("longitude", lon.as_str()),
                ("current", "temperature_2m,wind_speed_10m"),
                ("wind_speed_unit", "kmh"),
                ("timezone", "UTC"),
            ],
        )?;
        let response: ForecastResponse =
            get_json(&self.client, url, &format!("open-meteo forecast for {}", point.label)).await?;
        let current = response.current;
        Ok(Reading {
            temperature_c: current.temperature_2m,
            wind_kmh: current.wind_speed_10m,
            observed_at: current
                .time
                .as_deref()
                .and_then(parse_current_time)
                .map_or(fallback_at, |at| at.min(fallback_at)),
        })
    }
}

fn parse_current_time(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl ProviderAdapter for OpenMeteoAdapter {
    fn id(&self) -> &'static str {
        ID
    }

    fn categories(&self) -> &'static [RankingCategory] {
        CATEGORIES
    }

    async fn fetch(&self, window: &TimeWindow) -> Result<Vec<Signal>, ProviderError> {
        let mut signals = Vec::new();
        let mut errors = Vec::new();
        for point in self.catalog.weather_points() {
            match self.read(&point, window.end).await {
                Ok(reading) if window.contains(reading.observed_at) => {
                    signals.extend(reading_signal(
                        ID,
                        window.category,
                        self.reliability,
                        &point,
                        &reading,
                    ));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(provider = ID, place = %point.label, error = %e, "reading failed");
                    errors.push(e);
                }
            }
        }
        settle(ID, signals, errors)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_minute_precision_time() {
        assert_eq!(
            parse_current_time("2025-03-01T12:15"),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 15, 0).unwrap())
        );
        assert!(parse_current_time("yesterday").is_none());
    }

    #[test]
    fn response_shape_deserializes() {
        let body = r#"{"latitude":29.3,"longitude":47.5,"current":{"time":"2025-07-01T12:00","interval":900,"temperature_2m":52.1,"wind_speed_10m":14.4}}"#;
        let parsed: ForecastResponse = serde_json::from_str(body).unwrap();
        assert!((parsed.current.temperature_2m - 52.1).abs() < f64::EPSILON);
        assert!((parsed.current.wind_speed_10m - 14.4).abs() < f64::EPSILON);
    }
}
