//! MET Norway `locationforecast` adapter.
//!
//! api.met.no rejects requests without an identifying User-Agent (403),
//! which surfaces here as [`ProviderError::Unauthorized`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::{Catalog, RankingCategory, Signal, TimeWindow, WeatherPoint};
use reqwest::{Client, Url};
use serde::Deserialize;

use super::weather::{reading_signal, Reading, CATEGORIES};
use crate::adapter::{settle, ProviderAdapter};
use crate::error::ProviderError;
use crate::http::{endpoint, get_json, parse_base_url};

pub const ID: &str = "met_norway";

const DEFAULT_BASE_URL: &str = "https://api.met.no/";
const MS_TO_KMH: f64 = 3.6;

#[derive(Debug, Deserialize)]
struct Forecast {
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    timeseries: Vec<TimeStep>,
}

#[derive(Debug, Deserialize)]
struct TimeStep {
    time: DateTime<Utc>,
    data: StepData,
}

#[derive(Debug, Deserialize)]
struct StepData {
    instant: Instant,
}

#[derive(Debug, Deserialize)]
struct Instant {
    details: InstantDetails,
}

#[derive(Debug, Deserialize)]
struct InstantDetails {
    air_temperature: f64,
    /// Metres per second.
    wind_speed: f64,
}

pub struct MetNorwayAdapter {
    client: Client,
    base_url: Url,
    reliability: f64,
    catalog: Arc<Catalog>,
}

impl MetNorwayAdapter {
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

    async fn read(&self, point: &WeatherPoint) -> Result<Reading, ProviderError> {
        // The API caches on coordinates truncated to four decimals.
        let lat = format!("{:.4}", point.lat);
        let lon = format!("{:.4}", point.lon);
        let url = endpoint(
            &self.base_url,
            "weatherapi/locationforecast/2.0/compact",
            &[("lat", lat.as_str()), ("lon", lon.as_str())],
        )?;
        let context = format!("met.no forecast for {}", point.label);
        let forecast: Forecast = get_json(&self.client, url, &context).await?;
        first_reading(forecast).ok_or_else(|| ProviderError::malformed(context, "empty timeseries"))
    }
}

fn first_reading(forecast: Forecast) -> Option<Reading> {
    let step = forecast.properties.timeseries.into_iter().next()?;
    let details = step.data.instant.details;
    Some(Reading {
        temperature_c: details.air_temperature,
        wind_kmh: details.wind_speed * MS_TO_KMH,
        observed_at: step.time,
    })
}

#[async_trait]
impl ProviderAdapter for MetNorwayAdapter {
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
            match self.read(&point).await {
                Ok(mut reading) => {
                    // The first step can sit slightly ahead of now; treat it as current.
                    reading.observed_at = reading.observed_at.min(window.end);
                    if window.contains(reading.observed_at) {
                        signals.extend(reading_signal(
                            ID,
                            window.category,
                            self.reliability,
                            &point,
                            &reading,
                        ));
                    }
                }
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
    use super::*;

    const SAMPLE: &str = r#"{
      "type": "Feature",
      "properties": {
        "meta": {"updated_at": "2025-03-01T11:00:00Z"},
        "timeseries": [
          {"time": "2025-03-01T12:00:00Z",
           "data": {"instant": {"details": {"air_temperature": -3.5, "wind_speed": 5.0}}}},
          {"time": "2025-03-01T13:00:00Z",
           "data": {"instant": {"details": {"air_temperature": -2.0, "wind_speed": 6.0}}}}
        ]
      }
    }"#;

    #[test]
    fn first_step_is_used_and_wind_converted() {
        let forecast: Forecast = serde_json::from_str(SAMPLE).unwrap();
        let reading = first_reading(forecast).unwrap();
        assert!((reading.temperature_c + 3.5).abs() < f64::EPSILON);
        assert!((reading.wind_kmh - 18.0).abs() < 1e-9);
    }

    #[test]
    fn empty_timeseries_has_no_reading() {
        let forecast: Forecast =
            serde_json::from_str(r#"{"properties": {"timeseries": []}}"#).unwrap();
        assert!(first_reading(forecast).is_none());
    }
}
