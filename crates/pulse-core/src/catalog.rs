//! Catalogue of providers, categories and places, loaded from YAML.
//!
//! The catalogue is the engine's static knowledge: provider reliability
//! weights and rate-limit sizing, per-category cadence and decay, the
//! Google News editions to poll, the gazetteer of places weather is read
//! for (and news titles are matched against), and the market symbols that
//! stand in for each country's business activity.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geo;
use crate::ranking::RankingCategory;
use crate::signal::Attribution;
use crate::ConfigError;

/// Provider ids the engine ships adapters for.
pub const PROVIDER_IDS: [&str; 5] = [
    "gdelt",
    "google_news",
    "open_meteo",
    "met_norway",
    "alpha_vantage",
];

fn default_true() -> bool {
    true
}

fn default_max_in_flight() -> usize {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fixed weight `R` applied to every signal from this provider.
    pub reliability: f64,
    /// Upper bound on concurrent requests to this provider across cycles.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorySettings {
    /// Six-field cron expression (seconds first).
    pub cadence: Option<String>,
    /// Decay constant `λ`.
    pub decay: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityPlace {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePlace {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub cities: Vec<CityPlace>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryPlace {
    /// ISO-3166 alpha-2.
    pub code: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub states: Vec<StatePlace>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub symbol: String,
    pub country_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
    #[serde(default)]
    pub categories: BTreeMap<RankingCategory, CategorySettings>,
    /// Country codes of the Google News editions to poll.
    #[serde(default)]
    pub editions: Vec<String>,
    #[serde(default)]
    pub places: Vec<CountryPlace>,
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
}

/// A coordinate weather is read for, with the attribution its readings get.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherPoint {
    pub label: String,
    pub lat: f64,
    pub lon: f64,
    pub attribution: Attribution,
}

impl Catalog {
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&ProviderSettings> {
        self.providers.get(id)
    }

    #[must_use]
    pub fn decay(&self, category: RankingCategory) -> f64 {
        self.categories
            .get(&category)
            .and_then(|c| c.decay)
            .unwrap_or_else(|| category.default_decay())
    }

    #[must_use]
    pub fn cadence(&self, category: RankingCategory) -> String {
        self.categories
            .get(&category)
            .and_then(|c| c.cadence.clone())
            .unwrap_or_else(|| category.default_cadence().to_string())
    }

    /// Every place in the gazetteer, each attributed at its own level.
    #[must_use]
    pub fn weather_points(&self) -> Vec<WeatherPoint> {
        let mut points = Vec::new();
        for country in &self.places {
            let country_label = geo::country_name(&country.code).unwrap_or(&country.code);
            points.push(WeatherPoint {
                label: country_label.to_string(),
                lat: country.lat,
                lon: country.lon,
                attribution: Attribution::country(&country.code),
            });
            for state in &country.states {
                points.push(WeatherPoint {
                    label: state.name.clone(),
                    lat: state.lat,
                    lon: state.lon,
                    attribution: Attribution::Place {
                        country_code: country.code.clone(),
                        state: Some(state.name.clone()),
                        city: None,
                    },
                });
                for city in &state.cities {
                    points.push(WeatherPoint {
                        label: city.name.clone(),
                        lat: city.lat,
                        lon: city.lon,
                        attribution: Attribution::Place {
                            country_code: country.code.clone(),
                            state: Some(state.name.clone()),
                            city: Some(city.name.clone()),
                        },
                    });
                }
            }
        }
        points
    }

    /// The finest catalogue place of `country_code` named in `text`.
    ///
    /// Cities win over states. Matches are case-sensitive and must sit on
    /// word boundaries, so "Nice" does not match "Venice".
    #[must_use]
    pub fn find_place_mention(&self, country_code: &str, text: &str) -> Option<Attribution> {
        let country = self
            .places
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(country_code))?;

        for state in &country.states {
            if let Some(city) = state.cities.iter().find(|c| mentions(text, &c.name)) {
                return Some(Attribution::Place {
                    country_code: country.code.clone(),
                    state: Some(state.name.clone()),
                    city: Some(city.name.clone()),
                });
            }
        }

        country
            .states
            .iter()
            .find(|s| mentions(text, &s.name))
            .map(|state| Attribution::Place {
                country_code: country.code.clone(),
                state: Some(state.name.clone()),
                city: None,
            })
    }
}

/// Whether `name` occurs in `text` delimited by non-alphanumeric characters.
fn mentions(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    text.match_indices(name).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + name.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Load and validate the catalogue from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<Catalog, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let catalog: Catalog = serde_yaml::from_str(&content)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &Catalog) -> Result<(), ConfigError> {
    for (id, provider) in &catalog.providers {
        if !PROVIDER_IDS.contains(&id.as_str()) {
            return Err(ConfigError::Validation(format!("unknown provider id '{id}'")));
        }
        if !(provider.reliability > 0.0 && provider.reliability <= 1.0) {
            return Err(ConfigError::Validation(format!(
                "provider '{id}' has reliability {}; must be in (0, 1]",
                provider.reliability
            )));
        }
        if provider.max_in_flight == 0 {
            return Err(ConfigError::Validation(format!(
                "provider '{id}' has max_in_flight 0; must be at least 1"
            )));
        }
    }

    for (category, settings) in &catalog.categories {
        if let Some(decay) = settings.decay {
            if !decay.is_finite() || decay < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "category '{category}' has decay {decay}; must be finite and >= 0"
                )));
            }
        }
        if settings.cadence.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "category '{category}' has an empty cadence"
            )));
        }
    }

    for edition in &catalog.editions {
        require_known_country(edition, "edition")?;
    }

    let mut seen_countries = HashSet::new();
    for country in &catalog.places {
        require_known_country(&country.code, "place")?;
        if !seen_countries.insert(country.code.to_uppercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate country in places: '{}'",
                country.code
            )));
        }
        validate_coordinates(&country.code, country.lat, country.lon)?;

        let mut seen_states = HashSet::new();
        for state in &country.states {
            if state.name.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "state name must be non-empty (country '{}')",
                    country.code
                )));
            }
            if !seen_states.insert(state.name.to_lowercase()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate state '{}' in country '{}'",
                    state.name, country.code
                )));
            }
            validate_coordinates(&state.name, state.lat, state.lon)?;

            let mut seen_cities = HashSet::new();
            for city in &state.cities {
                if city.name.trim().is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "city name must be non-empty (state '{}')",
                        state.name
                    )));
                }
                if !seen_cities.insert(city.name.to_lowercase()) {
                    return Err(ConfigError::Validation(format!(
                        "duplicate city '{}' in state '{}'",
                        city.name, state.name
                    )));
                }
                validate_coordinates(&city.name, city.lat, city.lon)?;
            }
        }
    }

    for market in &catalog.markets {
        if market.symbol.trim().is_empty() {
            return Err(ConfigError::Validation(
                "market symbol must be non-empty".to_string(),
            ));
        }
        require_known_country(&market.country_code, "market")?;
    }

    Ok(())
}

fn require_known_country(code: &str, context: &str) -> Result<(), ConfigError> {
    if geo::is_known_code(code) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{context} references unknown country code '{code}'"
        )))
    }
}

fn validate_coordinates(label: &str, lat: f64, lon: f64) -> Result<(), ConfigError> {
    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "place '{label}' has invalid coordinates ({lat}, {lon})"
        )))
    }
}
