//! Shared domain vocabulary and configuration for the Pulse ranking engine.
//!
//! Everything here is plain data: ranking enums, signals, entities, the
//! persisted ranking entry shape, process configuration read from the
//! environment, and the YAML catalogue of providers, categories and places.

pub mod app_config;
pub mod catalog;
pub mod config;
pub mod geo;
pub mod ranking;
pub mod signal;

pub use app_config::{AppConfig, Environment, OrphanPolicy};
pub use catalog::{
    load_catalog, CategorySettings, CityPlace, Catalog, CountryPlace, MarketConfig,
    ProviderSettings, StatePlace, WeatherPoint, PROVIDER_IDS,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use ranking::{
    Entity, EntityType, GroupKey, Period, RankingBasis, RankingCategory, RankingEntry,
    StatStyle, Trend, CALM_BASELINE_KMH, COLD_BASELINE_C,
};
pub use signal::{Attribution, Signal, TimeWindow};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read catalog file {path}: {source}")]
    CatalogFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog file: {0}")]
    CatalogFileParse(#[from] serde_yaml::Error),

    #[error("catalog validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
