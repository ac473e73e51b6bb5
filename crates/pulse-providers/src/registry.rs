//! Builds the enabled adapter set from configuration and the catalogue.

use std::sync::Arc;

use pulse_core::{AppConfig, Catalog, ProviderSettings, RankingCategory, PROVIDER_IDS};
use tokio::sync::Semaphore;

use crate::adapter::ProviderAdapter;
use crate::adapters::{
    alpha_vantage, gdelt, google_news, met_norway, open_meteo, AlphaVantageAdapter,
    GdeltAdapter, GoogleNewsAdapter, MetNorwayAdapter, OpenMeteoAdapter,
};
use crate::error::ProviderError;
use crate::http::build_client;

/// An adapter plus the semaphore that caps its in-flight requests.
///
/// The semaphore is shared by every cycle, so overlapping categories that
/// read the same provider stay within its rate budget together.
#[derive(Clone)]
pub struct ProviderHandle {
    adapter: Arc<dyn ProviderAdapter>,
    limiter: Arc<Semaphore>,
}

impl ProviderHandle {
    #[must_use]
    pub fn new(adapter: Arc<dyn ProviderAdapter>, max_in_flight: usize) -> Self {
        Self {
            adapter,
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    #[must_use]
    pub fn id(&self) -> &'static str {
        self.adapter.id()
    }

    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<Semaphore> {
        &self.limiter
    }
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderHandle>,
}

/// Why a known provider is not in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disabled {
    NotInCatalog,
    DisabledInCatalog,
    MissingKey(&'static str),
}

fn enablement<'a>(
    id: &str,
    settings: Option<&'a ProviderSettings>,
    config: &AppConfig,
) -> Result<&'a ProviderSettings, Disabled> {
    let settings = settings.ok_or(Disabled::NotInCatalog)?;
    if !settings.enabled {
        return Err(Disabled::DisabledInCatalog);
    }
    if id == alpha_vantage::ID && config.alpha_vantage_api_key.is_none() {
        return Err(Disabled::MissingKey("ALPHA_VANTAGE_API_KEY"));
    }
    Ok(settings)
}

impl ProviderRegistry {
    /// Builds every adapter that is configured, enabled and has its key.
    ///
    /// Missing keys soft-disable the adapter with a warning; they never
    /// stop the process.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] if the shared HTTP client cannot be built.
    pub fn from_config(config: &AppConfig, catalog: &Arc<Catalog>) -> Result<Self, ProviderError> {
        let client = build_client(&config.http_user_agent, config.provider_timeout_secs)?;
        let mut providers = Vec::new();

        for id in PROVIDER_IDS {
            let settings = match enablement(id, catalog.provider(id), config) {
                Ok(settings) => settings,
                Err(Disabled::NotInCatalog) => {
                    tracing::info!(provider = id, "provider not listed in catalogue; disabled");
                    continue;
                }
                Err(Disabled::DisabledInCatalog) => {
                    tracing::info!(provider = id, "provider disabled in catalogue");
                    continue;
                }
                Err(Disabled::MissingKey(var)) => {
                    tracing::warn!(provider = id, var, "API key not set; provider soft-disabled");
                    continue;
                }
            };

            let reliability = settings.reliability;
            let adapter: Arc<dyn ProviderAdapter> = match id {
                gdelt::ID => Arc::new(GdeltAdapter::new(client.clone(), reliability, Arc::clone(catalog))?),
                google_news::ID => Arc::new(GoogleNewsAdapter::new(
                    client.clone(),
                    reliability,
                    Arc::clone(catalog),
                )?),
                open_meteo::ID => Arc::new(OpenMeteoAdapter::new(
                    client.clone(),
                    reliability,
                    Arc::clone(catalog),
                )?),
                met_norway::ID => Arc::new(MetNorwayAdapter::new(
                    client.clone(),
                    reliability,
                    Arc::clone(catalog),
                )?),
                alpha_vantage::ID => {
                    let Some(key) = config.alpha_vantage_api_key.as_deref() else {
                        continue;
                    };
                    Arc::new(AlphaVantageAdapter::new(
                        client.clone(),
                        key,
                        reliability,
                        Arc::clone(catalog),
                    )?)
                }
                _ => continue,
            };

            tracing::info!(
                provider = id,
                reliability,
                max_in_flight = settings.max_in_flight,
                "provider enabled"
            );
            providers.push(ProviderHandle::new(adapter, settings.max_in_flight));
        }

        Ok(Self { providers })
    }

    #[must_use]
    pub fn from_handles(providers: Vec<ProviderHandle>) -> Self {
        Self { providers }
    }

    /// Providers that can produce signals for `category`.
    #[must_use]
    pub fn for_category(&self, category: RankingCategory) -> Vec<ProviderHandle> {
        self.providers
            .iter()
            .filter(|p| p.adapter.categories().contains(&category))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(ProviderHandle::id).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
