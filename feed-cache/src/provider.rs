//! Providers and the registry the cache fetches through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::cache::{FeedKey, FeedSource};
use crate::compose::ResultComposer;
use crate::config::{ConfigError, ProviderConfig};
use crate::domain::StopsData;
use crate::entities::{EntityCache, StopClient};
use crate::fetch::{FeedFetcher, FetchClient, FetchError, HttpFetchClient};
use crate::ratelimit::RateLimiter;

/// One configured upstream: its fetcher, its composer, and its quota state.
pub struct Provider {
    fetcher: FeedFetcher,
    composer: ResultComposer,
    limiter: Arc<RateLimiter>,
    entities: Arc<EntityCache>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").finish_non_exhaustive()
    }
}

impl Provider {
    /// Build a provider from its config, sharing the given HTTP client.
    pub fn from_config(
        config: &ProviderConfig,
        client: Arc<dyn FetchClient>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let limiter = Arc::new(RateLimiter::new(config.rate_limit_reserve));
        let fetcher = FeedFetcher::new(
            client.clone(),
            config.feed_url.clone(),
            config.api_key.clone(),
            config.format,
            limiter.clone(),
        );

        let stop_client = StopClient::new(client, config.stops_url.clone(), config.api_key.clone());
        let entities = Arc::new(EntityCache::new(
            stop_client,
            config.stop_info_ttl,
            config.stop_info_capacity,
        ));
        let composer = ResultComposer::new(
            entities.clone(),
            config.monitored_stops.clone(),
            config.monitored_lines.clone(),
        );

        Ok(Self {
            fetcher,
            composer,
            limiter,
            entities,
        })
    }

    /// The entity cache backing this provider, for warm-up and association
    /// management.
    pub fn entities(&self) -> &Arc<EntityCache> {
        &self.entities
    }

    async fn load(&self) -> Result<StopsData, FetchError> {
        let events = self.fetcher.fetch().await?;
        Ok(self.composer.compose(&events).await)
    }
}

/// All configured providers, keyed by feed.
///
/// This is the production [`FeedSource`]: the cache asks it to load a key,
/// it routes the request to that key's provider and gates it on the
/// provider's rate limiter.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<FeedKey, Provider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configs. Each provider gets its own HTTP
    /// client so its configured socket timeout is honored.
    pub fn from_configs(
        configs: impl IntoIterator<Item = (FeedKey, ProviderConfig)>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for (key, config) in configs {
            let client: Arc<dyn FetchClient> = Arc::new(
                HttpFetchClient::new(config.socket_timeout)
                    .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
            );
            registry.register(key, Provider::from_config(&config, client)?);
        }
        Ok(registry)
    }

    /// Add a provider under a key. Replaces any previous provider there.
    pub fn register(&mut self, key: FeedKey, provider: Provider) {
        info!(%key, "registered feed provider");
        self.providers.insert(key, provider);
    }

    pub fn get(&self, key: &FeedKey) -> Option<&Provider> {
        self.providers.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &FeedKey> {
        self.providers.keys()
    }
}

#[async_trait]
impl FeedSource for ProviderRegistry {
    async fn load(&self, key: &FeedKey) -> Result<StopsData, FetchError> {
        match self.providers.get(key) {
            Some(provider) => provider.load().await,
            None => Err(FetchError::NotConfigured(key.as_str().to_string())),
        }
    }

    async fn fallback(&self, key: &FeedKey) -> StopsData {
        match self.providers.get(key) {
            Some(provider) => provider.composer.empty_payload().await,
            None => {
                warn!(%key, "fallback requested for unknown feed key");
                StopsData::default()
            }
        }
    }

    fn can_fetch(&self, key: &FeedKey) -> bool {
        // Unknown keys pass through so the load path reports the real error.
        self.providers
            .get(key)
            .is_none_or(|provider| provider.limiter.can_make_request())
    }
}
