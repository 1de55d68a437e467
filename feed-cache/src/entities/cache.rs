//! Long-TTL caches of slow-changing reference data.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::{LineId, StopId};

use super::StopInfo;
use super::client::StopClient;

/// Caches stop metadata and stop↔line associations.
///
/// Stop metadata refreshes lazily through the provider's stops dataset and
/// lives far longer than the realtime feed cache. The association map is
/// replaced wholesale on refresh so readers never see a partial update.
pub struct EntityCache {
    stops: MokaCache<StopId, Arc<StopInfo>>,
    associations: RwLock<Arc<HashMap<StopId, Vec<LineId>>>>,
    client: StopClient,
}

impl EntityCache {
    /// Create a cache with the given stop metadata TTL and capacity.
    pub fn new(client: StopClient, ttl: Duration, capacity: u64) -> Self {
        let stops = MokaCache::builder()
            .time_to_live(ttl)
            .max_capacity(capacity)
            .build();

        Self {
            stops,
            associations: RwLock::new(Arc::new(HashMap::new())),
            client,
        }
    }

    /// Look up stop metadata, fetching from the dataset on a miss.
    ///
    /// Never fails: a stop the dataset cannot resolve gets a placeholder
    /// whose name is the stop id. Placeholders are not cached, so the next
    /// lookup retries the dataset.
    pub async fn stop_info(&self, id: &StopId) -> Arc<StopInfo> {
        if let Some(info) = self.stops.get(id).await {
            return info;
        }

        match self.client.fetch_stop(id).await {
            Ok(Some(info)) => {
                let info = Arc::new(info);
                self.stops.insert(id.clone(), info.clone()).await;
                debug!(stop = %id, name = %info.name, "cached stop metadata");
                info
            }
            Ok(None) => StopInfo::placeholder(id),
            Err(e) => {
                warn!(stop = %id, error = %e, "stop metadata fetch failed, using placeholder");
                StopInfo::placeholder(id)
            }
        }
    }

    /// Cache-only lookup used on latency-bounded paths.
    ///
    /// Returns a placeholder on a miss rather than touching the network.
    pub async fn cached_stop_info(&self, id: &StopId) -> Arc<StopInfo> {
        match self.stops.get(id).await {
            Some(info) => info,
            None => StopInfo::placeholder(id),
        }
    }

    /// Pre-resolve metadata for the given stops (startup warm-up).
    pub async fn warm(&self, ids: &[StopId]) {
        for id in ids {
            self.stop_info(id).await;
        }
    }

    /// Atomically replace the stop↔line association map.
    pub async fn replace_associations(&self, map: HashMap<StopId, Vec<LineId>>) {
        let mut guard = self.associations.write().await;
        *guard = Arc::new(map);
    }

    /// Lines associated with a stop, if an association is known.
    pub async fn lines_for(&self, id: &StopId) -> Option<Vec<LineId>> {
        let guard = self.associations.read().await;
        guard.get(id).cloned()
    }

    /// Number of cached stop metadata entries (for monitoring).
    pub fn stop_entry_count(&self) -> u64 {
        self.stops.entry_count()
    }
}
