//! One bounded fetch against a provider feed endpoint.

use std::sync::Arc;

use tracing::debug;

use crate::config::FeedFormat;
use crate::domain::ArrivalEvent;
use crate::ratelimit::RateLimiter;

use super::client::FetchClient;
use super::decode::{decode_gtfs_rt, decode_records};
use super::error::FetchError;

/// Records the dataset API returns per page; one page covers every
/// monitored stop.
const PAGE_LIMIT: u32 = 100;

/// Performs one network call to a provider endpoint and decodes the payload
/// into normalized arrival events. Owns no shared state beyond the limiter
/// it reports quota headers to.
pub struct FeedFetcher {
    client: Arc<dyn FetchClient>,
    endpoint: String,
    api_key: String,
    format: FeedFormat,
    limiter: Arc<RateLimiter>,
}

impl FeedFetcher {
    pub fn new(
        client: Arc<dyn FetchClient>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        format: FeedFormat,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            format,
            limiter,
        }
    }

    /// Fetch and decode the feed once.
    ///
    /// Every completed response updates the rate limiter from its quota
    /// headers, error statuses included. Failures are reported to the
    /// caller (the coalescing cache), never swallowed.
    pub async fn fetch(&self) -> Result<Vec<ArrivalEvent>, FetchError> {
        let url = self.feed_url();
        let response = self.client.get(&url).await?;

        // The quota headers arrive on every response; this is the single
        // writer path for the limiter.
        self.limiter.update_from_headers(&response.headers);

        match response.status {
            401 | 403 => return Err(FetchError::Unauthorized),
            429 => return Err(FetchError::RateLimited),
            status if !(200..300).contains(&status) => {
                let message = String::from_utf8_lossy(&response.body)
                    .chars()
                    .take(500)
                    .collect();
                return Err(FetchError::Api { status, message });
            }
            _ => {}
        }

        let events = match self.format {
            FeedFormat::GtfsRealtime => decode_gtfs_rt(&response.body)?,
            FeedFormat::Json => decode_records(&response.body)?,
        };

        debug!(endpoint = %self.endpoint, count = events.len(), "decoded feed events");
        Ok(events)
    }

    fn feed_url(&self) -> String {
        match self.format {
            // The dataset API paginates and authenticates via query params.
            FeedFormat::Json => format!(
                "{}?limit={}&apikey={}",
                self.endpoint, PAGE_LIMIT, self.api_key
            ),
            FeedFormat::GtfsRealtime => format!("{}?apikey={}", self.endpoint, self.api_key),
        }
    }
}
