//! Coalescing cache for public-transport realtime feeds.
//!
//! Upstream open-data feeds are slow, strictly rate limited, and shared by
//! many concurrent consumers. This crate sits between them: it fetches each
//! configured provider's feed at most once per freshness window, coalesces
//! all concurrent callers onto that single fetch, tracks the provider's
//! documented quota headers, and degrades to the last published result (or
//! a well-formed empty shape) rather than ever failing a caller.
//!
//! The pieces compose bottom-up: [`fetch`] performs one bounded network
//! call and decodes it, [`compose`] folds the decoded events into the
//! published payload, [`provider`] pairs the two per configured upstream,
//! and [`cache`] owns the single-flight TTL logic over the whole registry.

pub mod cache;
pub mod compose;
pub mod config;
pub mod domain;
pub mod entities;
pub mod fetch;
pub mod provider;
pub mod ratelimit;

pub use cache::{FeedCache, FeedKey, FeedSource};
pub use compose::ResultComposer;
pub use config::{CacheConfig, ConfigError, FeedFormat, ProviderConfig};
pub use domain::{Arrival, Coordinates, LineId, StopId, StopStatus, StopsData};
pub use fetch::{FeedFetcher, FetchClient, FetchError, HttpFetchClient};
pub use provider::{Provider, ProviderRegistry};
pub use ratelimit::RateLimiter;
