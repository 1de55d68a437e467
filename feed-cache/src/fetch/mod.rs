//! Feed fetching: HTTP client seam, payload decoding, and the fetcher that
//! ties one endpoint to one bounded network call.

mod client;
mod decode;
mod error;
mod fetcher;

pub use client::{FetchClient, FetchResponse, HttpFetchClient};
pub use decode::{decode_gtfs_rt, decode_records};
pub(crate) use decode::LocalizedText;
pub use error::FetchError;
pub use fetcher::FeedFetcher;
