//! HTTP client seam.
//!
//! All network traffic goes through the `FetchClient` trait so tests can
//! substitute doubles instead of patching a shared client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;

use super::error::FetchError;

/// A raw HTTP response, detached from any particular client.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    /// A 200 response with the given body and no headers (test helper,
    /// but also useful for canned fixtures).
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Minimal HTTP capability the fetch layer needs.
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// Production client backed by `reqwest`.
///
/// The socket timeout is set at client construction and deliberately exceeds
/// the coalescing layer's caller timeout, so the caller-visible latency is
/// governed by the cache rather than the transport.
#[derive(Debug, Clone)]
pub struct HttpFetchClient {
    http: reqwest::Client,
}

impl HttpFetchClient {
    /// Build a client with the given socket-level timeout.
    pub fn new(socket_timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(socket_timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self.http.get(url).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
