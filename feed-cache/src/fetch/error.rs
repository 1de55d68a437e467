//! Fetch error types.

/// Errors from a single feed fetch attempt.
///
/// These never reach waiting callers: the coalescing cache absorbs them and
/// serves a degraded result instead.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Invalid or missing API key
    #[error("unauthorized (invalid API key)")]
    Unauthorized,

    /// Throttled by the provider itself
    #[error("rate limited by provider")]
    RateLimited,

    /// Request URL could not be constructed
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    /// Payload could not be decoded
    #[error("decode error: {message}")]
    Decode { message: String },

    /// No provider configured for the requested feed
    #[error("no provider configured for feed: {0}")]
    NotConfigured(String),
}

impl FetchError {
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        FetchError::Decode {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FetchError::Api {
            status: 500,
            message: "Internal Server Error".into(),
        };
        assert_eq!(err.to_string(), "API error 500: Internal Server Error");

        let err = FetchError::decode("truncated feed");
        assert_eq!(err.to_string(), "decode error: truncated feed");

        let err = FetchError::NotConfigured("stib".into());
        assert!(err.to_string().contains("stib"));
    }
}
