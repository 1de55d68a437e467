//! Provider rate-limit tracking.
//!
//! Providers advertise their remaining call quota through response headers.
//! The limiter is purely passive: it never delays anything itself, it only
//! records what completed responses said and answers whether another fetch
//! may be admitted. Before the first observation it answers optimistically;
//! headers that fail to parse are treated as an exhausted quota.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};

/// Quota to keep in reserve rather than racing the limit to zero.
const DEFAULT_RESERVE: u64 = 100;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const LIMIT_HEADER: &str = "x-ratelimit-limit";
const RESET_HEADER: &str = "x-ratelimit-reset";

#[derive(Debug, Default)]
struct RateLimitState {
    remaining: u64,
    limit: u64,
    reset_at: Option<DateTime<Utc>>,
    initialized: bool,
}

/// Tracks one provider's remaining call quota.
///
/// Updated only from completed fetch responses; shared between the fetcher
/// (writer) and the coalescing cache (admission reader).
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateLimitState>,
    reserve: u64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVE)
    }
}

impl RateLimiter {
    /// Create a limiter keeping `reserve` calls as a safety buffer.
    pub fn new(reserve: u64) -> Self {
        Self {
            state: Mutex::new(RateLimitState::default()),
            reserve,
        }
    }

    /// Record the quota headers from a completed response.
    ///
    /// Missing or malformed reset timestamps default to one hour from now.
    /// If the numeric headers fail to parse the quota is treated as
    /// exhausted until that default reset passes.
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        let mut state = self.state.lock().expect("rate limit state poisoned");

        let parsed = parse_counter(headers, REMAINING_HEADER)
            .and_then(|remaining| parse_counter(headers, LIMIT_HEADER).map(|l| (remaining, l)));

        let (remaining, limit) = match parsed {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "could not parse rate limit headers, treating quota as exhausted");
                state.remaining = 0;
                state.limit = 0;
                state.reset_at = Some(Utc::now() + Duration::hours(1));
                state.initialized = true;
                return;
            }
        };

        let reset_at = parse_reset(headers);
        let previous = state.initialized.then_some(state.remaining);

        state.remaining = remaining;
        state.limit = limit;
        state.reset_at = Some(reset_at);

        if !state.initialized {
            state.initialized = true;
            info!(
                remaining,
                limit,
                reset_at = %reset_at,
                "initial API quota observed"
            );
        } else if let Some(previous) = previous {
            // Log each time the quota crosses a round hundred downwards.
            if remaining / 100 < previous / 100 {
                info!(
                    remaining,
                    limit,
                    reset_at = %reset_at,
                    "API quota crossed a hundred boundary"
                );
            }
        }

        debug!(remaining, limit, "rate limit updated");
    }

    /// Whether a fetch may be admitted right now.
    ///
    /// Optimistic before any observation. An exhausted quota admits again
    /// once the advertised reset time passes, at which point the state is
    /// cleared back to uninitialized.
    pub fn can_make_request(&self) -> bool {
        let mut state = self.state.lock().expect("rate limit state poisoned");

        if !state.initialized {
            return true;
        }

        if state.remaining == 0 {
            let reset_passed = state.reset_at.is_none_or(|reset| Utc::now() > reset);
            if reset_passed {
                *state = RateLimitState::default();
                return true;
            }
            info!(reset_at = ?state.reset_at, "rate limit exhausted, suppressing fetch");
            return false;
        }

        state.remaining > self.reserve
    }
}

#[derive(Debug, thiserror::Error)]
enum HeaderParseError {
    #[error("{header} is not visible ASCII")]
    NotAscii { header: &'static str },

    #[error("{header} is not an integer: {value}")]
    NotAnInteger { header: &'static str, value: String },
}

/// Parse an integer quota header. A missing header counts as zero; a header
/// that is present but unreadable is an error (fail closed).
fn parse_counter(headers: &HeaderMap, name: &'static str) -> Result<u64, HeaderParseError> {
    let Some(value) = headers.get(name) else {
        return Ok(0);
    };

    let text = value
        .to_str()
        .map_err(|_| HeaderParseError::NotAscii { header: name })?;

    // Negative values clamp to zero rather than failing.
    if let Ok(signed) = text.trim().parse::<i64>() {
        return Ok(signed.max(0) as u64);
    }

    Err(HeaderParseError::NotAnInteger {
        header: name,
        value: text.to_string(),
    })
}

/// Parse the reset timestamp header, defaulting to one hour from now.
fn parse_reset(headers: &HeaderMap) -> DateTime<Utc> {
    headers
        .get(RESET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc::now() + Duration::hours(1))
}
