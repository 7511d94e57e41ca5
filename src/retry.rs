use std::time::Duration;

use crate::{ApiError, Payload};

/// Upper bound for a computed backoff delay.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Cool-down applied to a 429 response without a usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

/// Delay inserted before `attempt` (1-based; the first attempt has none).
///
/// `min(base_ms * multiplier^(attempt - 2), MAX_BACKOFF_MS)`
pub fn backoff_delay(base_ms: u64, multiplier: f64, attempt: u32) -> Duration {
    if attempt < 2 {
        return Duration::ZERO;
    }
    let exp = (attempt - 2).min(64) as i32;
    let raw = base_ms as f64 * multiplier.powi(exp);
    let capped = if raw.is_finite() {
        raw.min(MAX_BACKOFF_MS as f64).max(0.0)
    } else {
        MAX_BACKOFF_MS as f64
    };
    Duration::from_millis(capped.round() as u64)
}

/// Parses a `Retry-After` header given in seconds.
///
/// HTTP-date values and garbage return `None`; callers fall back to
/// [`DEFAULT_RETRY_AFTER_MS`].
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds = value.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_millis((seconds * 1_000.0).round() as u64))
}

/// Result of one dispatch inside the retry loop.
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    Success(Payload),
    Retryable {
        error: ApiError,
        /// Server-directed delay that replaces the backoff delay.
        retry_after: Option<Duration>,
    },
    Terminal(ApiError),
}

impl AttemptOutcome {
    /// Sorts an error into retryable or terminal by its kind.
    pub(crate) fn from_error(error: ApiError) -> Self {
        if error.kind().is_retryable() {
            Self::Retryable {
                error,
                retry_after: None,
            }
        } else {
            Self::Terminal(error)
        }
    }
}
