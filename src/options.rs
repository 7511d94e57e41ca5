use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};

use crate::{ApiError, Result};

/// Requests-per-window budget used to space out dispatches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateLimit {
    /// Number of requests allowed per window.
    pub requests: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl RateLimit {
    /// Minimum spacing between two dispatches (`window_ms / requests`).
    pub fn min_interval(&self) -> Duration {
        let requests = u64::from(self.requests.max(1));
        Duration::from_micros(self.window_ms.saturating_mul(1_000) / requests)
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests: 10,
            window_ms: 60_000,
        }
    }
}

/// Configures URL prefix, timeout, retry, rate limiting and default headers.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceOptions {
    /// Prefix joined to relative endpoint paths. May be empty when every
    /// call passes an absolute URL.
    pub base_url: String,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Total attempts per logical request, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Growth factor applied to the delay for each further attempt.
    pub retry_multiplier: f64,
    /// Dispatch spacing budget.
    pub rate_limit: RateLimit,
    /// Headers sent with every request unless the caller overrides them.
    pub default_headers: Vec<(String, String)>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: 10_000,
            max_attempts: 3,
            retry_base_delay_ms: 1_000,
            retry_multiplier: 1.5,
            rate_limit: RateLimit::default(),
            default_headers: Vec::new(),
        }
    }
}

impl ServiceOptions {
    /// Options with the given base URL and every other field defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Checks that every tunable is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ApiError::Config("max_attempts must be at least 1".to_owned()));
        }
        if self.timeout_ms == 0 {
            return Err(ApiError::Config("timeout_ms must be at least 1".to_owned()));
        }
        if self.rate_limit.requests == 0 {
            return Err(ApiError::Config(
                "rate_limit.requests must be at least 1".to_owned(),
            ));
        }
        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return Err(ApiError::Config(format!(
                "retry_multiplier must be a finite number >= 1, got {}",
                self.retry_multiplier
            )));
        }

        let base = self.base_url.trim();
        if !base.is_empty() {
            let parsed = url::Url::parse(base).map_err(|err| {
                ApiError::Config(format!("invalid base_url '{base}': {err}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ApiError::Config(format!(
                    "base_url must use http or https, got '{}'",
                    parsed.scheme()
                )));
            }
        }

        for (name, value) in &self.default_headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                ApiError::Config(format!("invalid default header name '{name}'"))
            })?;
            HeaderValue::from_str(value).map_err(|_| {
                ApiError::Config(format!("invalid value for default header '{name}'"))
            })?;
        }

        Ok(())
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{RateLimit, ServiceOptions};
    use crate::ApiError;

    #[test]
    fn defaults_match_documented_values() {
        let opts = ServiceOptions::default();
        assert_eq!(opts.timeout_ms, 10_000);
        assert_eq!(opts.max_attempts, 3);
        assert_eq!(opts.retry_base_delay_ms, 1_000);
        assert_eq!(opts.retry_multiplier, 1.5);
        assert_eq!(opts.rate_limit, RateLimit { requests: 10, window_ms: 60_000 });
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn min_interval_divides_window() {
        assert_eq!(RateLimit::default().min_interval(), Duration::from_secs(6));
        let fine = RateLimit { requests: 3, window_ms: 1_000 };
        assert_eq!(fine.min_interval(), Duration::from_micros(333_333));
    }

    #[test]
    fn rejects_zero_attempts() {
        let opts = ServiceOptions {
            max_attempts: 0,
            ..ServiceOptions::default()
        };
        assert!(matches!(opts.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn rejects_shrinking_multiplier() {
        let opts = ServiceOptions {
            retry_multiplier: 0.5,
            ..ServiceOptions::default()
        };
        assert!(matches!(opts.validate(), Err(ApiError::Config(_))));

        let opts = ServiceOptions {
            retry_multiplier: f64::NAN,
            ..ServiceOptions::default()
        };
        assert!(matches!(opts.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let opts = ServiceOptions::with_base_url("ftp://books.example.com");
        assert!(matches!(opts.validate(), Err(ApiError::Config(_))));

        let opts = ServiceOptions::with_base_url("not a url");
        assert!(matches!(opts.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn rejects_invalid_default_header() {
        let opts = ServiceOptions {
            default_headers: vec![("bad header".to_owned(), "x".to_owned())],
            ..ServiceOptions::default()
        };
        assert!(matches!(opts.validate(), Err(ApiError::Config(_))));
    }
}
