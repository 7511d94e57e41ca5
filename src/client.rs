use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use reqwest::{header, Method, StatusCode};
use tokio::time::{sleep, timeout};

use crate::{
    decode::{body_kind, decode_payload, error_message},
    events::{EventBus, FailureDetails, ServiceEvent},
    rate_limit::RateLimitGate,
    request::{build_url, merge_headers},
    retry::{backoff_delay, parse_retry_after, AttemptOutcome, DEFAULT_RETRY_AFTER_MS},
    ApiError, ApiFailure, ApiResult, ApiSuccess, Payload, RequestBody, RequestOptions, Result,
    ServiceOptions,
};

static NEXT_REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    let seq = NEXT_REQUEST_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("req_{}_{seq}", Utc::now().timestamp_millis())
}

/// Snapshot of a service's counters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceStats {
    /// Successful logical requests.
    pub request_count: u64,
    /// Failed logical requests.
    pub error_count: u64,
    pub last_request_at: Option<DateTime<Utc>>,
    pub is_rate_limited: bool,
    pub active_requests: usize,
}

#[derive(Debug, Default)]
struct Counters {
    request_count: u64,
    error_count: u64,
    last_request_at: Option<DateTime<Utc>>,
    active: HashSet<String>,
}

#[derive(Debug)]
struct Shared {
    counters: Mutex<Counters>,
    /// Held across an active-set change and its loading event, so observers
    /// see `true`/`false` in the order the set actually changed.
    transitions: Mutex<()>,
    gate: RateLimitGate,
    events: Arc<EventBus>,
}

impl Shared {
    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self) -> MutexGuard<'_, ()> {
        self.transitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a call's id in the active set for exactly as long as it lives.
///
/// Dropping it (normal exit, panic, or the caller dropping the future)
/// removes the id and emits the aggregate "loading stopped" signal when the
/// set becomes empty.
struct ActiveRequest {
    shared: Arc<Shared>,
    request_id: String,
}

impl ActiveRequest {
    fn register(shared: &Arc<Shared>, request_id: &str) -> Self {
        let _transition = shared.transition();
        let active_count = {
            let mut counters = shared.counters();
            counters.active.insert(request_id.to_owned());
            counters.active.len()
        };
        if active_count == 1 {
            shared.events.publish(&ServiceEvent::LoadingStateChanged {
                is_loading: true,
                active_count,
            });
        }
        Self {
            shared: Arc::clone(shared),
            request_id: request_id.to_owned(),
        }
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        let _transition = self.shared.transition();
        let (removed, active_count) = {
            let mut counters = self.shared.counters();
            let removed = counters.active.remove(&self.request_id);
            (removed, counters.active.len())
        };
        if removed && active_count == 0 {
            self.shared.events.publish(&ServiceEvent::LoadingStateChanged {
                is_loading: false,
                active_count,
            });
        }
    }
}

/// Resilient HTTP request service.
///
/// Cloning is cheap; clones share counters, the rate-limit gate and the
/// event bus.
#[derive(Clone)]
pub struct ApiService {
    http: reqwest::Client,
    options: Arc<ServiceOptions>,
    shared: Arc<Shared>,
}

impl fmt::Debug for ApiService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self
            .options
            .default_headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        f.debug_struct("ApiService")
            .field("base_url", &self.options.base_url)
            .field("timeout_ms", &self.options.timeout_ms)
            .field("max_attempts", &self.options.max_attempts)
            .field("default_headers", &header_names)
            .field("header_values", &"<redacted>")
            .finish()
    }
}

impl ApiService {
    /// Creates a service with its own event bus.
    pub fn new(options: ServiceOptions) -> Result<Self> {
        Self::with_event_bus(options, Arc::new(EventBus::new()))
    }

    /// Creates a service publishing to a shared event bus.
    pub fn with_event_bus(options: ServiceOptions, events: Arc<EventBus>) -> Result<Self> {
        options.validate()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(ApiError::Transport)?;
        Ok(Self {
            http,
            shared: Arc::new(Shared {
                counters: Mutex::new(Counters::default()),
                transitions: Mutex::new(()),
                gate: RateLimitGate::new(options.rate_limit),
                events,
            }),
            options: Arc::new(options),
        })
    }

    /// Convenience for a service with default options and `base_url`.
    pub fn from_base_url(base_url: impl Into<String>) -> Result<Self> {
        Self::new(ServiceOptions::with_base_url(base_url))
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.shared.events
    }

    pub fn stats(&self) -> ServiceStats {
        let is_rate_limited = self.shared.gate.is_rate_limited();
        let counters = self.shared.counters();
        ServiceStats {
            request_count: counters.request_count,
            error_count: counters.error_count,
            last_request_at: counters.last_request_at,
            is_rate_limited,
            active_requests: counters.active.len(),
        }
    }

    /// Zeroes the success and error counters. In-flight calls are untouched.
    pub fn reset_stats(&self) {
        let mut counters = self.shared.counters();
        counters.request_count = 0;
        counters.error_count = 0;
        counters.last_request_at = None;
    }

    pub fn is_loading(&self) -> bool {
        !self.shared.counters().active.is_empty()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.shared.gate.is_rate_limited()
    }

    pub async fn get(&self, endpoint: &str) -> ApiResult {
        self.request(endpoint, RequestOptions::get()).await
    }

    pub async fn get_with_query<K, V>(&self, endpoint: &str, query: &[(K, V)]) -> ApiResult
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = RequestOptions::get();
        options.query = query
            .iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();
        self.request(endpoint, options).await
    }

    pub async fn post_json(&self, endpoint: &str, body: serde_json::Value) -> ApiResult {
        self.request(endpoint, RequestOptions::json(Method::POST, body))
            .await
    }

    pub async fn put_json(&self, endpoint: &str, body: serde_json::Value) -> ApiResult {
        self.request(endpoint, RequestOptions::json(Method::PUT, body))
            .await
    }

    pub async fn delete(&self, endpoint: &str) -> ApiResult {
        self.request(endpoint, RequestOptions::method(Method::DELETE))
            .await
    }

    /// Runs one logical request to a terminal outcome.
    ///
    /// Never fails outright: every error, including an unbuildable URL,
    /// comes back as [`ApiResult::Failure`] with a user-facing message.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> ApiResult {
        let request_id = next_request_id();
        let url = build_url(&self.options.base_url, endpoint, &options.query);
        let url_text = match &url {
            Ok(url) => url.to_string(),
            Err(_) => endpoint.to_owned(),
        };

        let active = ActiveRequest::register(&self.shared, &request_id);

        let outcome = match url {
            Ok(url) => {
                self.shared.gate.acquire().await;
                self.run_attempts(&request_id, url, &options).await
            }
            Err(err) => Err(err),
        };

        let result = match outcome {
            Ok(data) => self.finish_success(request_id, &url_text, data),
            Err(err) => self.finish_failure(request_id, &url_text, &err),
        };
        drop(active);
        result
    }

    async fn run_attempts(
        &self,
        request_id: &str,
        url: url::Url,
        options: &RequestOptions,
    ) -> Result<Payload> {
        let max_attempts = options.max_attempts.unwrap_or(self.options.max_attempts).max(1);
        let attempt_timeout = options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.options.timeout());
        let headers = merge_headers(&self.options.default_headers, &options.headers)?;

        let mut attempt = 1u32;
        loop {
            self.shared.events.publish(&ServiceEvent::RequestStarted {
                request_id: request_id.to_owned(),
                url: url.to_string(),
                attempt,
                max_attempts,
            });

            #[cfg(feature = "tracing")]
            tracing::debug!(request_id, url = %url, attempt, max_attempts, "dispatching request");

            let outcome = self
                .attempt(&url, options, headers.clone(), attempt_timeout)
                .await;

            let (error, retry_after) = match outcome {
                AttemptOutcome::Success(payload) => return Ok(payload),
                AttemptOutcome::Terminal(error) => return Err(error),
                AttemptOutcome::Retryable { error, retry_after } => (error, retry_after),
            };

            if attempt >= max_attempts {
                return Err(error);
            }

            attempt += 1;
            let delay = retry_after.unwrap_or_else(|| {
                backoff_delay(
                    self.options.retry_base_delay_ms,
                    self.options.retry_multiplier,
                    attempt,
                )
            });

            #[cfg(feature = "tracing")]
            tracing::warn!(
                request_id,
                error = %error,
                next_attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "retryable failure, backing off"
            );

            sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        url: &url::Url,
        options: &RequestOptions,
        headers: header::HeaderMap,
        attempt_timeout: Duration,
    ) -> AttemptOutcome {
        let mut builder = self
            .http
            .request(options.method.clone(), url.clone())
            .headers(headers);
        builder = match &options.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Text(text)) => builder.body(text.clone()),
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes.clone()),
            None => builder,
        };

        let exchange = async {
            let response = builder.send().await.map_err(ApiError::Transport)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(ApiError::Transport)?;
            Ok::<_, ApiError>((status, headers, body.to_vec()))
        };

        let (status, headers, body) = match timeout(attempt_timeout, exchange).await {
            Ok(Ok(parts)) => parts,
            Ok(Err(error)) => return AttemptOutcome::from_error(error),
            Err(_) => {
                return AttemptOutcome::from_error(ApiError::Timeout {
                    timeout_ms: attempt_timeout.as_millis() as u64,
                })
            }
        };

        let kind = body_kind(&headers);
        if status.is_success() {
            return match decode_payload(kind, body) {
                Ok(payload) => AttemptOutcome::Success(payload),
                Err(error) => AttemptOutcome::Terminal(error),
            };
        }

        let message = error_message(status, kind, &body);
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = headers
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after)
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_AFTER_MS));
            self.shared.gate.mark_rate_limited(retry_after);

            #[cfg(feature = "tracing")]
            tracing::warn!(url = %url, retry_after_ms = retry_after.as_millis() as u64, "server rate limited request");

            return AttemptOutcome::Retryable {
                error: ApiError::RateLimited {
                    retry_after_ms: retry_after.as_millis() as u64,
                    message,
                },
                retry_after: Some(retry_after),
            };
        }

        AttemptOutcome::from_error(ApiError::Http {
            status: status.as_u16(),
            message,
        })
    }

    fn finish_success(&self, request_id: String, url: &str, data: Payload) -> ApiResult {
        let timestamp = Utc::now();
        {
            let mut counters = self.shared.counters();
            counters.request_count += 1;
            counters.last_request_at = Some(timestamp);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(request_id = %request_id, url, "request completed");

        self.shared.events.publish(&ServiceEvent::RequestCompleted {
            request_id: request_id.clone(),
            url: url.to_owned(),
            timestamp,
        });

        ApiResult::Success(ApiSuccess {
            data,
            request_id,
            timestamp,
        })
    }

    fn finish_failure(&self, request_id: String, url: &str, error: &ApiError) -> ApiResult {
        self.shared.counters().error_count += 1;
        let failure = ApiFailure::from_error(error, request_id);

        #[cfg(feature = "tracing")]
        tracing::info!(
            request_id = %failure.request_id,
            url,
            kind = ?failure.kind,
            error = %failure.raw_message,
            "request failed"
        );

        self.shared.events.publish(&ServiceEvent::RequestFailed {
            request_id: failure.request_id.clone(),
            url: url.to_owned(),
            error: FailureDetails {
                kind: failure.kind,
                raw_message: failure.raw_message.clone(),
                user_message: failure.user_message.clone(),
            },
            timestamp: failure.timestamp,
        });

        ApiResult::Failure(failure)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{next_request_id, ApiService};
    use crate::{classify, ApiError, ErrorKind, EventKind, ServiceEvent, ServiceOptions};

    #[test]
    fn request_ids_are_unique() {
        let a = next_request_id();
        let b = next_request_id();
        assert_ne!(a, b);
        assert!(a.starts_with("req_"));
    }

    #[test]
    fn construction_validates_options() {
        let err = ApiService::new(ServiceOptions {
            max_attempts: 0,
            ..ServiceOptions::default()
        })
        .expect_err("zero attempts must be rejected");
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn debug_redacts_header_values() {
        let service = ApiService::new(ServiceOptions {
            base_url: "https://api.example.com".to_owned(),
            default_headers: vec![("X-Api-Key".to_owned(), "secret-key".to_owned())],
            ..ServiceOptions::default()
        })
        .expect("options are valid");
        let debug = format!("{service:?}");
        assert!(debug.contains("X-Api-Key"));
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-key"));
    }

    #[tokio::test]
    async fn relative_endpoint_without_base_fails_without_leaking_active_state() {
        let service = ApiService::new(ServiceOptions::default()).expect("defaults are valid");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        service
            .events()
            .subscribe(move |event| sink.lock().unwrap().push(event.kind()));

        let result = service.get("/volumes").await;
        let failure = result.failure().expect("must fail");
        assert_eq!(failure.kind, ErrorKind::Unknown);
        assert_eq!(failure.user_message, classify::GENERIC_MESSAGE);

        let stats = service.stats();
        assert_eq!(stats.active_requests, 0);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.request_count, 0);
        assert!(!service.is_loading());

        let kinds = seen.lock().unwrap().clone();
        assert_eq!(
            kinds,
            vec![
                EventKind::LoadingStateChanged,
                EventKind::RequestFailed,
                EventKind::LoadingStateChanged,
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn loading_signal_alternates_under_parallel_calls() {
        let service = ApiService::new(ServiceOptions::default()).expect("defaults are valid");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        service
            .events()
            .subscribe_to(EventKind::LoadingStateChanged, move |event| {
                if let ServiceEvent::LoadingStateChanged { is_loading, .. } = event {
                    sink.lock().unwrap().push(*is_loading);
                }
            });

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    for _ in 0..2_000 {
                        let _ = service.get("/no-base").await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("task must not panic");
        }

        let values = seen.lock().unwrap().clone();
        assert!(!values.is_empty());
        assert_eq!(values.first(), Some(&true));
        assert_eq!(values.last(), Some(&false));
        for pair in values.windows(2) {
            assert_ne!(pair[0], pair[1], "loading signal repeated a state");
        }
        assert!(!service.is_loading());
    }

    #[test]
    fn reset_stats_zeroes_counters() {
        let service = ApiService::new(ServiceOptions::default()).expect("defaults are valid");
        service.shared.counters().error_count = 4;
        service.shared.counters().request_count = 2;
        service.reset_stats();
        let stats = service.stats();
        assert_eq!(stats.error_count, 0);
        assert_eq!(stats.request_count, 0);
        assert_eq!(stats.last_request_at, None);
    }
}
