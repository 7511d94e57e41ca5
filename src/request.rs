use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use url::Url;

use crate::ApiError;

/// Request body sent with every attempt of a call.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// Serialized as JSON with `Content-Type: application/json`.
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
}

/// Per-call options for [`ApiService::request`](crate::ApiService::request).
#[derive(Clone, Debug, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    /// Headers layered over the service defaults (these win).
    pub headers: Vec<(String, String)>,
    /// Query pairs appended to the URL, percent-encoded.
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Overrides the service's per-attempt timeout.
    pub timeout_ms: Option<u64>,
    /// Overrides the service's attempt budget.
    pub max_attempts: Option<u32>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout_ms: None,
            max_attempts: None,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn json(method: Method, body: serde_json::Value) -> Self {
        Self {
            method,
            body: Some(RequestBody::Json(body)),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query_pair(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

fn is_absolute(endpoint: &str) -> bool {
    let lower = endpoint.get(..8).unwrap_or(endpoint).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Joins `endpoint` to `base_url` and appends `query`.
///
/// Absolute endpoints are used as-is. Otherwise exactly one `/` separates
/// the base and the endpoint, whatever slashes either side carries.
pub fn build_url(base_url: &str, endpoint: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
    let endpoint = endpoint.trim();
    let joined = if is_absolute(endpoint) {
        endpoint.to_owned()
    } else {
        let base = base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(ApiError::InvalidRequest(format!(
                "relative endpoint '{endpoint}' needs a base_url"
            )));
        }
        let path = endpoint.trim_start_matches('/');
        if path.is_empty() {
            base.to_owned()
        } else {
            format!("{base}/{path}")
        }
    };

    let mut url = Url::parse(&joined)
        .map_err(|err| ApiError::InvalidRequest(format!("invalid url '{joined}': {err}")))?;
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url)
}

/// Layers caller headers over defaults. Names compare case-insensitively.
pub(crate) fn merge_headers(
    defaults: &[(String, String)],
    overrides: &[(String, String)],
) -> Result<HeaderMap, ApiError> {
    let mut map = HeaderMap::new();
    for (name, value) in defaults.iter().chain(overrides) {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ApiError::InvalidRequest(format!("invalid header name '{name}'")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| ApiError::InvalidRequest(format!("invalid value for header '{name}'")))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
