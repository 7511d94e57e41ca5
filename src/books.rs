//! Google Books and OpenLibrary clients built on [`ApiService`].
//!
//! Query strings are passed through untouched; both remote APIs are treated
//! as opaque search services.

use serde::de::DeserializeOwned;

use crate::{
    wire::{OpenLibrarySearch, Volume, VolumeList},
    ApiError, ApiResult, ApiService, Payload, RequestOptions, Result, ServiceOptions,
};

pub const GOOGLE_BOOKS_BASE_URL: &str = "https://www.googleapis.com/books/v1";
pub const OPEN_LIBRARY_BASE_URL: &str = "https://openlibrary.org";

/// Google Books caps `maxResults` at 40.
pub const MAX_RESULTS_LIMIT: u32 = 40;

/// Decodes a JSON payload into `T`.
pub fn decode_json<T: DeserializeOwned>(payload: &Payload) -> Result<T> {
    let value = payload
        .as_json()
        .ok_or_else(|| ApiError::Decode("expected a JSON payload".to_owned()))?;
    T::deserialize(value).map_err(|err| ApiError::Decode(format!("unexpected JSON shape: {err}")))
}

impl VolumeList {
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        decode_json(payload)
    }
}

impl Volume {
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        decode_json(payload)
    }
}

impl OpenLibrarySearch {
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        decode_json(payload)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrderBy {
    Relevance,
    Newest,
}

impl OrderBy {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Newest => "newest",
        }
    }
}

/// Parameters for [`GoogleBooksClient::search`].
#[derive(Clone, Debug, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub start_index: u32,
    /// Clamped to `1..=40`.
    pub max_results: u32,
    pub order_by: Option<OrderBy>,
    /// Restricts results to a language (ISO 639-1 code).
    pub lang: Option<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            start_index: 0,
            max_results: 20,
            order_by: None,
            lang: None,
        }
    }

    pub fn page(mut self, start_index: u32, max_results: u32) -> Self {
        self.start_index = start_index;
        self.max_results = max_results;
        self
    }

    fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("q".to_owned(), self.query.trim().to_owned()),
            ("startIndex".to_owned(), self.start_index.to_string()),
            (
                "maxResults".to_owned(),
                self.max_results.clamp(1, MAX_RESULTS_LIMIT).to_string(),
            ),
        ];
        if let Some(order_by) = self.order_by {
            pairs.push(("orderBy".to_owned(), order_by.as_str().to_owned()));
        }
        if let Some(lang) = self.lang.as_deref().filter(|l| !l.trim().is_empty()) {
            pairs.push(("langRestrict".to_owned(), lang.trim().to_owned()));
        }
        pairs
    }
}

/// Google Books volumes API.
#[derive(Clone, Debug)]
pub struct GoogleBooksClient {
    service: ApiService,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    /// Uses a service whose `base_url` points at the Google Books API.
    pub fn new(service: ApiService) -> Self {
        Self {
            service,
            api_key: None,
        }
    }

    /// Service with default options against [`GOOGLE_BOOKS_BASE_URL`].
    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(ApiService::new(ServiceOptions::with_base_url(
            GOOGLE_BOOKS_BASE_URL,
        ))?))
    }

    /// Reads an optional API key from `GOOGLE_BOOKS_API_KEY`.
    ///
    /// An unset or blank variable leaves the client keyless, which Google
    /// accepts at a lower quota.
    pub fn from_env() -> Result<Self> {
        let client = Self::with_defaults()?;
        Ok(match std::env::var("GOOGLE_BOOKS_API_KEY") {
            Ok(key) if !key.trim().is_empty() => client.with_api_key(key),
            _ => client,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into().trim().to_owned());
        self
    }

    pub fn service(&self) -> &ApiService {
        &self.service
    }

    /// `GET /volumes?q=...`
    pub async fn search(&self, query: &SearchQuery) -> ApiResult {
        let mut options = RequestOptions::get();
        options.query = query.to_pairs();
        self.push_key(&mut options);
        self.service.request("/volumes", options).await
    }

    /// `GET /volumes/{id}`
    pub async fn volume(&self, volume_id: &str) -> ApiResult {
        let mut options = RequestOptions::get();
        self.push_key(&mut options);
        let endpoint = format!("/volumes/{}", encode_segment(volume_id.trim()));
        self.service.request(&endpoint, options).await
    }

    fn push_key(&self, options: &mut RequestOptions) {
        if let Some(key) = &self.api_key {
            options.query.push(("key".to_owned(), key.clone()));
        }
    }
}

/// OpenLibrary search API.
#[derive(Clone, Debug)]
pub struct OpenLibraryClient {
    service: ApiService,
}

impl OpenLibraryClient {
    pub fn new(service: ApiService) -> Self {
        Self { service }
    }

    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(ApiService::new(ServiceOptions::with_base_url(
            OPEN_LIBRARY_BASE_URL,
        ))?))
    }

    pub fn service(&self) -> &ApiService {
        &self.service
    }

    /// `GET /search.json?q=...&limit=...&page=...` (`page` is 1-based).
    pub async fn search(&self, query: &str, limit: u32, page: u32) -> ApiResult {
        let options = RequestOptions::get()
            .query_pair("q", query.trim())
            .query_pair("limit", limit.max(1).to_string())
            .query_pair("page", page.max(1).to_string());
        self.service.request("/search.json", options).await
    }
}

fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
