//! `bookbuddy-api` is the request layer of the Book Buddy library manager.
//!
//! [`ApiService`] wraps a single logical HTTP call with:
//! - per-attempt timeouts and exponential-backoff retry
//! - dispatch spacing plus `429 Retry-After` cool-down
//! - content-type driven body parsing
//! - failures classified into user-facing messages
//!
//! Progress is reported through typed lifecycle events on an [`EventBus`].
//! [`GoogleBooksClient`] and [`OpenLibraryClient`] are thin consumers.

mod books;
mod classify;
mod client;
mod decode;
mod error;
mod events;
mod options;
mod rate_limit;
mod request;
mod retry;
mod types;
mod wire;

pub use books::{
    decode_json, GoogleBooksClient, OpenLibraryClient, OrderBy, SearchQuery,
    GOOGLE_BOOKS_BASE_URL, MAX_RESULTS_LIMIT, OPEN_LIBRARY_BASE_URL,
};
pub use classify::{
    user_message, GENERIC_MESSAGE, NETWORK_MESSAGE, NOT_FOUND_MESSAGE, RATE_LIMITED_MESSAGE,
    SERVER_ERROR_MESSAGE, TIMEOUT_MESSAGE,
};
pub use client::{ApiService, ServiceStats};
pub use error::{ApiError, ErrorKind};
pub use events::{EventBus, EventKind, FailureDetails, ServiceEvent, SubscriptionId};
pub use options::{RateLimit, ServiceOptions};
pub use request::{build_url, RequestBody, RequestOptions};
pub use retry::{backoff_delay, parse_retry_after, DEFAULT_RETRY_AFTER_MS, MAX_BACKOFF_MS};
pub use types::{ApiFailure, ApiResult, ApiSuccess, Payload};
pub use wire::{
    ImageLinks, IndustryIdentifier, OpenLibraryDoc, OpenLibrarySearch, Volume, VolumeInfo,
    VolumeList,
};

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, ApiError>;
