use serde::Serialize;

/// Failure category a caller can branch on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An attempt exceeded its time budget.
    Timeout,
    /// Connection, DNS or body transfer failure.
    NetworkFailure,
    /// The server answered `429 Too Many Requests`.
    RateLimited,
    /// Any other `4xx` status.
    ClientError(u16),
    /// Any `5xx` status.
    ServerError(u16),
    /// A successful response whose body could not be decoded.
    ParseError,
    /// Everything else, including invalid request construction.
    Unknown,
}

impl ErrorKind {
    /// Maps an HTTP status onto the taxonomy. Returns `None` for non-error codes.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            429 => Some(Self::RateLimited),
            400..=499 => Some(Self::ClientError(status)),
            500..=599 => Some(Self::ServerError(status)),
            _ => None,
        }
    }

    /// Whether another attempt could change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::NetworkFailure | Self::RateLimited | Self::ServerError(_)
        )
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The attempt did not finish within the configured timeout.
    #[error("request timeout after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Server asked us to slow down.
    #[error("rate limited (429), retry after {retry_after_ms} ms: {message}")]
    RateLimited { retry_after_ms: u64, message: String },
    /// Non-success HTTP status code with the extracted error message.
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    /// Response decoding error.
    #[error("decode error: {0}")]
    Decode(String),
    /// The request could not be built (bad URL, bad header, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Service options failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// Classifies the error into an [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transport(err) => {
                if err.is_timeout() {
                    ErrorKind::Timeout
                } else if err.is_builder() {
                    ErrorKind::Unknown
                } else {
                    ErrorKind::NetworkFailure
                }
            }
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Http { status, .. } => {
                ErrorKind::from_status(*status).unwrap_or(ErrorKind::Unknown)
            }
            Self::Decode(_) => ErrorKind::ParseError,
            Self::InvalidRequest(_) | Self::Config(_) => ErrorKind::Unknown,
        }
    }

    /// Text the server sent back, if any.
    ///
    /// Transport errors embed the request URL (and so the user's query) in
    /// their display string; only server-provided text feeds classification.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Http { message, .. } | Self::RateLimited { message, .. } => Some(message),
            _ => None,
        }
    }
}
