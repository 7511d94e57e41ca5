use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{classify, ApiError, ErrorKind};

/// Parsed response body, chosen by the response's content type.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(value) => Some(value.as_slice()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiSuccess {
    pub data: Payload,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Terminal failure of a logical request.
///
/// `raw_message` is meant for logs; `user_message` is safe to show as-is.
#[derive(Clone, Debug, PartialEq, Serialize, thiserror::Error)]
#[error("{raw_message}")]
pub struct ApiFailure {
    pub kind: ErrorKind,
    pub raw_message: String,
    pub user_message: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ApiFailure {
    pub(crate) fn from_error(error: &ApiError, request_id: String) -> Self {
        let kind = error.kind();
        let raw_message = error.to_string();
        let user_message =
            classify::user_message(kind, error.server_message().unwrap_or_default()).to_owned();
        Self {
            kind,
            raw_message,
            user_message,
            request_id,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of [`ApiService::request`](crate::ApiService::request).
#[derive(Clone, Debug, PartialEq)]
pub enum ApiResult {
    Success(ApiSuccess),
    Failure(ApiFailure),
}

impl ApiResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn request_id(&self) -> &str {
        match self {
            Self::Success(success) => &success.request_id,
            Self::Failure(failure) => &failure.request_id,
        }
    }

    pub fn data(&self) -> Option<&Payload> {
        match self {
            Self::Success(success) => Some(&success.data),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Converts into a standard `Result`, so callers can use `?`.
    pub fn into_result(self) -> std::result::Result<ApiSuccess, ApiFailure> {
        match self {
            Self::Success(success) => Ok(success),
            Self::Failure(failure) => Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ApiFailure, ApiResult, Payload};
    use crate::{classify, ApiError, ErrorKind};

    #[test]
    fn payload_accessors() {
        let json = Payload::Json(json!({"a": 1}));
        assert_eq!(json.as_json(), Some(&json!({"a": 1})));
        assert_eq!(json.as_text(), None);

        let text = Payload::Text("hi".to_owned());
        assert_eq!(text.as_text(), Some("hi"));
        assert_eq!(text.as_bytes(), None);

        let bytes = Payload::Binary(vec![1, 2, 3]);
        assert_eq!(bytes.as_bytes(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn request_text_does_not_drive_classification() {
        let error = ApiError::InvalidRequest("invalid url 'http://x/volumes?q=timeout'".to_owned());
        let failure = ApiFailure::from_error(&error, "req-2".to_owned());
        assert!(failure.raw_message.contains("timeout"));
        assert_eq!(failure.user_message, classify::GENERIC_MESSAGE);

        let error = ApiError::Http {
            status: 504,
            message: "Gateway Timeout".to_owned(),
        };
        let failure = ApiFailure::from_error(&error, "req-3".to_owned());
        assert_eq!(failure.user_message, classify::TIMEOUT_MESSAGE);
    }

    #[test]
    fn failure_carries_classified_message() {
        let error = ApiError::Http {
            status: 404,
            message: "Not Found".to_owned(),
        };
        let failure = ApiFailure::from_error(&error, "req-1".to_owned());
        assert_eq!(failure.kind, ErrorKind::ClientError(404));
        assert_eq!(failure.raw_message, "http error 404: Not Found");
        assert_eq!(failure.user_message, classify::NOT_FOUND_MESSAGE);

        let result = ApiResult::Failure(failure.clone());
        assert!(!result.is_success());
        assert_eq!(result.request_id(), "req-1");
        assert_eq!(result.data(), None);
        assert_eq!(result.into_result(), Err(failure));
    }
}
