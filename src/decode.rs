use reqwest::{header::HeaderMap, StatusCode};

use crate::{ApiError, Payload};

/// How a response body should be interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BodyKind {
    Json,
    Text,
    Binary,
}

pub(crate) fn body_kind(headers: &HeaderMap) -> BodyKind {
    let Some(content_type) = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return BodyKind::Binary;
    };

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == "application/json" || mime.ends_with("+json") {
        BodyKind::Json
    } else if mime.starts_with("text/") {
        BodyKind::Text
    } else {
        BodyKind::Binary
    }
}

pub(crate) fn decode_payload(kind: BodyKind, body: Vec<u8>) -> Result<Payload, ApiError> {
    match kind {
        BodyKind::Json => {
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Payload::Json(serde_json::Value::Null));
            }
            serde_json::from_slice(&body).map(Payload::Json).map_err(|err| {
                ApiError::Decode(format!(
                    "invalid JSON response: {err}; body: {}",
                    snippet(&body)
                ))
            })
        }
        BodyKind::Text => String::from_utf8(body).map(Payload::Text).map_err(|err| {
            ApiError::Decode(format!(
                "text response is not valid UTF-8: {}",
                err.utf8_error()
            ))
        }),
        BodyKind::Binary => Ok(Payload::Binary(body)),
    }
}

/// Pulls a human-readable message out of an error response.
///
/// The message is diagnostic only, so invalid UTF-8 is replaced rather than
/// rejected.
pub(crate) fn error_message(status: StatusCode, kind: BodyKind, body: &[u8]) -> String {
    if kind == BodyKind::Json {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
            if let Some(message) = json_error_message(&value) {
                return message;
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() && kind != BodyKind::Binary {
        return text.to_owned();
    }

    status
        .canonical_reason()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

fn json_error_message(value: &serde_json::Value) -> Option<String> {
    let non_empty = |v: &serde_json::Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };

    if let Some(message) = value.get("message").and_then(non_empty) {
        return Some(message);
    }
    let error = value.get("error")?;
    non_empty(error).or_else(|| error.get("message").and_then(non_empty))
}

fn snippet(body: &[u8]) -> String {
    const LIMIT: usize = 200;
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{
        header::{HeaderMap, HeaderValue, CONTENT_TYPE},
        StatusCode,
    };
    use serde_json::json;

    use super::{body_kind, decode_payload, error_message, BodyKind};
    use crate::{ApiError, Payload};

    fn headers(content_type: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        map
    }

    #[test]
    fn content_type_dispatch() {
        assert_eq!(body_kind(&headers("application/json")), BodyKind::Json);
        assert_eq!(
            body_kind(&headers("Application/JSON; charset=UTF-8")),
            BodyKind::Json
        );
        assert_eq!(body_kind(&headers("application/problem+json")), BodyKind::Json);
        assert_eq!(body_kind(&headers("text/html")), BodyKind::Text);
        assert_eq!(body_kind(&headers("image/jpeg")), BodyKind::Binary);
        assert_eq!(body_kind(&HeaderMap::new()), BodyKind::Binary);
    }

    #[test]
    fn decodes_json_text_and_binary() {
        let payload = decode_payload(BodyKind::Json, br#"{"items":[]}"#.to_vec()).unwrap();
        assert_eq!(payload, Payload::Json(json!({"items": []})));

        let payload = decode_payload(BodyKind::Text, b"plain".to_vec()).unwrap();
        assert_eq!(payload, Payload::Text("plain".to_owned()));

        let payload = decode_payload(BodyKind::Binary, vec![0xff, 0x00]).unwrap();
        assert_eq!(payload, Payload::Binary(vec![0xff, 0x00]));
    }

    #[test]
    fn invalid_utf8_text_is_decode_error() {
        let err = decode_payload(BodyKind::Text, vec![b'o', b'k', 0xff, 0xfe]).unwrap_err();
        match err {
            ApiError::Decode(message) => assert!(message.contains("UTF-8")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn empty_json_body_is_null() {
        let payload = decode_payload(BodyKind::Json, Vec::new()).unwrap();
        assert_eq!(payload, Payload::Json(serde_json::Value::Null));
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let err = decode_payload(BodyKind::Json, b"{\"items\": [".to_vec()).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn error_message_prefers_json_fields() {
        let body = br#"{"message":"quota exceeded"}"#;
        assert_eq!(
            error_message(StatusCode::FORBIDDEN, BodyKind::Json, body),
            "quota exceeded"
        );

        let body = br#"{"error":"bad query"}"#;
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, BodyKind::Json, body),
            "bad query"
        );

        let body = br#"{"error":{"code":400,"message":"Missing query."}}"#;
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, BodyKind::Json, body),
            "Missing query."
        );
    }

    #[test]
    fn error_message_falls_back_to_text_then_status() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, BodyKind::Text, b"  upstream down \n"),
            "upstream down"
        );
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, BodyKind::Json, br#"{"other":1}"#),
            "{\"other\":1}"
        );
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, BodyKind::Text, b""),
            "Not Found"
        );
        assert_eq!(
            error_message(StatusCode::SERVICE_UNAVAILABLE, BodyKind::Binary, &[0xde, 0xad]),
            "Service Unavailable"
        );
    }
}
