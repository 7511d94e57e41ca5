//! Maps failures onto the short messages the interface layer shows to users.

use crate::ErrorKind;

pub const TIMEOUT_MESSAGE: &str = "Request timed out. Please check your connection and try again.";
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please wait a moment and try again.";
pub const NETWORK_MESSAGE: &str = "Network error. Please check your internet connection.";
pub const NOT_FOUND_MESSAGE: &str = "The requested resource was not found.";
pub const SERVER_ERROR_MESSAGE: &str = "Server error. Please try again later.";
pub const GENERIC_MESSAGE: &str = "An error occurred. Please try again.";

/// Picks the user-facing message for a failure.
///
/// `server_message` is text the remote side sent (an error body or status
/// reason), never a string that embeds the request URL. When it mentions a
/// timeout it wins over the kind, so a proxy's 504 still reads as a timeout.
pub fn user_message(kind: ErrorKind, server_message: &str) -> &'static str {
    if kind == ErrorKind::Timeout || mentions_timeout(server_message) {
        return TIMEOUT_MESSAGE;
    }

    match kind {
        ErrorKind::RateLimited => RATE_LIMITED_MESSAGE,
        ErrorKind::NetworkFailure => NETWORK_MESSAGE,
        ErrorKind::ClientError(404) => NOT_FOUND_MESSAGE,
        ErrorKind::ServerError(_) => SERVER_ERROR_MESSAGE,
        _ => GENERIC_MESSAGE,
    }
}

fn mentions_timeout(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("timeout") || lower.contains("timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_driven_messages() {
        assert_eq!(user_message(ErrorKind::Timeout, ""), TIMEOUT_MESSAGE);
        assert_eq!(user_message(ErrorKind::RateLimited, "429"), RATE_LIMITED_MESSAGE);
        assert_eq!(
            user_message(ErrorKind::NetworkFailure, "connection refused"),
            NETWORK_MESSAGE
        );
        assert_eq!(
            user_message(ErrorKind::ClientError(404), "Not Found"),
            NOT_FOUND_MESSAGE
        );
        assert_eq!(
            user_message(ErrorKind::ServerError(503), "Service Unavailable"),
            SERVER_ERROR_MESSAGE
        );
    }

    #[test]
    fn raw_timeout_text_overrides_kind() {
        assert_eq!(
            user_message(ErrorKind::ServerError(504), "upstream Timeout reached"),
            TIMEOUT_MESSAGE
        );
        assert_eq!(
            user_message(ErrorKind::NetworkFailure, "operation timed out"),
            TIMEOUT_MESSAGE
        );
    }

    #[test]
    fn everything_else_is_generic() {
        assert_eq!(user_message(ErrorKind::ClientError(400), "bad"), GENERIC_MESSAGE);
        assert_eq!(user_message(ErrorKind::ClientError(401), "nope"), GENERIC_MESSAGE);
        assert_eq!(user_message(ErrorKind::ParseError, "eof"), GENERIC_MESSAGE);
        assert_eq!(user_message(ErrorKind::Unknown, ""), GENERIC_MESSAGE);
    }
}
