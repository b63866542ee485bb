//! Error normalization.
//!
//! Turns non-2xx responses and transport failures into [`RequestError`]s and
//! applies the caller's message mapping table.

use crate::defaults;
use crate::error::{ErrorStatus, RequestError};
use crate::execution::http::TransportError;
use crate::types::HttpResponse;
use crate::utils::cancel::AbortCause;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

/// Reserved pattern literals that match any network failure.
const NETWORK_PATTERNS: [&str; 2] = ["network_error", "fetch failed"];

/// Status/pattern to message table.
///
/// Lookup order for backend errors: exact status code, then the first pattern
/// matching the status code as a string or the status text. Patterns are
/// case-insensitive regexes; a pattern that is not a valid regex is matched
/// as a plain substring.
#[derive(Debug, Clone, Default)]
pub struct ErrorMapping {
    by_status: HashMap<u16, String>,
    patterns: Vec<PatternRule>,
}

#[derive(Debug, Clone)]
struct PatternRule {
    lowered: String,
    regex: Option<Regex>,
    message: String,
}

impl PatternRule {
    fn new(pattern: &str, message: String) -> Self {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .ok();
        Self {
            lowered: pattern.to_lowercase(),
            regex,
            message,
        }
    }

    fn matches(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        self.regex.as_ref().is_some_and(|r| r.is_match(text))
            || text.to_lowercase().contains(&self.lowered)
    }

    fn matches_failure(&self, status: ErrorStatus, message: &str) -> bool {
        if status == ErrorStatus::NetworkError && NETWORK_PATTERNS.contains(&self.lowered.as_str()) {
            return true;
        }
        if let Some(sentinel) = status.sentinel() {
            if self.lowered == sentinel.to_lowercase() {
                return true;
            }
        }
        self.matches(message)
    }
}

impl ErrorMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message for an exact status code.
    pub fn status(mut self, code: u16, message: impl Into<String>) -> Self {
        self.by_status.insert(code, message.into());
        self
    }

    /// Message for a pattern matched against status code, status text or
    /// transport failure message.
    pub fn pattern(mut self, pattern: impl AsRef<str>, message: impl Into<String>) -> Self {
        self.patterns
            .push(PatternRule::new(pattern.as_ref(), message.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.by_status.is_empty() && self.patterns.is_empty()
    }

    /// Mapped message for a backend (non-2xx) response.
    pub fn message_for_response(&self, status: u16, status_text: &str) -> Option<&str> {
        if let Some(message) = self.by_status.get(&status) {
            return Some(message);
        }
        let status_str = status.to_string();
        self.patterns
            .iter()
            .find(|rule| rule.matches(&status_str) || rule.matches(status_text))
            .map(|rule| rule.message.as_str())
    }

    /// Mapped message for a transport-level failure.
    pub fn message_for_failure(&self, status: ErrorStatus, message: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|rule| rule.matches_failure(status, message))
            .map(|rule| rule.message.as_str())
    }
}

/// Build the error object for a non-2xx response (only used under `map_errors`).
pub fn error_from_response(response: &HttpResponse, mapping: &ErrorMapping) -> RequestError {
    let status = response.status();
    let message = match mapping.message_for_response(status, response.status_text()) {
        Some(mapped) => mapped.to_string(),
        None if response.status_text().is_empty() => format!("HTTP {status}"),
        None => response.status_text().to_string(),
    };
    RequestError::new(message, ErrorStatus::Http(status))
}

/// Classify a transport failure.
///
/// An abort is a timeout only when the request's own timer fired, a
/// cancellation only when the caller cancelled, and a network error otherwise.
pub fn classify_failure(error: &TransportError, cause: AbortCause) -> ErrorStatus {
    match error {
        TransportError::Timeout => ErrorStatus::Timeout,
        TransportError::Network(_) => ErrorStatus::NetworkError,
        TransportError::Aborted => match cause {
            AbortCause::Timeout => ErrorStatus::Timeout,
            AbortCause::Canceled => ErrorStatus::Canceled,
            AbortCause::None => ErrorStatus::NetworkError,
        },
    }
}

/// Build the error object for a transport failure. Always produced,
/// regardless of `map_errors`.
pub fn error_from_failure(
    error: &TransportError,
    cause: AbortCause,
    mapping: &ErrorMapping,
) -> RequestError {
    let status = classify_failure(error, cause);
    let raw = match (error, status) {
        (TransportError::Network(message), _) => message.clone(),
        (_, ErrorStatus::Timeout) => defaults::messages::TIMEOUT.to_string(),
        (_, ErrorStatus::Canceled) => defaults::messages::CANCELED.to_string(),
        _ => defaults::messages::NETWORK_ERROR.to_string(),
    };
    let message = mapping
        .message_for_failure(status, &raw)
        .map(str::to_string)
        .unwrap_or(raw);
    RequestError::new(message, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn response(status: u16, text: &str) -> HttpResponse {
        HttpResponse::new(status, text, "http://x/", HeaderMap::new(), Vec::new())
    }

    #[test]
    fn exact_status_wins() {
        let mapping = ErrorMapping::new()
            .pattern("not found", "pattern")
            .status(404, "Not Found!");
        let err = error_from_response(&response(404, "Not Found"), &mapping);
        assert_eq!(err.message, "Not Found!");
        assert_eq!(err.status, ErrorStatus::Http(404));
    }

    #[test]
    fn pattern_matches_status_string_or_status_text() {
        let mapping = ErrorMapping::new().pattern("^5\\d\\d$", "Server down");
        assert_eq!(mapping.message_for_response(503, "Service Unavailable"), Some("Server down"));

        let mapping = ErrorMapping::new().pattern("UNAUTHORIZED", "Log in again");
        assert_eq!(mapping.message_for_response(401, "Unauthorized"), Some("Log in again"));
    }

    #[test]
    fn invalid_regex_falls_back_to_substring() {
        let mapping = ErrorMapping::new().pattern("gateway (", "Proxy trouble");
        assert_eq!(mapping.message_for_response(502, "Bad Gateway (upstream)"), Some("Proxy trouble"));
    }

    #[test]
    fn falls_back_to_status_text() {
        let err = error_from_response(&response(500, "Internal Server Error"), &ErrorMapping::new());
        assert_eq!(err.message, "Internal Server Error");
        let err = error_from_response(&response(599, ""), &ErrorMapping::new());
        assert_eq!(err.message, "HTTP 599");
    }

    #[test]
    fn classification_uses_abort_cause() {
        assert_eq!(
            classify_failure(&TransportError::Aborted, AbortCause::Timeout),
            ErrorStatus::Timeout
        );
        assert_eq!(
            classify_failure(&TransportError::Aborted, AbortCause::Canceled),
            ErrorStatus::Canceled
        );
        assert_eq!(
            classify_failure(&TransportError::Aborted, AbortCause::None),
            ErrorStatus::NetworkError
        );
        assert_eq!(
            classify_failure(&TransportError::Timeout, AbortCause::None),
            ErrorStatus::Timeout
        );
    }

    #[test]
    fn reserved_literals_map_network_failures() {
        let mapping = ErrorMapping::new().pattern("Fetch Failed", "You appear to be offline");
        let err = error_from_failure(
            &TransportError::Network("connection refused".into()),
            AbortCause::None,
            &mapping,
        );
        assert_eq!(err.message, "You appear to be offline");
        assert_eq!(err.status, ErrorStatus::NetworkError);

        // reserved literals do not swallow timeouts
        let err = error_from_failure(&TransportError::Timeout, AbortCause::None, &mapping);
        assert_eq!(err.message, defaults::messages::TIMEOUT);
    }

    #[test]
    fn failure_patterns_match_sentinel_and_message() {
        let mapping = ErrorMapping::new()
            .pattern("timeout", "Too slow")
            .pattern("refused", "Server refused");
        let err = error_from_failure(&TransportError::Aborted, AbortCause::Timeout, &mapping);
        assert_eq!(err.message, "Too slow");
        let err = error_from_failure(
            &TransportError::Network("tcp connect error: connection refused".into()),
            AbortCause::None,
            &mapping,
        );
        assert_eq!(err.message, "Server refused");
    }
}
