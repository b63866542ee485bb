//! HTTP Headers Utility
//!
//! Header union across configuration tiers and bearer-token injection.

use crate::error::FetchError;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Lower-case a header name so tier maps union case-insensitively.
pub fn normalize_header_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Union header maps in order; later maps win per name.
///
/// Entries that are not valid HTTP header names/values are skipped.
pub fn resolve_headers<'a, I>(tiers: I) -> HeaderMap
where
    I: IntoIterator<Item = &'a HashMap<String, String>>,
{
    let mut out = HeaderMap::new();
    for tier in tiers {
        apply_extra_headers(&mut out, tier);
    }
    out
}

/// Apply extra headers to a mutable HeaderMap, overriding same-named entries.
pub fn apply_extra_headers(base: &mut HeaderMap, extra: &HashMap<String, String>) {
    for (k, v) in extra {
        match (
            HeaderName::from_bytes(k.as_bytes()),
            HeaderValue::from_str(v),
        ) {
            (Ok(name), Ok(val)) => {
                base.insert(name, val);
            }
            _ => {
                tracing::warn!(target: "reqkit::http", header = %k, "dropping invalid header");
            }
        }
    }
}

/// Inject `Authorization: Bearer <token>` unless an explicit `Authorization`
/// header is already present. The explicit header always wins.
pub fn apply_bearer_token(
    headers: &mut HeaderMap,
    token: Option<&SecretString>,
) -> Result<(), FetchError> {
    let Some(token) = token else {
        return Ok(());
    };
    if headers.contains_key(AUTHORIZATION) {
        return Ok(());
    }
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|e| FetchError::Configuration(format!("Invalid bearer token format: {e}")))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

/// Set `Content-Type: application/json` unless one is already set.
pub fn ensure_json_content_type(headers: &mut HeaderMap) {
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn explicit_authorization_header_wins_over_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        apply_bearer_token(&mut headers, Some(&token("xyz"))).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Basic abc");
    }

    #[test]
    fn token_becomes_bearer_header() {
        let mut headers = HeaderMap::new();
        apply_bearer_token(&mut headers, Some(&token("xyz"))).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer xyz");
    }

    #[test]
    fn no_token_leaves_headers_untouched() {
        let mut headers = HeaderMap::new();
        apply_bearer_token(&mut headers, None).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn invalid_token_is_a_configuration_error() {
        let mut headers = HeaderMap::new();
        let err = apply_bearer_token(&mut headers, Some(&token("bad\ntoken"))).unwrap_err();
        assert!(matches!(err, FetchError::Configuration(_)));
    }

    #[test]
    fn resolve_headers_later_tier_wins_and_skips_invalid() {
        let a = HashMap::from([
            ("accept".to_string(), "text/plain".to_string()),
            ("bad header".to_string(), "x".to_string()),
        ]);
        let b = HashMap::from([("accept".to_string(), "application/json".to_string())]);
        let merged = resolve_headers([&a, &b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get("accept").unwrap(), "application/json");
    }

    #[test]
    fn json_content_type_is_not_overridden() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/vnd.api+json"));
        ensure_json_content_type(&mut headers);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/vnd.api+json");
    }
}
