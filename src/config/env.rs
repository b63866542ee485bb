//! Environment overrides for the default tier.

use super::RequestOptions;
use std::time::Duration;

pub const ENV_BASE_URL: &str = "REQKIT_BASE_URL";
pub const ENV_BEARER_TOKEN: &str = "REQKIT_BEARER_TOKEN";
pub const ENV_TIMEOUT_MS: &str = "REQKIT_TIMEOUT_MS";
pub const ENV_RETRY: &str = "REQKIT_RETRY";
pub const ENV_MAX_RETRIES: &str = "REQKIT_MAX_RETRIES";
pub const ENV_MAP_ERRORS: &str = "REQKIT_MAP_ERRORS";
pub const ENV_THROW_ON_ERROR: &str = "REQKIT_THROW_ON_ERROR";

impl RequestOptions {
    /// Tier built from `REQKIT_*` environment variables. Unset or unparsable
    /// variables leave their field unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = RequestOptions::new();
        opts.base_url = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty());
        if let Some(token) = lookup(ENV_BEARER_TOKEN).filter(|v| !v.trim().is_empty()) {
            opts = opts.with_bearer_token(token);
        }
        opts.timeout = lookup(ENV_TIMEOUT_MS)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis);
        opts.retry = lookup(ENV_RETRY).as_deref().and_then(parse_flag);
        opts.max_retries = lookup(ENV_MAX_RETRIES).and_then(|v| v.trim().parse().ok());
        opts.map_errors = lookup(ENV_MAP_ERRORS).as_deref().and_then(parse_flag);
        opts.throw_on_error = lookup(ENV_THROW_ON_ERROR).as_deref().and_then(parse_flag);
        opts
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!(target: "reqkit::config", value = %other, "ignoring unrecognised boolean");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn reads_known_variables() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_BASE_URL, "https://api.example.com"),
            (ENV_TIMEOUT_MS, "2500"),
            (ENV_RETRY, "on"),
            (ENV_MAX_RETRIES, "5"),
            (ENV_MAP_ERRORS, "false"),
        ]);
        let opts = RequestOptions::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(opts.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(opts.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(opts.retry, Some(true));
        assert_eq!(opts.max_retries, Some(5));
        assert_eq!(opts.map_errors, Some(false));
        assert!(opts.throw_on_error.is_none());
        assert!(opts.bearer_token.is_none());
    }

    #[test]
    fn garbage_values_are_ignored() {
        let opts = RequestOptions::from_lookup(|k| match k {
            ENV_TIMEOUT_MS => Some("soon".into()),
            ENV_RETRY => Some("maybe".into()),
            _ => None,
        });
        assert!(opts.timeout.is_none());
        assert!(opts.retry.is_none());
    }
}
