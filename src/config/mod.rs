//! Configuration Resolver
//!
//! A call is configured by three tiers, merged in strict order
//! `default < instance < per-call`:
//!
//! - [`RequestOptions`] is one tier; every field is optional
//! - [`resolve`] merges three tiers into an [`EffectiveConfig`]
//!
//! Scalars merge field by field, later tiers winning. Header maps merge in a
//! separate union step so that a tier setting one header never drops the
//! headers of the tiers below it.

mod env;

use crate::defaults;
use crate::execution::errors::ErrorMapping;
use crate::execution::hooks::RequestHooks;
use crate::execution::http::headers::{normalize_header_name, resolve_headers};
use crate::types::{CorsMode, ProgressCallback, RequestBody, RequestInit};
use reqwest::header::HeaderMap;
use secrecy::SecretString;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// One configuration tier.
///
/// Unset fields fall through to lower tiers and finally to
/// [`RequestOptions::defaults`]. Header names are stored lower-cased.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub base_url: Option<String>,
    pub bearer_token: Option<SecretString>,
    pub timeout: Option<Duration>,
    pub retry: Option<bool>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub polling: Option<bool>,
    pub polling_interval: Option<Duration>,
    pub with_cache: Option<bool>,
    pub revalidate_cache: Option<Duration>,
    pub with_credentials: Option<bool>,
    pub parse_json: Option<bool>,
    pub stringify_payload: Option<bool>,
    pub cors_mode: Option<CorsMode>,
    pub headers: HashMap<String, String>,
    pub hooks: Option<Arc<dyn RequestHooks>>,
    pub error_mapping: Option<ErrorMapping>,
    pub on_upload_progress: Option<ProgressCallback>,
    pub on_download_progress: Option<ProgressCallback>,
    pub use_progress_transport: Option<bool>,
    pub map_errors: Option<bool>,
    pub throw_on_error: Option<bool>,
    pub body: Option<RequestBody>,
    pub params: Option<Vec<(String, String)>>,
    pub init: RequestInit,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in tier: every field the resolver needs is set.
    pub fn defaults() -> Self {
        Self {
            base_url: Some(String::new()),
            timeout: Some(defaults::http::REQUEST_TIMEOUT),
            retry: Some(false),
            max_retries: Some(defaults::http::MAX_RETRIES),
            retry_delay: Some(defaults::http::RETRY_DELAY),
            polling: Some(false),
            polling_interval: Some(defaults::polling::INTERVAL),
            with_cache: Some(false),
            revalidate_cache: Some(defaults::cache::REVALIDATE_AFTER),
            with_credentials: Some(false),
            parse_json: Some(true),
            stringify_payload: Some(true),
            cors_mode: Some(CorsMode::Cors),
            use_progress_transport: Some(false),
            map_errors: Some(false),
            throw_on_error: Some(false),
            ..Self::default()
        }
    }

    /// Overlay `other` onto `self`: `Some` scalars in `other` win, headers
    /// are unioned with `other` winning per name.
    pub fn overlay(&mut self, other: RequestOptions) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            base_url,
            bearer_token,
            timeout,
            retry,
            max_retries,
            retry_delay,
            polling,
            polling_interval,
            with_cache,
            revalidate_cache,
            with_credentials,
            parse_json,
            stringify_payload,
            cors_mode,
            hooks,
            error_mapping,
            on_upload_progress,
            on_download_progress,
            use_progress_transport,
            map_errors,
            throw_on_error,
            body,
            params,
        );
        self.headers.extend(other.headers);
        self.init.overlay(other.init);
    }

    /// `self` overlaid with `other`, leaving both inputs untouched.
    pub fn merged(&self, other: &RequestOptions) -> RequestOptions {
        let mut out = self.clone();
        out.overlay(other.clone());
        out
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn with_polling(mut self, polling: bool) -> Self {
        self.polling = Some(polling);
        self
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = Some(interval);
        self
    }

    pub fn with_cache(mut self, with_cache: bool) -> Self {
        self.with_cache = Some(with_cache);
        self
    }

    pub fn with_revalidate_cache(mut self, after: Duration) -> Self {
        self.revalidate_cache = Some(after);
        self
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = Some(with_credentials);
        self
    }

    pub fn with_parse_json(mut self, parse_json: bool) -> Self {
        self.parse_json = Some(parse_json);
        self
    }

    pub fn with_stringify_payload(mut self, stringify: bool) -> Self {
        self.stringify_payload = Some(stringify);
        self
    }

    pub fn with_cors_mode(mut self, mode: CorsMode) -> Self {
        self.cors_mode = Some(mode);
        self
    }

    /// Add one header. Names are case-insensitive.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(normalize_header_name(name.as_ref()), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self.headers
                .insert(normalize_header_name(k.as_ref()), v.into());
        }
        self
    }

    pub fn with_hooks(mut self, hooks: impl RequestHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    pub fn with_shared_hooks(mut self, hooks: Arc<dyn RequestHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_error_mapping(mut self, mapping: ErrorMapping) -> Self {
        self.error_mapping = Some(mapping);
        self
    }

    pub fn on_upload_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(crate::types::Progress) + Send + Sync + 'static,
    {
        self.on_upload_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_download_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(crate::types::Progress) + Send + Sync + 'static,
    {
        self.on_download_progress = Some(Arc::new(callback));
        self
    }

    pub fn with_progress_transport(mut self, enabled: bool) -> Self {
        self.use_progress_transport = Some(enabled);
        self
    }

    pub fn with_map_errors(mut self, map_errors: bool) -> Self {
        self.map_errors = Some(map_errors);
        self
    }

    pub fn with_throw_on_error(mut self, throw_on_error: bool) -> Self {
        self.throw_on_error = Some(throw_on_error);
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    pub fn with_init(mut self, init: RequestInit) -> Self {
        self.init = init;
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("max_retries", &self.max_retries)
            .field("polling", &self.polling)
            .field("with_cache", &self.with_cache)
            .field("headers", &self.headers)
            .field("hooks", &self.hooks.is_some())
            .field("map_errors", &self.map_errors)
            .field("throw_on_error", &self.throw_on_error)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// Fully merged, immutable per-call configuration.
#[derive(Clone)]
pub struct EffectiveConfig {
    pub base_url: String,
    pub bearer_token: Option<SecretString>,
    pub timeout: Duration,
    pub retry: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub polling: bool,
    pub polling_interval: Duration,
    pub with_cache: bool,
    pub revalidate_cache: Duration,
    pub with_credentials: bool,
    pub parse_json: bool,
    pub stringify_payload: bool,
    pub cors_mode: CorsMode,
    pub headers: HeaderMap,
    pub hooks: Option<Arc<dyn RequestHooks>>,
    pub error_mapping: ErrorMapping,
    pub on_upload_progress: Option<ProgressCallback>,
    pub on_download_progress: Option<ProgressCallback>,
    pub use_progress_transport: bool,
    pub map_errors: bool,
    pub throw_on_error: bool,
    pub body: Option<RequestBody>,
    pub params: Vec<(String, String)>,
    pub init: RequestInit,
}

impl EffectiveConfig {
    /// Full URL for `url`. Absolute URLs bypass the base URL.
    pub fn full_url(&self, url: &str) -> String {
        build_url(&self.base_url, url, &self.params)
    }
}

impl fmt::Debug for EffectiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectiveConfig")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("max_retries", &self.max_retries)
            .field("with_cache", &self.with_cache)
            .field("revalidate_cache", &self.revalidate_cache)
            .field("headers", &self.headers)
            .field("use_progress_transport", &self.use_progress_transport)
            .field("map_errors", &self.map_errors)
            .field("throw_on_error", &self.throw_on_error)
            .finish_non_exhaustive()
    }
}

/// Merge three tiers into one effective configuration.
///
/// Never fails: fields no tier sets fall back to [`RequestOptions::defaults`],
/// and header entries that are not valid HTTP are dropped with a warning.
pub fn resolve(
    default: &RequestOptions,
    instance: &RequestOptions,
    per_call: &RequestOptions,
) -> EffectiveConfig {
    let headers = resolve_headers([&default.headers, &instance.headers, &per_call.headers]);

    let mut merged = RequestOptions::defaults();
    merged.overlay(default.clone());
    merged.overlay(instance.clone());
    merged.overlay(per_call.clone());

    EffectiveConfig {
        base_url: merged.base_url.unwrap_or_default(),
        bearer_token: merged.bearer_token,
        timeout: merged.timeout.unwrap_or(defaults::http::REQUEST_TIMEOUT),
        retry: merged.retry.unwrap_or(false),
        max_retries: merged.max_retries.unwrap_or(defaults::http::MAX_RETRIES),
        retry_delay: merged.retry_delay.unwrap_or(defaults::http::RETRY_DELAY),
        polling: merged.polling.unwrap_or(false),
        polling_interval: merged.polling_interval.unwrap_or(defaults::polling::INTERVAL),
        with_cache: merged.with_cache.unwrap_or(false),
        revalidate_cache: merged
            .revalidate_cache
            .unwrap_or(defaults::cache::REVALIDATE_AFTER),
        with_credentials: merged.with_credentials.unwrap_or(false),
        parse_json: merged.parse_json.unwrap_or(true),
        stringify_payload: merged.stringify_payload.unwrap_or(true),
        cors_mode: merged.cors_mode.unwrap_or_default(),
        headers,
        hooks: merged.hooks,
        error_mapping: merged.error_mapping.unwrap_or_default(),
        on_upload_progress: merged.on_upload_progress,
        on_download_progress: merged.on_download_progress,
        use_progress_transport: merged.use_progress_transport.unwrap_or(false),
        map_errors: merged.map_errors.unwrap_or(false),
        throw_on_error: merged.throw_on_error.unwrap_or(false),
        body: merged.body,
        params: merged.params.unwrap_or_default(),
        init: merged.init,
    }
}

/// Join a base URL, a request URL and query pairs.
pub fn build_url(base_url: &str, url: &str, params: &[(String, String)]) -> String {
    let is_absolute = url.starts_with("http://") || url.starts_with("https://");
    let mut full = if is_absolute || base_url.is_empty() {
        url.to_string()
    } else if url.is_empty() {
        base_url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    };

    if !params.is_empty() {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        full.push(if full.contains('?') { '&' } else { '?' });
        full.push_str(&query);
    }
    full
}
