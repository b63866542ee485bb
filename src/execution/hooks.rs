//! Request hooks
//!
//! Hooks observe and reshape a call around the engine:
//! - `on_request` runs before the transport is invoked
//! - `on_error` runs inside the engine, where each error object is first produced
//! - `on_response` runs after the call settled
//!
//! A hook may mutate the [`RequestContext`] directly through its mutators,
//! return a [`ContextPatch`], or both. Mutators take effect immediately;
//! a returned patch is merged after the hook resolves, so patch fields land
//! on top of anything the mutators did. Patch headers are unioned into the
//! in-flight headers; every other field replaces.

use crate::config::{EffectiveConfig, RequestOptions};
use crate::error::{FetchError, RequestError};
use crate::execution::http::headers::normalize_header_name;
use crate::types::{Method, RequestBody, RequestResult};
use async_trait::async_trait;
use std::sync::Arc;

/// The in-flight `{method, url, options}` triple.
#[derive(Debug, Clone)]
pub struct CallSpec {
    pub method: Method,
    pub url: String,
    pub options: RequestOptions,
}

impl CallSpec {
    pub fn new(method: Method, url: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            method,
            url: url.into(),
            options,
        }
    }
}

/// Hook trait. All methods default to no-ops.
///
/// Returning `Err` fails the call; hook failures are never retried.
#[async_trait]
pub trait RequestHooks: Send + Sync {
    async fn on_request(
        &self,
        _ctx: &mut RequestContext,
    ) -> Result<Option<ContextPatch>, FetchError> {
        Ok(None)
    }

    async fn on_response(
        &self,
        _ctx: &mut RequestContext,
    ) -> Result<Option<ContextPatch>, FetchError> {
        Ok(None)
    }

    async fn on_error(
        &self,
        _ctx: &mut RequestContext,
    ) -> Result<Option<ContextPatch>, FetchError> {
        Ok(None)
    }
}

/// Partial update returned by a hook.
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    pub method: Option<Method>,
    pub url: Option<String>,
    pub options: Option<RequestOptions>,
    pub data: Option<serde_json::Value>,
    pub error: Option<RequestError>,
}

impl ContextPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        match self.options.as_mut() {
            Some(existing) => existing.overlay(options),
            None => self.options = Some(options),
        }
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.options
            .get_or_insert_with(RequestOptions::new)
            .headers
            .insert(normalize_header_name(name.as_ref()), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.options.get_or_insert_with(RequestOptions::new).body = Some(body.into());
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn error(mut self, error: RequestError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Mutable state threaded through the hooks of one call.
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    config: Arc<EffectiveConfig>,
    request: CallSpec,
    result: Option<RequestResult>,
    error: Option<RequestError>,
}

impl RequestContext {
    pub(crate) fn new(config: Arc<EffectiveConfig>, request: CallSpec) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            config,
            request,
            result: None,
            error: None,
        }
    }

    pub(crate) fn replace_config(&mut self, config: Arc<EffectiveConfig>) {
        self.config = config;
    }

    pub(crate) fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Configuration resolved for this call. Re-resolved after `on_request`.
    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    pub fn request(&self) -> &CallSpec {
        &self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn options(&self) -> &RequestOptions {
        &self.request.options
    }

    /// Settled result; `None` until the transport has run.
    pub fn result(&self) -> Option<&RequestResult> {
        self.result.as_ref()
    }

    pub fn result_mut(&mut self) -> Option<&mut RequestResult> {
        self.result.as_mut()
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    /// Union headers into the in-flight options.
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (k, v) in headers {
            self.request
                .options
                .headers
                .insert(normalize_header_name(k.as_ref()), v.into());
        }
        self
    }

    pub fn set_body(&mut self, body: impl Into<RequestBody>) -> &mut Self {
        self.request.options.body = Some(body.into());
        self
    }

    /// Overlay options onto the in-flight options.
    pub fn set_options(&mut self, options: RequestOptions) -> &mut Self {
        self.request.options.overlay(options);
        self
    }

    pub fn set_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.request.url = url.into();
        self
    }

    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.request.method = method;
        self
    }

    /// Replace (or clear) the current error.
    pub fn set_error(&mut self, error: Option<RequestError>) -> &mut Self {
        self.error = error;
        self
    }

    /// Merge a returned patch on top of the current state.
    pub fn apply_patch(&mut self, patch: ContextPatch) {
        if let Some(method) = patch.method {
            self.request.method = method;
        }
        if let Some(url) = patch.url {
            self.request.url = url;
        }
        if let Some(options) = patch.options {
            self.request.options.overlay(options);
        }
        if let Some(data) = patch.data {
            if let Some(result) = self.result.as_mut() {
                result.data = Some(data);
            }
        }
        if let Some(error) = patch.error {
            self.error = Some(error);
        }
    }

    /// Store the settled result; its error becomes the context error.
    pub(crate) fn store_result(&mut self, result: RequestResult) {
        self.error = result.error.clone();
        self.result = Some(result);
    }

    /// Settled result with the context error written back.
    pub(crate) fn take_result(&mut self) -> Option<RequestResult> {
        let mut result = self.result.take()?;
        result.error = self.error.clone();
        Some(result)
    }
}

/// Hook stage being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookStage {
    Request,
    Response,
    Error,
}

/// Run one hook stage and merge its patch.
pub(crate) async fn run_hook(
    hooks: &Arc<dyn RequestHooks>,
    stage: HookStage,
    ctx: &mut RequestContext,
) -> Result<(), FetchError> {
    let patch = match stage {
        HookStage::Request => hooks.on_request(ctx).await?,
        HookStage::Response => hooks.on_response(ctx).await?,
        HookStage::Error => hooks.on_error(ctx).await?,
    };
    if let Some(patch) = patch {
        ctx.apply_patch(patch);
    }
    Ok(())
}

/// A simple logging hook set backed by `tracing` (no sensitive data).
#[derive(Debug, Clone, Default)]
pub struct LoggingHooks;

#[async_trait]
impl RequestHooks for LoggingHooks {
    async fn on_request(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<Option<ContextPatch>, FetchError> {
        tracing::debug!(target: "reqkit::http", request_id = %ctx.request_id(), method = %ctx.method(), url = %ctx.url(), "sending request");
        Ok(None)
    }

    async fn on_response(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<Option<ContextPatch>, FetchError> {
        let status = ctx.result().and_then(RequestResult::status);
        tracing::debug!(target: "reqkit::http", request_id = %ctx.request_id(), url = %ctx.url(), status = ?status, "response received");
        Ok(None)
    }

    async fn on_error(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<Option<ContextPatch>, FetchError> {
        if let Some(err) = ctx.error() {
            tracing::debug!(target: "reqkit::http", request_id = %ctx.request_id(), url = %ctx.url(), err = %err, "request error");
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve;
    use crate::error::ErrorStatus;

    fn ctx() -> RequestContext {
        let opts = RequestOptions::new().with_header("X-Base", "1");
        let config = Arc::new(resolve(
            &RequestOptions::defaults(),
            &RequestOptions::new(),
            &opts,
        ));
        RequestContext::new(config, CallSpec::new(Method::GET, "/a", opts))
    }

    #[test]
    fn patch_headers_union_with_mutated_headers() {
        let mut ctx = ctx();
        ctx.set_headers([("X-Mutator", "m")]);
        ctx.apply_patch(ContextPatch::new().header("X-Patch", "p"));

        let headers = &ctx.options().headers;
        assert_eq!(headers.get("x-base").map(String::as_str), Some("1"));
        assert_eq!(headers.get("x-mutator").map(String::as_str), Some("m"));
        assert_eq!(headers.get("x-patch").map(String::as_str), Some("p"));
    }

    #[test]
    fn patch_lands_after_mutators() {
        let mut ctx = ctx();
        ctx.set_url("/from-mutator").set_method(Method::POST);
        ctx.apply_patch(ContextPatch::new().url("/from-patch"));
        assert_eq!(ctx.url(), "/from-patch");
        assert_eq!(ctx.method(), &Method::POST);
    }

    #[test]
    fn set_options_is_shallow_except_headers() {
        let mut ctx = ctx();
        ctx.set_options(
            RequestOptions::new()
                .with_timeout(std::time::Duration::from_millis(5))
                .with_header("X-Other", "o"),
        );
        assert_eq!(ctx.options().timeout, Some(std::time::Duration::from_millis(5)));
        assert_eq!(ctx.options().headers.len(), 2);
    }

    #[test]
    fn error_patch_replaces_error_and_result_error() {
        let mut ctx = ctx();
        ctx.store_result(RequestResult {
            error: Some(RequestError::new("raw", ErrorStatus::Http(500))),
            ..Default::default()
        });
        ctx.set_error(Some(RequestError::new("mutated", ErrorStatus::Http(500))));
        ctx.apply_patch(ContextPatch::new().error(RequestError::new("patched", ErrorStatus::Http(503))));

        let result = ctx.take_result().unwrap();
        assert_eq!(result.error.unwrap().message, "patched");
    }

    #[tokio::test]
    async fn run_hook_applies_returned_patch() {
        struct Rewrite;

        #[async_trait]
        impl RequestHooks for Rewrite {
            async fn on_request(
                &self,
                ctx: &mut RequestContext,
            ) -> Result<Option<ContextPatch>, FetchError> {
                ctx.set_headers([("X-Seen", "yes")]);
                Ok(Some(ContextPatch::new().url("/rewritten")))
            }
        }

        let hooks: Arc<dyn RequestHooks> = Arc::new(Rewrite);
        let mut ctx = ctx();
        run_hook(&hooks, HookStage::Request, &mut ctx).await.unwrap();
        assert_eq!(ctx.url(), "/rewritten");
        assert!(ctx.options().headers.contains_key("x-seen"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn logging_hooks_log_without_secrets() {
        let hooks: Arc<dyn RequestHooks> = Arc::new(LoggingHooks);
        let mut ctx = ctx();
        ctx.set_headers([("Authorization", "Bearer hidden-token")]);
        run_hook(&hooks, HookStage::Request, &mut ctx).await.unwrap();
        ctx.store_result(RequestResult {
            error: Some(RequestError::new("boom", ErrorStatus::NetworkError)),
            ..Default::default()
        });
        run_hook(&hooks, HookStage::Error, &mut ctx).await.unwrap();

        assert!(logs_contain("sending request"));
        assert!(logs_contain("request error"));
        assert!(!logs_contain("hidden-token"));
    }
}
