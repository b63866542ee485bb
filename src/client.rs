//! Client
//!
//! A [`Client`] is one configured instance: a default tier, an instance tier,
//! an [`Engine`] and a [`ResponseCache`]. Every call goes through the same
//! pipeline:
//!
//! 1. resolve the three tiers and run `on_request`
//! 2. re-resolve with the (possibly patched) call
//! 3. serve GET cache hits immediately, scheduling a background refresh
//! 4. execute with retries (`on_error` runs inside the engine)
//! 5. apply `throw_on_error`, then `on_response`
//! 6. populate the cache and arm polling when configured
//!
//! Calls return a [`PendingRequest`], a future that can be cancelled before it
//! resolves, which settles into a [`RequestHandle`].

use crate::cache::{ResponseCache, cache_key};
use crate::config::{EffectiveConfig, RequestOptions, resolve};
use crate::error::FetchError;
use crate::execution::engine::Engine;
use crate::execution::hooks::{CallSpec, HookStage, RequestContext, run_hook};
use crate::execution::http::{FetchTransport, ProgressTransport, ReqwestTransport};
use crate::polling::{PollSource, Poller};
use crate::streaming::{Blob, BodyStream};
use crate::types::{HttpResponse, Method, RequestResult};
use crate::utils::cancel::CancelHandle;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

type Runner =
    Arc<dyn Fn(CancelHandle) -> BoxFuture<'static, Result<RequestResult, FetchError>> + Send + Sync>;

struct ClientInner {
    defaults: RequestOptions,
    instance: RwLock<RequestOptions>,
    engine: Engine,
    cache: ResponseCache,
}

/// A configured request instance.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    defaults: Option<RequestOptions>,
    instance: RequestOptions,
    fetch: Option<Arc<dyn FetchTransport>>,
    progress: Option<Arc<dyn ProgressTransport>>,
    http_client: Option<reqwest::Client>,
    cache: Option<ResponseCache>,
}

impl ClientBuilder {
    /// Replace the default tier (built-in defaults when unset).
    pub fn defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// The instance tier.
    pub fn config(mut self, config: RequestOptions) -> Self {
        self.instance = config;
        self
    }

    pub fn fetch_transport(mut self, transport: Arc<dyn FetchTransport>) -> Self {
        self.fetch = Some(transport);
        self
    }

    pub fn progress_transport(mut self, transport: Arc<dyn ProgressTransport>) -> Self {
        self.progress = Some(transport);
        self
    }

    /// Reuse an existing `reqwest::Client` for the default transports.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Use `cache` instead of the process-wide store.
    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Client {
        let reqwest = Arc::new(match self.http_client {
            Some(client) => ReqwestTransport::with_client(client),
            None => ReqwestTransport::new(),
        });
        let fetch: Arc<dyn FetchTransport> = match self.fetch {
            Some(fetch) => fetch,
            None => reqwest.clone(),
        };
        let progress: Arc<dyn ProgressTransport> = match self.progress {
            Some(progress) => progress,
            None => reqwest,
        };
        Client {
            inner: Arc::new(ClientInner {
                defaults: self.defaults.unwrap_or_else(RequestOptions::defaults),
                instance: RwLock::new(self.instance),
                engine: Engine::new(fetch, progress),
                cache: self.cache.unwrap_or_else(|| ResponseCache::global().clone()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    /// Regular call: consults the cache and arms polling.
    Call,
    /// Background cache refresh: bypasses the cache lookup, never polls.
    Revalidate,
}

impl Client {
    /// Instance with `config` as its instance tier.
    pub fn new(config: RequestOptions) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn helpers(&self) -> ClientHelpers<'_> {
        ClientHelpers { client: self }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.inner.cache
    }

    /// Overlay `options` onto the instance tier.
    pub fn configure(&self, options: RequestOptions) {
        self.instance_mut().overlay(options);
    }

    pub fn get(&self, url: impl Into<String>, options: RequestOptions) -> PendingRequest {
        self.request(Method::GET, url, options)
    }

    pub fn post(&self, url: impl Into<String>, options: RequestOptions) -> PendingRequest {
        self.request(Method::POST, url, options)
    }

    pub fn put(&self, url: impl Into<String>, options: RequestOptions) -> PendingRequest {
        self.request(Method::PUT, url, options)
    }

    pub fn delete(&self, url: impl Into<String>, options: RequestOptions) -> PendingRequest {
        self.request(Method::DELETE, url, options)
    }

    pub fn patch(&self, url: impl Into<String>, options: RequestOptions) -> PendingRequest {
        self.request(Method::PATCH, url, options)
    }

    pub fn options(&self, url: impl Into<String>, options: RequestOptions) -> PendingRequest {
        self.request(Method::OPTIONS, url, options)
    }

    pub fn trace(&self, url: impl Into<String>, options: RequestOptions) -> PendingRequest {
        self.request(Method::TRACE, url, options)
    }

    pub fn head(&self, url: impl Into<String>, options: RequestOptions) -> PendingRequest {
        self.request(Method::HEAD, url, options)
    }

    pub fn custom(
        &self,
        url: impl Into<String>,
        method: Method,
        options: RequestOptions,
    ) -> PendingRequest {
        self.request(method, url, options)
    }

    pub fn request(
        &self,
        method: Method,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> PendingRequest {
        let cancel = CancelHandle::new();
        let client = self.clone();
        let call = CallSpec::new(method, url, options);
        let token = cancel.clone();
        PendingRequest {
            cancel,
            future: Box::pin(async move { client.dispatch(call, token, Dispatch::Call).await }),
        }
    }

    fn tiers(&self) -> (RequestOptions, RequestOptions) {
        let instance = self
            .inner
            .instance
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        (self.inner.defaults.clone(), instance)
    }

    fn instance_mut(&self) -> std::sync::RwLockWriteGuard<'_, RequestOptions> {
        self.inner
            .instance
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn dispatch(
        &self,
        call: CallSpec,
        cancel: CancelHandle,
        mode: Dispatch,
    ) -> Result<RequestHandle, FetchError> {
        let (default, instance) = self.tiers();
        let config = Arc::new(resolve(&default, &instance, &call.options));
        let hooks = config.hooks.clone();
        // revalidation replays the call as the caller issued it
        let issued = call.clone();
        let mut ctx = RequestContext::new(config, call);
        if let Some(hooks) = hooks.as_ref() {
            run_hook(hooks, HookStage::Request, &mut ctx).await?;
        }

        // the patched call may carry its own base url, params or flags
        let config = Arc::new(resolve(&default, &instance, &ctx.request().options));
        ctx.replace_config(config.clone());
        let call = ctx.request().clone();
        let url = config.full_url(&call.url);
        let request_id = ctx.request_id().to_string();

        let key = (call.method == Method::GET && config.with_cache)
            .then(|| cache_key(&call.method, &url));
        if let (Some(key), Dispatch::Call) = (key.as_deref(), mode) {
            if let Some(cached) = self.inner.cache.get(key) {
                tracing::debug!(target: "reqkit::cache", request_id = %request_id, key, "cache hit");
                self.schedule_revalidation(key, &config, issued);
                let runner = self.runner(config.clone(), call, url, request_id);
                return Ok(self.handle(cached, runner, cancel, config, mode));
            }
            tracing::debug!(target: "reqkit::cache", request_id = %request_id, key, "cache miss");
        }

        let result = self
            .inner
            .engine
            .execute(&config, &call, &url, &cancel, &request_id)
            .await?;

        if config.throw_on_error {
            if let Some(err) = result.error.clone() {
                return Err(FetchError::Request(err));
            }
        }

        let result = match hooks.as_ref() {
            Some(hooks) => {
                ctx.store_result(result);
                run_hook(hooks, HookStage::Response, &mut ctx).await?;
                ctx.take_result().unwrap_or_default()
            }
            None => result,
        };

        if let (Some(key), Dispatch::Call) = (key, mode) {
            self.inner.cache.insert(key, result.clone());
        }
        let runner = self.runner(config.clone(), call, url, request_id);
        Ok(self.handle(result, runner, cancel, config, mode))
    }

    /// Fresh handle owning its result, body and poller.
    fn handle(
        &self,
        result: RequestResult,
        runner: Runner,
        cancel: CancelHandle,
        config: Arc<EffectiveConfig>,
        mode: Dispatch,
    ) -> RequestHandle {
        let handle = RequestHandle::new(result, runner, cancel, config);
        if handle.inner.config.polling && mode == Dispatch::Call {
            handle.start_polling(None);
        }
        handle
    }

    fn schedule_revalidation(&self, key: &str, config: &EffectiveConfig, call: CallSpec) {
        let client = self.clone();
        self.inner
            .cache
            .revalidate(key, config.revalidate_cache, move || async move {
                client
                    .dispatch(call, CancelHandle::new(), Dispatch::Revalidate)
                    .await
                    .map(|handle| handle.snapshot())
            });
    }

    /// Re-runs the engine part of the pipeline for refetch and polling.
    fn runner(
        &self,
        config: Arc<EffectiveConfig>,
        call: CallSpec,
        url: String,
        request_id: String,
    ) -> Runner {
        let engine = self.inner.engine.clone();
        Arc::new(move |cancel: CancelHandle| {
            let engine = engine.clone();
            let config = config.clone();
            let call = call.clone();
            let url = url.clone();
            let request_id = request_id.clone();
            async move {
                engine
                    .execute(&config, &call, &url, &cancel, &request_id)
                    .await
            }
            .boxed()
        })
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("instance", &*self.inner.instance.read().unwrap_or_else(PoisonError::into_inner))
            .field("cache_entries", &self.inner.cache.len())
            .finish_non_exhaustive()
    }
}

/// Instance helpers.
#[derive(Debug, Clone, Copy)]
pub struct ClientHelpers<'a> {
    client: &'a Client,
}

impl ClientHelpers<'_> {
    /// Current instance tier.
    pub fn get_config(&self) -> RequestOptions {
        self.client.tiers().1
    }

    /// Set the bearer token for subsequent calls of this instance.
    pub fn set_bearer_token(&self, token: impl Into<String>) {
        let mut instance = self.client.instance_mut();
        *instance = std::mem::take(&mut *instance).with_bearer_token(token);
    }
}

/// An in-flight call. Resolves to the settled [`RequestHandle`], or to an
/// error when a hook failed or `throw_on_error` applied.
pub struct PendingRequest {
    cancel: CancelHandle,
    future: BoxFuture<'static, Result<RequestHandle, FetchError>>,
}

impl PendingRequest {
    /// Abort the in-flight attempt; no further retries are issued.
    pub fn cancel_request(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl Future for PendingRequest {
    type Output = Result<RequestHandle, FetchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

struct HandleInner {
    state: RwLock<RequestResult>,
    body: Mutex<Option<Arc<BodyStream>>>,
    runner: Runner,
    cancel: Mutex<CancelHandle>,
    config: Arc<EffectiveConfig>,
    poller: Poller,
}

impl HandleInner {
    fn replace(&self, result: RequestResult) {
        *self.body.lock().unwrap_or_else(PoisonError::into_inner) =
            result.response.clone().map(|r| Arc::new(BodyStream::new(r)));
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = result;
    }

    async fn rerun(&self) -> Result<RequestResult, FetchError> {
        let cancel = CancelHandle::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        let result = (self.runner)(cancel).await?;
        self.replace(result.clone());
        Ok(result)
    }
}

#[async_trait]
impl PollSource for HandleInner {
    async fn poll_once(&self) -> Option<RequestResult> {
        match self.rerun().await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(target: "reqkit::polling", err = %e, "poll tick failed");
                None
            }
        }
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.poller.stop();
    }
}

/// A settled call and its bound operations.
///
/// Clones share state: polling and refetch update the result in place, so
/// every holder sees the latest outcome.
/// Handles served from the cache are built fresh for each hit and never
/// write back to the cache.
#[derive(Clone)]
pub struct RequestHandle {
    inner: Arc<HandleInner>,
}

impl RequestHandle {
    fn new(
        result: RequestResult,
        runner: Runner,
        cancel: CancelHandle,
        config: Arc<EffectiveConfig>,
    ) -> Self {
        let body = result.response.clone().map(|r| Arc::new(BodyStream::new(r)));
        Self {
            inner: Arc::new(HandleInner {
                state: RwLock::new(result),
                body: Mutex::new(body),
                runner,
                cancel: Mutex::new(cancel),
                config,
                poller: Poller::new(),
            }),
        }
    }

    /// Copy of the current result.
    pub fn snapshot(&self) -> RequestResult {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn loading(&self) -> bool {
        self.snapshot().loading
    }

    pub fn data(&self) -> Option<serde_json::Value> {
        self.snapshot().data
    }

    pub fn error(&self) -> Option<crate::error::RequestError> {
        self.snapshot().error
    }

    pub fn response(&self) -> Option<HttpResponse> {
        self.snapshot().response
    }

    /// Configuration the call ran with.
    pub fn config(&self) -> &EffectiveConfig {
        &self.inner.config
    }

    /// Re-issue the request and refresh this handle in place.
    pub async fn refetch(&self) -> Result<RequestResult, FetchError> {
        let result = self.inner.rerun().await?;
        if self.inner.config.throw_on_error {
            if let Some(err) = result.error.clone() {
                return Err(FetchError::Request(err));
            }
        }
        Ok(result)
    }

    /// Abort whatever attempt of this request is in flight.
    pub fn cancel_request(&self) {
        self.inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Start polling every `interval` (the configured interval when `None`).
    pub fn start_polling(&self, interval: Option<Duration>) {
        let interval = interval.unwrap_or(self.inner.config.polling_interval);
        let source: Weak<HandleInner> = Arc::downgrade(&self.inner);
        self.inner.poller.start(source, interval);
    }

    pub fn stop_polling(&self) {
        self.inner.poller.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.inner.poller.is_active()
    }

    /// Register the callback receiving each polled result.
    pub fn on_poll_data_received<F>(&self, callback: F)
    where
        F: Fn(RequestResult) + Send + Sync + 'static,
    {
        self.inner.poller.on_data(callback);
    }

    pub fn stream_to_string(&self) -> Result<String, FetchError> {
        self.body()?.text()
    }

    pub fn stream_to_blob(&self) -> Result<Blob, FetchError> {
        self.body()?.blob()
    }

    pub fn stream_to_array_buffer(&self) -> Result<Bytes, FetchError> {
        self.body()?.array_buffer()
    }

    pub fn stream_chunks(&self) -> Result<impl Stream<Item = Bytes> + Send + use<>, FetchError> {
        self.body()?.chunks()
    }

    fn body(&self) -> Result<Arc<BodyStream>, FetchError> {
        self.inner
            .body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(FetchError::NoResponse)
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("result", &self.snapshot())
            .field("poller", &self.inner.poller)
            .finish_non_exhaustive()
    }
}
