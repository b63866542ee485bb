//! Execution engine
//!
//! `perform_request` runs one attempt: builds the transport request, issues it
//! under the abort/timeout guard and normalizes the outcome. `execute` wraps
//! it in the sequential retry loop.
//!
//! Two tiers of failure are kept apart:
//! - a non-2xx response only becomes an error object under `map_errors`
//! - a transport failure (network, timeout, cancel) always does

use crate::config::EffectiveConfig;
use crate::error::FetchError;
use crate::execution::errors::{error_from_failure, error_from_response};
use crate::execution::hooks::{CallSpec, HookStage, RequestContext, run_hook};
use crate::execution::http::headers::{apply_bearer_token, ensure_json_content_type};
use crate::execution::http::{
    FetchTransport, ProgressTransport, ReqwestTransport, TransportError, TransportKind,
    TransportRequest, TransportResponse, select_transport,
};
use crate::retry::RetryPolicy;
use crate::types::{CredentialsMode, HttpResponse, RequestBody, RequestResult};
use crate::utils::cancel::CancelHandle;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Drives the injected transports.
#[derive(Clone)]
pub struct Engine {
    fetch: Arc<dyn FetchTransport>,
    progress: Arc<dyn ProgressTransport>,
}

impl Engine {
    pub fn new(fetch: Arc<dyn FetchTransport>, progress: Arc<dyn ProgressTransport>) -> Self {
        Self { fetch, progress }
    }

    /// Both transports backed by one `reqwest` client.
    pub fn reqwest(transport: ReqwestTransport) -> Self {
        let transport = Arc::new(transport);
        Self {
            fetch: transport.clone(),
            progress: transport,
        }
    }

    /// Run a call with retries.
    ///
    /// Returns `Err` only for hook failures and configuration errors; request
    /// failures come back inside the result. The transport is selected once
    /// and reused by every retry.
    pub async fn execute(
        &self,
        config: &Arc<EffectiveConfig>,
        call: &CallSpec,
        url: &str,
        cancel: &CancelHandle,
        request_id: &str,
    ) -> Result<RequestResult, FetchError> {
        let kind = select_transport(config);
        let policy = RetryPolicy::from_config(config);
        let mut retries = 0u32;
        loop {
            let result = self
                .perform_request(config, call, url, kind, cancel, request_id)
                .await?;
            if cancel.is_cancelled() || !policy.should_retry(&result, retries) {
                return Ok(result);
            }
            retries += 1;
            tracing::debug!(
                target: "reqkit::http",
                request_id,
                url,
                retry = retries,
                max_retries = policy.max_retries,
                "retrying request"
            );
            let delay = policy.calculate_delay(retries);
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Ok(result),
                }
            }
        }
    }

    /// Run a single attempt.
    pub async fn perform_request(
        &self,
        config: &Arc<EffectiveConfig>,
        call: &CallSpec,
        url: &str,
        kind: TransportKind,
        cancel: &CancelHandle,
        request_id: &str,
    ) -> Result<RequestResult, FetchError> {
        let request = build_transport_request(config, call, url)?;
        let signal = cancel.begin_attempt();
        tracing::debug!(target: "reqkit::http", request_id, method = %call.method, url, transport = ?kind, "sending request");

        let outcome = match kind {
            TransportKind::Standard => {
                self.fetch_with_timeout(request, signal, config.timeout, cancel)
                    .await
            }
            TransportKind::Progress => self.progress.send(request, signal).await,
        };

        let result = match outcome {
            Ok(response) => normalize_response(response, url, config),
            Err(err) => {
                tracing::debug!(target: "reqkit::http", request_id, url, err = %err, cause = ?cancel.cause(), "transport failed");
                RequestResult {
                    loading: false,
                    error: Some(error_from_failure(
                        &err,
                        cancel.cause(),
                        &config.error_mapping,
                    )),
                    data: None,
                    response: None,
                }
            }
        };

        if result.error.is_none() {
            return Ok(result);
        }
        apply_error_hook(config, call, request_id, result).await
    }

    async fn fetch_with_timeout(
        &self,
        request: TransportRequest,
        signal: CancellationToken,
        timeout: Duration,
        cancel: &CancelHandle,
    ) -> Result<TransportResponse, TransportError> {
        tokio::select! {
            biased;
            res = self.fetch.fetch(request, signal.clone()) => res,
            _ = signal.cancelled() => Err(TransportError::Aborted),
            _ = tokio::time::sleep(timeout) => {
                cancel.mark_timeout();
                signal.cancel();
                Err(TransportError::Aborted)
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::reqwest(ReqwestTransport::new())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

/// Build headers (bearer token injected unless explicit), body and
/// pass-through fields for the transport.
pub fn build_transport_request(
    config: &EffectiveConfig,
    call: &CallSpec,
    url: &str,
) -> Result<TransportRequest, FetchError> {
    let mut headers = config.headers.clone();
    apply_bearer_token(&mut headers, config.bearer_token.as_ref())?;

    let body = match &config.body {
        None => None,
        Some(RequestBody::Json(value)) if config.stringify_payload => {
            ensure_json_content_type(&mut headers);
            Some(Bytes::from(serde_json::to_vec(value)?))
        }
        Some(RequestBody::Json(value)) => Some(Bytes::from(value.to_string())),
        Some(RequestBody::Text(text)) => Some(Bytes::from(text.clone())),
        Some(RequestBody::Bytes(bytes)) => Some(bytes.clone()),
    };

    let mut init = config.init.clone();
    if config.with_credentials && init.credentials.is_none() {
        init.credentials = Some(CredentialsMode::Include);
    }

    Ok(TransportRequest {
        method: call.method.clone(),
        url: url.to_string(),
        headers,
        body,
        timeout: config.timeout,
        with_credentials: config.with_credentials,
        mode: init.mode.unwrap_or(config.cors_mode),
        init,
        on_upload_progress: config.on_upload_progress.clone(),
        on_download_progress: config.on_download_progress.clone(),
    })
}

/// Shape a settled transport response into a result.
///
/// The body is parsed for `data` on every status; a parse failure leaves
/// `data` empty and is never an error.
pub fn normalize_response(
    response: TransportResponse,
    url: &str,
    config: &EffectiveConfig,
) -> RequestResult {
    let response = HttpResponse::new(
        response.status,
        response.status_text,
        url,
        response.headers,
        response.chunks,
    );
    let data = read_data(&response, config.parse_json);
    let error = if !response.ok() && config.map_errors {
        Some(error_from_response(&response, &config.error_mapping))
    } else {
        None
    };
    tracing::debug!(target: "reqkit::http", url, status = response.status(), "response received");
    RequestResult {
        loading: false,
        error,
        data,
        response: Some(response),
    }
}

fn read_data(response: &HttpResponse, parse_json: bool) -> Option<serde_json::Value> {
    let body = response.bytes();
    if !parse_json {
        return Some(serde_json::Value::String(
            String::from_utf8_lossy(&body).into_owned(),
        ));
    }
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice(&body) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(target: "reqkit::http", url = %response.url(), err = %e, "body is not JSON");
            None
        }
    }
}

async fn apply_error_hook(
    config: &Arc<EffectiveConfig>,
    call: &CallSpec,
    request_id: &str,
    result: RequestResult,
) -> Result<RequestResult, FetchError> {
    let Some(hooks) = config.hooks.clone() else {
        return Ok(result);
    };
    let mut ctx = RequestContext::new(config.clone(), call.clone()).with_request_id(request_id);
    ctx.store_result(result);
    run_hook(&hooks, HookStage::Error, &mut ctx).await?;
    Ok(ctx.take_result().unwrap_or_default())
}
