//! Default transports backed by `reqwest`.
//!
//! Browser-only request-init fields (CORS mode, credentials, cache mode,
//! integrity, keepalive, referrer policy) have no meaning here and are
//! ignored; `referrer` is sent as a `Referer` header.

use super::transport::{
    FetchTransport, ProgressTransport, TransportError, TransportRequest, TransportResponse,
};
use crate::defaults;
use crate::types::{Progress, ProgressCallback};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::REFERER;
use tokio_util::sync::CancellationToken;

/// `reqwest` implementation of both transports.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing client (connection pool, proxy and TLS settings).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn builder(&self, request: &TransportRequest, body: Option<reqwest::Body>) -> reqwest::RequestBuilder {
        let mut rb = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());
        if let Some(referrer) = request.init.referrer.as_deref() {
            rb = rb.header(REFERER, referrer);
        }
        if let Some(body) = body {
            rb = rb.body(body);
        }
        rb
    }
}

#[async_trait]
impl FetchTransport for ReqwestTransport {
    async fn fetch(
        &self,
        request: TransportRequest,
        signal: CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        let body = request.body.clone().map(reqwest::Body::from);
        let rb = self.builder(&request, body);
        tokio::select! {
            biased;
            _ = signal.cancelled() => Err(TransportError::Aborted),
            res = async {
                let resp = rb.send().await.map_err(network_error)?;
                read_response(resp, None).await
            } => res,
        }
    }
}

#[async_trait]
impl ProgressTransport for ReqwestTransport {
    async fn send(
        &self,
        request: TransportRequest,
        signal: CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        let body = request
            .body
            .clone()
            .map(|bytes| progress_body(bytes, request.on_upload_progress.clone()));
        let rb = self.builder(&request, body);
        let on_download = request.on_download_progress.clone();

        let outcome = tokio::select! {
            biased;
            _ = signal.cancelled() => Err(TransportError::Aborted),
            res = tokio::time::timeout(request.timeout, async {
                let resp = rb.send().await.map_err(network_error)?;
                read_response(resp, on_download.as_ref()).await
            }) => res.unwrap_or(Err(TransportError::Timeout)),
        };
        tracing::trace!(target: "reqkit::http", url = %request.url, ok = outcome.is_ok(), "loadend");
        outcome
    }
}

fn network_error(err: reqwest::Error) -> TransportError {
    TransportError::Network(err.to_string())
}

async fn read_response(
    resp: reqwest::Response,
    on_progress: Option<&ProgressCallback>,
) -> Result<TransportResponse, TransportError> {
    let status = resp.status();
    let headers = resp.headers().clone();
    let total = resp.content_length();

    let mut chunks = Vec::new();
    let mut loaded = 0u64;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(network_error)?;
        loaded += chunk.len() as u64;
        if let Some(cb) = on_progress {
            cb(Progress { loaded, total });
        }
        chunks.push(chunk);
    }

    Ok(TransportResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        chunks,
    })
}

/// Stream `bytes` in fixed-size chunks, reporting upload progress per chunk.
fn progress_body(bytes: Bytes, on_progress: Option<ProgressCallback>) -> reqwest::Body {
    let Some(on_progress) = on_progress else {
        return reqwest::Body::from(bytes);
    };
    let total = bytes.len() as u64;
    let stream = async_stream::stream! {
        let mut offset = 0usize;
        while offset < bytes.len() {
            let end = (offset + defaults::http::UPLOAD_CHUNK_SIZE).min(bytes.len());
            let chunk = bytes.slice(offset..end);
            offset = end;
            on_progress(Progress { loaded: offset as u64, total: Some(total) });
            yield Ok::<Bytes, std::io::Error>(chunk);
        }
    };
    reqwest::Body::wrap_stream(stream)
}
