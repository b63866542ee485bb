//! HTTP transport abstraction.
//!
//! The engine drives one of two injectable transports:
//! - [`FetchTransport`]: promise-style call that resolves to a response or fails
//! - [`ProgressTransport`]: event-style call that also reports upload/download
//!   progress, owns its own timeout, and treats the abort signal as `abort()`
//!
//! Which one a call uses is decided once per call by [`select_transport`].

use crate::config::EffectiveConfig;
use crate::types::{CorsMode, Method, ProgressCallback, RequestInit};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Transport-level request data.
#[derive(Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Duration,
    pub with_credentials: bool,
    pub mode: CorsMode,
    pub init: RequestInit,
    pub on_upload_progress: Option<ProgressCallback>,
    pub on_download_progress: Option<ProgressCallback>,
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("timeout", &self.timeout)
            .field("with_credentials", &self.with_credentials)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Transport-level response data. The body is the ordered list of received chunks.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub chunks: Vec<Bytes>,
}

/// Why a transport call produced no response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection/DNS/protocol failure.
    #[error("{0}")]
    Network(String),
    /// The transport's own timeout fired.
    #[error("request timed out")]
    Timeout,
    /// The abort signal fired.
    #[error("request aborted")]
    Aborted,
}

/// Standard (fetch-like) transport.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    async fn fetch(
        &self,
        request: TransportRequest,
        signal: CancellationToken,
    ) -> Result<TransportResponse, TransportError>;
}

/// Progress-capable (XHR-like) transport.
///
/// Implementations must report progress through the request's callbacks,
/// enforce `request.timeout` themselves (returning [`TransportError::Timeout`]),
/// and abort when `signal` fires (returning [`TransportError::Aborted`]).
#[async_trait]
pub trait ProgressTransport: Send + Sync {
    async fn send(
        &self,
        request: TransportRequest,
        signal: CancellationToken,
    ) -> Result<TransportResponse, TransportError>;
}

/// Which transport a call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Standard,
    Progress,
}

/// Progress transport when forced, or when either progress callback is set.
pub fn select_transport(config: &EffectiveConfig) -> TransportKind {
    if config.use_progress_transport
        || config.on_upload_progress.is_some()
        || config.on_download_progress.is_some()
    {
        TransportKind::Progress
    } else {
        TransportKind::Standard
    }
}
