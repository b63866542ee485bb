//! Scripted transport for unit tests.

use crate::execution::engine::Engine;
use crate::execution::http::{
    FetchTransport, ProgressTransport, TransportError, TransportRequest, TransportResponse,
};
use crate::types::Progress;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One scripted transport outcome. The last step repeats once the script runs out.
#[derive(Debug, Clone)]
pub enum Step {
    Respond {
        status: u16,
        content_type: Option<&'static str>,
        chunks: Vec<Bytes>,
        delay: Duration,
    },
    Fail(String),
    /// Transport reports its own timeout.
    Timeout,
    /// Never settles until aborted.
    Hang,
}

impl Step {
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::Respond {
            status,
            content_type: Some("application/json"),
            chunks: vec![Bytes::from(value.to_string())],
            delay: Duration::ZERO,
        }
    }

    pub fn text(status: u16, text: &str) -> Self {
        Self::Respond {
            status,
            content_type: Some("text/plain"),
            chunks: vec![Bytes::from(text.to_string())],
            delay: Duration::ZERO,
        }
    }

    pub fn chunked(status: u16, content_type: Option<&'static str>, chunks: &[&'static [u8]]) -> Self {
        Self::Respond {
            status,
            content_type,
            chunks: chunks.iter().map(|c| Bytes::from_static(c)).collect(),
            delay: Duration::ZERO,
        }
    }

    pub fn fail(message: &str) -> Self {
        Self::Fail(message.to_string())
    }
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<Vec<Step>>,
    cursor: AtomicUsize,
    progress_calls: AtomicUsize,
    aborts: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            ..Default::default()
        })
    }

    pub fn engine(self: &Arc<Self>) -> Engine {
        Engine::new(self.clone(), self.clone())
    }

    /// Attempts on either transport.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn progress_calls(&self) -> usize {
        self.progress_calls.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<TransportRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn next_step(&self, request: &TransportRequest) -> Step {
        self.requests.lock().unwrap().push(request.clone());
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        script
            .get(idx)
            .or_else(|| script.last())
            .cloned()
            .unwrap_or(Step::Hang)
    }

    async fn play(
        &self,
        step: Step,
        request: &TransportRequest,
        signal: CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        match step {
            Step::Respond {
                status,
                content_type,
                chunks,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = signal.cancelled() => {
                            self.aborts.fetch_add(1, Ordering::SeqCst);
                            return Err(TransportError::Aborted);
                        }
                    }
                }
                let total: u64 = chunks.iter().map(|c| c.len() as u64).sum();
                if let Some(cb) = request.on_download_progress.as_ref() {
                    let mut loaded = 0u64;
                    for chunk in &chunks {
                        loaded += chunk.len() as u64;
                        cb(Progress {
                            loaded,
                            total: Some(total),
                        });
                    }
                }
                let mut headers = HeaderMap::new();
                if let Some(ct) = content_type {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
                }
                Ok(TransportResponse {
                    status,
                    status_text: reqwest::StatusCode::from_u16(status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or_default()
                        .to_string(),
                    headers,
                    chunks,
                })
            }
            Step::Fail(message) => Err(TransportError::Network(message)),
            Step::Timeout => Err(TransportError::Timeout),
            Step::Hang => {
                signal.cancelled().await;
                self.aborts.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Aborted)
            }
        }
    }
}

#[async_trait]
impl FetchTransport for ScriptedTransport {
    async fn fetch(
        &self,
        request: TransportRequest,
        signal: CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        let step = self.next_step(&request);
        self.play(step, &request, signal).await
    }
}

#[async_trait]
impl ProgressTransport for ScriptedTransport {
    async fn send(
        &self,
        request: TransportRequest,
        signal: CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step(&request);
        self.play(step, &request, signal).await
    }
}
