//! HTTP value types shared by the resolver, the engine and the transports.

use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use reqwest::Method;

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Structured payload. Stringified to JSON when `stringify_payload` is on.
    Json(serde_json::Value),
    /// Sent verbatim.
    Text(String),
    /// Sent verbatim.
    Bytes(Bytes),
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for RequestBody {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

/// CORS mode requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorsMode {
    #[default]
    Cors,
    NoCors,
    SameOrigin,
    Navigate,
}

impl CorsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cors => "cors",
            Self::NoCors => "no-cors",
            Self::SameOrigin => "same-origin",
            Self::Navigate => "navigate",
        }
    }
}

/// Credentials policy requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialsMode {
    Omit,
    SameOrigin,
    Include,
}

/// Standard request-init fields passed through verbatim to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialsMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<CorsMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_policy: Option<String>,
}

impl RequestInit {
    /// Field-wise overlay; `Some` values in `other` win.
    pub fn overlay(&mut self, other: RequestInit) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            cache,
            credentials,
            integrity,
            keepalive,
            mode,
            redirect,
            referrer,
            referrer_policy
        );
    }
}

/// Progress snapshot delivered to upload/download callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl Progress {
    /// Completion ratio in `[0, 1]` when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.loaded as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Upload/download progress callback.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// A settled transport response.
///
/// The body is kept as the chunks the transport received. Reading it never
/// consumes it, so the response stays readable after `data` was parsed.
#[derive(Clone)]
pub struct HttpResponse {
    status: u16,
    status_text: String,
    url: String,
    headers: HeaderMap,
    chunks: Arc<[Bytes]>,
}

impl HttpResponse {
    pub fn new(
        status: u16,
        status_text: impl Into<String>,
        url: impl Into<String>,
        headers: HeaderMap,
        chunks: Vec<Bytes>,
    ) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            url: url.into(),
            headers,
            chunks: chunks.into(),
        }
    }

    /// `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Body chunks in arrival order.
    pub fn chunks(&self) -> &[Bytes] {
        &self.chunks
    }

    /// Whole body as one buffer.
    pub fn bytes(&self) -> Bytes {
        match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks[0].clone(),
            _ => {
                let len = self.chunks.iter().map(Bytes::len).sum();
                let mut buf = BytesMut::with_capacity(len);
                for chunk in self.chunks.iter() {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        }
    }

    /// Body decoded as UTF-8 (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    /// Body parsed as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.bytes())
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("status_text", &self.status_text)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.chunks.iter().map(Bytes::len).sum::<usize>())
            .finish()
    }
}
