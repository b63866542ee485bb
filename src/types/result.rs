//! Settled request outcome.

use crate::error::RequestError;
use crate::types::http::HttpResponse;

/// Snapshot of a request outcome.
///
/// `error` is only populated for transport-level failures, or for non-2xx
/// responses when `map_errors` is on. Otherwise callers inspect
/// `response.ok()` the way they would with the native transport.
#[derive(Debug, Clone, Default)]
pub struct RequestResult {
    pub loading: bool,
    pub error: Option<RequestError>,
    pub data: Option<serde_json::Value>,
    pub response: Option<HttpResponse>,
}

impl RequestResult {
    /// Result still waiting on the transport.
    pub fn pending() -> Self {
        Self {
            loading: true,
            ..Default::default()
        }
    }

    /// No error object and a 2xx response.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.response.as_ref().is_some_and(HttpResponse::ok)
    }

    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(HttpResponse::status)
    }

    /// Deserialize `data` into a concrete type.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.data
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
