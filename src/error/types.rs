//! Core error types.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Status carried by a [`RequestError`].
///
/// Backend failures keep their numeric HTTP code; transport-level failures
/// use one of three sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    /// Non-2xx status reported by a reachable server.
    Http(u16),
    /// The transport failed before a response existed.
    NetworkError,
    /// The request's own timer fired first.
    Timeout,
    /// The caller invoked `cancel_request`.
    Canceled,
}

impl ErrorStatus {
    pub const NETWORK_ERROR: &'static str = "NETWORK_ERROR";
    pub const TIMEOUT: &'static str = "TIMEOUT";
    pub const CANCELED: &'static str = "CANCELED";

    /// HTTP status code, if this is a backend failure.
    pub fn http_code(&self) -> Option<u16> {
        match self {
            Self::Http(code) => Some(*code),
            _ => None,
        }
    }

    /// True for the three transport-level sentinels.
    pub fn is_transport_failure(&self) -> bool {
        !matches!(self, Self::Http(_))
    }

    /// Sentinel string for transport-level statuses.
    pub fn sentinel(&self) -> Option<&'static str> {
        match self {
            Self::Http(_) => None,
            Self::NetworkError => Some(Self::NETWORK_ERROR),
            Self::Timeout => Some(Self::TIMEOUT),
            Self::Canceled => Some(Self::CANCELED),
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(code) => write!(f, "{code}"),
            other => f.write_str(other.sentinel().unwrap_or_default()),
        }
    }
}

impl Serialize for ErrorStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Http(code) => serializer.serialize_u16(*code),
            other => serializer.serialize_str(other.sentinel().unwrap_or_default()),
        }
    }
}

impl<'de> Deserialize<'de> for ErrorStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u16),
            Sentinel(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Ok(Self::Http(code)),
            Raw::Sentinel(s) => match s.as_str() {
                Self::NETWORK_ERROR => Ok(Self::NetworkError),
                Self::TIMEOUT => Ok(Self::Timeout),
                Self::CANCELED => Ok(Self::Canceled),
                other => Err(serde::de::Error::custom(format!(
                    "unknown error status '{other}'"
                ))),
            },
        }
    }
}

/// Uniform error shape surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} (status {status})")]
pub struct RequestError {
    pub message: String,
    pub status: ErrorStatus,
}

impl RequestError {
    pub fn new(message: impl Into<String>, status: ErrorStatus) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }
}

/// Crate error type.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// An error object existed and `throw_on_error` was set.
    #[error("request failed: {0}")]
    Request(RequestError),

    /// A hook returned an error; fatal to the call and never retried.
    #[error("hook failed: {0}")]
    Hook(String),

    /// Invalid header name/value, URL or method.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request payload could not be stringified.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A streaming accessor was used after the body had already been read.
    #[error("response body has already been read")]
    BodyAlreadyRead,

    /// A streaming accessor was used on a result without a response.
    #[error("result carries no response")]
    NoResponse,
}

impl FetchError {
    /// The carried `RequestError` for rejections produced by `throw_on_error`.
    pub fn request_error(&self) -> Option<&RequestError> {
        match self {
            Self::Request(err) => Some(err),
            _ => None,
        }
    }

    /// Convenience constructor for hook failures.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook(message.into())
    }
}

impl From<RequestError> for FetchError {
    fn from(err: RequestError) -> Self {
        Self::Request(err)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
