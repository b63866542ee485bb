//! reqkit
//!
//! Ergonomic HTTP requests over a pluggable transport: layered configuration
//! (default < instance < per-call), request/response/error hooks, retry with
//! timeout and cancellation, GET caching with stale-while-revalidate, polling
//! and one-shot body streaming.
//!
//! The free functions ([`get`], [`post`], ...) run on a process-wide [`Client`]
//! whose default tier is the built-in defaults overlaid with `REQKIT_*`
//! environment variables; [`configure`] adjusts its instance tier. Create
//! isolated instances with [`Client::new`] or [`Client::builder`].
#![deny(unsafe_code)]

pub mod cache;
pub mod client;
pub mod config;
pub mod defaults;
pub mod error;
pub mod execution;
pub mod polling;
pub mod retry;
pub mod streaming;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::OnceLock;

pub use cache::ResponseCache;
pub use client::{Client, ClientBuilder, ClientHelpers, PendingRequest, RequestHandle};
pub use config::{EffectiveConfig, RequestOptions};
pub use error::{ErrorStatus, FetchError, RequestError};
pub use execution::{ContextPatch, ErrorMapping, LoggingHooks, RequestContext, RequestHooks};
pub use types::{HttpResponse, Method, RequestBody, RequestResult};
pub use utils::cancel::CancelHandle;

/// Commonly used items.
pub mod prelude {
    pub use crate::client::{Client, PendingRequest, RequestHandle};
    pub use crate::config::RequestOptions;
    pub use crate::error::{ErrorStatus, FetchError, RequestError};
    pub use crate::execution::{ContextPatch, ErrorMapping, RequestContext, RequestHooks};
    pub use crate::streaming::Blob;
    pub use crate::types::{CorsMode, Method, Progress, RequestBody, RequestInit, RequestResult};
}

static GLOBAL_CLIENT: OnceLock<Client> = OnceLock::new();

/// The process-wide client used by the free functions.
///
/// Its instance tier is shared mutable state: [`configure`] affects every
/// later free-function call.
pub fn global() -> &'static Client {
    GLOBAL_CLIENT.get_or_init(|| {
        Client::builder()
            .defaults(RequestOptions::defaults().merged(&RequestOptions::from_env()))
            .build()
    })
}

/// Overlay `options` onto the global instance tier.
pub fn configure(options: RequestOptions) {
    global().configure(options);
}

pub fn get(url: impl Into<String>, options: RequestOptions) -> PendingRequest {
    global().get(url, options)
}

pub fn post(url: impl Into<String>, options: RequestOptions) -> PendingRequest {
    global().post(url, options)
}

pub fn put(url: impl Into<String>, options: RequestOptions) -> PendingRequest {
    global().put(url, options)
}

pub fn delete(url: impl Into<String>, options: RequestOptions) -> PendingRequest {
    global().delete(url, options)
}

pub fn patch(url: impl Into<String>, options: RequestOptions) -> PendingRequest {
    global().patch(url, options)
}

pub fn options(url: impl Into<String>, options: RequestOptions) -> PendingRequest {
    global().options(url, options)
}

pub fn trace(url: impl Into<String>, options: RequestOptions) -> PendingRequest {
    global().trace(url, options)
}

pub fn head(url: impl Into<String>, options: RequestOptions) -> PendingRequest {
    global().head(url, options)
}

pub fn custom(url: impl Into<String>, method: Method, options: RequestOptions) -> PendingRequest {
    global().custom(url, method, options)
}
