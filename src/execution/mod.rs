//! Execution layer
//!
//! - `http`: header handling and the transport seam
//! - `errors`: error mapping and classification
//! - `hooks`: request/response/error hook pipeline
//! - `engine`: single attempts, timeout/cancel guard and the retry loop

pub mod engine;
pub mod errors;
pub mod hooks;
pub mod http;

pub use engine::Engine;
pub use errors::ErrorMapping;
pub use hooks::{CallSpec, ContextPatch, LoggingHooks, RequestContext, RequestHooks};
