//! Error Handling Module
//!
//! Two layers of errors live here:
//! - `RequestError` is the uniform `{message, status}` value carried inside a
//!   `RequestResult` (or thrown when `throw_on_error` is set)
//! - `FetchError` is the crate error type returned by fallible operations
//!
//! # Example
//!
//! ```rust,ignore
//! use reqkit::error::{ErrorStatus, RequestError};
//!
//! let error = RequestError::new("Not Found!", ErrorStatus::Http(404));
//! assert_eq!(error.status.to_string(), "404");
//! ```

pub mod types;

pub use types::*;
