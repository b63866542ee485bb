//! HTTP Utilities
//!
//! This module contains HTTP-related utilities:
//! - Header management
//! - Transport abstraction and selection
//! - The default `reqwest`-backed transport

pub mod headers;
pub mod reqwest_transport;
pub mod transport;

pub use headers::*;
pub use reqwest_transport::ReqwestTransport;
pub use transport::*;
