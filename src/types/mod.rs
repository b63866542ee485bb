//! Core value types.

pub mod http;
pub mod result;

pub use http::*;
pub use result::*;
