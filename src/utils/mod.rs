//! Utility modules.

pub mod cancel;

pub use cancel::{AbortCause, CancelHandle};
