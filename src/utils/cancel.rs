//! Cancellation utilities
//!
//! One [`CancelHandle`] is shared by every attempt of a top-level call. Each
//! attempt runs under a child token so the per-attempt timer can abort the
//! in-flight attempt without poisoning later retries, while a caller cancel
//! takes down whichever attempt is running.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;

/// Which abort source fired first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortCause {
    None,
    Timeout,
    Canceled,
}

impl AbortCause {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Timeout,
            2 => Self::Canceled,
            _ => Self::None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Timeout => 1,
            Self::Canceled => 2,
        }
    }
}

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
    cause: Arc<AtomicU8>,
}

impl CancelHandle {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            cause: Arc::new(AtomicU8::new(AbortCause::None.as_u8())),
        }
    }

    /// Request cancellation. The in-flight attempt is aborted and no further
    /// retries are issued.
    pub fn cancel(&self) {
        self.transition(AbortCause::None, AbortCause::Canceled);
        self.token.cancel();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub(crate) fn cause(&self) -> AbortCause {
        AbortCause::from_u8(self.cause.load(Ordering::SeqCst))
    }

    /// Start a new attempt: clears a timeout left by the previous attempt and
    /// returns the attempt's abort signal.
    pub(crate) fn begin_attempt(&self) -> CancellationToken {
        self.transition(AbortCause::Timeout, AbortCause::None);
        self.token.child_token()
    }

    /// Record that the attempt timer fired. Returns `false` when a caller
    /// cancel got there first.
    pub(crate) fn mark_timeout(&self) -> bool {
        self.transition(AbortCause::None, AbortCause::Timeout)
    }

    fn transition(&self, from: AbortCause, to: AbortCause) -> bool {
        self.cause
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
