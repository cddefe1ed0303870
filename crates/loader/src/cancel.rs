//! Cooperative cancellation for in-flight loads.
//!
//! Each pending load owns one token, shared with the worker that executes
//! it. The worker checks the token at defined checkpoints (before resolving,
//! before decoding, after decoding) and abandons the load when it has been
//! cancelled.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for a pending load.
///
/// Clones share the same underlying state; cancelling any clone is observed
/// by all of them.
///
/// # Example
///
/// ```
/// use lightbox_loader::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether `cancel()` has been called on this token or any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether `other` is a clone of this token. Distinguishes the request a
    /// token belongs to from a later request that reuses the same key.
    pub fn shares_flag(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}
