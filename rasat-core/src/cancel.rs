//! Cooperative cancellation.
//!
//! Every engine loop checks the shared flag once per iteration and
//! returns `Unknown` when it is set. The flag is owned by the embedder
//! (for example an outer portfolio runner); the engines only read it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    inner: Arc<AtomicBool>,
}

impl CancellationFlag {
    /// A fresh, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }

    /// Reset for reuse between checks.
    pub fn reset(&self) {
        self.inner.store(false, Ordering::Relaxed);
    }
}
