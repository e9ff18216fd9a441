use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared "owner went away" flag for an asynchronous chain.
///
/// Nothing is aborted: the chain runs to completion, and its result is only
/// written back if the token is still live at that moment.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Some(value)` while live, None once cancelled.
    pub fn deliver<T>(&self, value: T) -> Option<T> {
        if self.is_cancelled() {
            None
        } else {
            Some(value)
        }
    }
}
