//! Cooperative cancellation for sweep sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag for one sweep session.
///
/// Created by the orchestrator, written by the external controller (UI,
/// signal handler), and polled read-only inside the control loops: at the top
/// of every outer and inner iteration and inside every bounded wait.
/// Cancellation is cooperative; an in-flight blocking operation still runs to
/// its own timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        // Cancelling again is harmless.
        other.cancel();
        assert!(token.is_cancelled());
    }
}
