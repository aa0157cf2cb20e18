//! User cancellation of a blocking wait.
//!
//! A signal handler (Ctrl-C in the binary) calls [`CancelToken::cancel`];
//! the wait loop polls [`CancelToken::take`] between reads. The counter lets
//! the loop tell a first cancellation from a repeated one.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Cloneable handle onto a pending-cancel counter.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    pending: Arc<AtomicU32>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Consume pending requests, returning how many arrived.
    pub fn take(&self) -> u32 {
        self.pending.swap(0, Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }
}

/// Asked before abandoning a target that will not stop.
pub trait Confirm: Send {
    /// Return `true` to give up on the remote process.
    fn confirm_abandon(&mut self) -> bool;
}

/// Answers every confirmation with a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirm for AutoConfirm {
    fn confirm_abandon(&mut self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_counts_and_clears() {
        let token = CancelToken::new();
        assert!(!token.is_pending());
        token.cancel();
        token.cancel();
        assert!(token.is_pending());
        assert_eq!(token.take(), 2);
        assert_eq!(token.take(), 0);
    }

    #[test]
    fn cancel_shared_between_clones() {
        let token = CancelToken::new();
        let handler = token.clone();
        std::thread::spawn(move || handler.cancel()).join().unwrap();
        assert_eq!(token.take(), 1);
    }

    #[test]
    fn auto_confirm_answers_fixed() {
        assert!(AutoConfirm(true).confirm_abandon());
        assert!(!AutoConfirm(false).confirm_abandon());
    }
}
