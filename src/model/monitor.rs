//! Progress, status and cancellation signals shared between a run and its host.

use super::hysteresis::Hysteresis;
use crate::core::SafParams;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, polled by the sweep loop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Read and clear the flag in one step.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Candidate reported whenever a fit improves on its best figure of merit.
#[derive(Clone, Debug, PartialEq)]
pub struct BestFit {
    pub params: SafParams,
    pub fom: f64,
    pub curve: Hysteresis,
}

/// Receiver for run progress. Called from worker threads, so it must not block.
pub trait RunObserver: Sync {
    /// Completion fraction in [0, 1] of one channel.
    fn progress(&self, _channel: usize, _fraction: f64) {}

    /// Free-text stage description, e.g. "Global Fit (iteration 3)".
    fn status(&self, _message: &str) {}

    fn improved(&self, _best: &BestFit) {}
}

/// Observer that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl RunObserver for NullObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_flag_once() {
        let token = CancelToken::new();
        let shared = token.clone();
        assert!(!token.take());
        shared.cancel();
        assert!(token.is_cancelled());
        assert!(token.take());
        assert!(!shared.is_cancelled());
        assert!(!token.take());
    }
}
