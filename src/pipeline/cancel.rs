//! Cooperative cancellation for extraction requests
//!
//! The serving layer cancels when its caller disconnects. The pipeline checks
//! the token between stages and before the enhancer retry; a cancelled
//! request never writes to the cache.

use super::types::PipelineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation token.
///
/// Cancellation during a stage has no effect until the next checkpoint.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Stage boundary: bail out with [`PipelineError::Cancelled`] if the
    /// request was abandoned.
    pub fn checkpoint(&self, stage: &str) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            tracing::debug!(stage, "request cancelled");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.checkpoint("plan").is_ok());
    }

    #[test]
    fn cloned_token_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.checkpoint("pattern"), Err(PipelineError::Cancelled)));
    }
}
