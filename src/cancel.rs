// ABOUTME: Cooperative cancellation flag wired to Ctrl-C
// ABOUTME: Checked before every blocking call; partial output is not cleaned up

use crate::error::ExtractError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// Cloning is cheap; all clones observe the same flag. The traversal engine,
/// the row fetcher, and the emitter check it at their suspension points.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` once the flag is set.
    pub fn check(&self) -> Result<(), ExtractError> {
        if self.is_cancelled() {
            Err(ExtractError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Install a Ctrl-C handler that flips the returned flag.
///
/// Callers are expected to write output to a temporary path and rename on
/// success; nothing is deleted on cancellation.
pub fn install_ctrl_c_handler() -> CancelFlag {
    let flag = CancelFlag::new();
    let handler_flag = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling at next database call");
            handler_flag.cancel();
        }
    });
    flag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_until_cancelled() {
        let flag = CancelFlag::new();
        assert!(flag.check().is_ok());

        let clone = flag.clone();
        clone.cancel();

        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(ExtractError::Cancelled)));
    }
}
