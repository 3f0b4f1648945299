use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{OtsuError, Result};

/// Cooperative cancellation flag shared between the caller and a worker.
///
/// Strategies poll it at stage boundaries (before/after preprocessing,
/// before/after the scale/region pass, before postprocessing); the inner
/// threshold search is not interrupted mid-loop.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns a typed error when the token has fired.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(OtsuError::cancelled(operation))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check("op").is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(
            token.check("op").unwrap_err(),
            OtsuError::Cancelled { .. }
        ));
    }
}
