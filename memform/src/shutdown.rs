//! Cooperative cancellation

use crate::error::{EncodingError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation flag shared between the party requesting shutdown and every converter that
/// should honour it. Clones observe the same flag.
#[derive(Clone, Default, Debug)]
pub struct ShutdownNotifier {
    requested: Arc<AtomicBool>,
}

impl ShutdownNotifier {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn request_shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn should_shutdown(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Polled at loop boundaries of long-running encodings
    pub fn shutdown_if_necessary(&self) -> Result<()> {
        if self.should_shutdown() {
            Err(EncodingError::Interrupted)
        } else {
            Ok(())
        }
    }
}
