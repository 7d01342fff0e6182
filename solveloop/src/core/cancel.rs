//! Cooperative cancellation flag shared between the executor and a runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cheap cloneable cancellation flag.
///
/// The executor sets it when a deadline elapses. Runtimes poll it and stop
/// as soon as they notice; nothing waits for them to do so.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
