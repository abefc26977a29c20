//! Cooperative cancellation for blocking loops
//!
//! A [`CancelToken`] is cloned into whoever may want to stop a blocking
//! operation. The polling side sleeps through [`CancelToken::sleep`], which
//! returns early as soon as the token is cancelled.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

/// Shared cancellation flag with an interruptible sleep
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token and wake every sleeper
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        if !*cancelled {
            tracing::debug!("cancellation requested");
        }
        *cancelled = true;
        self.inner.wakeup.notify_all();
    }

    /// Check whether the token has been cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Sleep for `duration` unless cancelled first
    ///
    /// Returns `true` if the full duration elapsed, `false` if the token
    /// was (or became) cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if *cancelled {
            return false;
        }
        // Loop guards against spurious wakeups.
        let deadline = std::time::Instant::now() + duration;
        while !*cancelled {
            if self
                .inner
                .wakeup
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                return !*cancelled;
            }
        }
        false
    }
}
