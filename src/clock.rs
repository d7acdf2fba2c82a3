// =============================================================================
// Wall-clock source
// =============================================================================
//
// The scheduled reconnect compares wall-clock seconds, so the connection
// manager reads time through this trait instead of calling the system clock
// directly.  Tests drive a `ManualClock` forward by hand.
// =============================================================================

use std::sync::Arc;

/// Source of UNIX time in whole seconds.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Convenience constructor used by `main`.
pub fn system() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[cfg(test)]
pub use manual::ManualClock;
