// =============================================================================
// Reconnect timing — exponential backoff and the scheduled session refresh
// =============================================================================

use std::time::Duration;

/// Exponential backoff between failed connection attempts.
///
/// Attempt `n` (1-based) waits `min(2^n, cap)` seconds, so the first three
/// failures wait 2s, 4s and 8s.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    cap_secs: u64,
    max_attempts: u32,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(cap_secs: u64, max_attempts: u32) -> Self {
        Self {
            cap_secs,
            max_attempts,
            attempt: 0,
        }
    }

    /// Register a failure and return the wait before the next attempt, or
    /// `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        if self.attempt > self.max_attempts {
            return None;
        }
        let secs = 2u64
            .checked_pow(self.attempt)
            .unwrap_or(u64::MAX)
            .min(self.cap_secs);
        Some(Duration::from_secs(secs))
    }

    /// Called once a session reaches `Subscribed`.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Periodic forced refresh of a healthy session.
///
/// Times are wall-clock epoch seconds from the injected clock.
#[derive(Debug, Clone)]
pub struct ScheduledReconnect {
    every_secs: i64,
    since: Option<i64>,
    forced: bool,
}

impl ScheduledReconnect {
    pub fn new(every_secs: u64) -> Self {
        Self {
            every_secs: i64::try_from(every_secs).unwrap_or(i64::MAX),
            since: None,
            forced: false,
        }
    }

    /// Start timing a freshly subscribed session.
    pub fn arm(&mut self, now: i64) {
        self.since = Some(now);
        self.forced = false;
    }

    pub fn disarm(&mut self) {
        self.since = None;
    }

    /// Make the next `is_due` return true regardless of elapsed time.
    pub fn force(&mut self) {
        self.forced = true;
    }

    pub fn is_due(&self, now: i64) -> bool {
        if self.forced {
            return true;
        }
        self.since
            .is_some_and(|since| self.every_secs > 0 && now - since >= self.every_secs)
    }

    /// Seconds left before the refresh fires; `None` when no session is armed.
    pub fn remaining(&self, now: i64) -> Option<i64> {
        let since = self.since?;
        if self.forced {
            return Some(0);
        }
        Some((since + self.every_secs - now).max(0))
    }
}
