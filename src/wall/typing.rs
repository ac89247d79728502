//! Typing indicator and outgoing typing throttle.
//!
//! Both take `now` explicitly so callers decide which clock drives them.

use std::time::Duration;

use tokio::time::Instant;

/// "Someone is typing" flag that resets a fixed time after the most recent
/// signal from any client.
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl TypingIndicator {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, deadline: None }
    }

    /// Raise the flag and restart the reset countdown from `now`.
    pub fn signal(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the flag will drop, if it is up.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drop the flag if its deadline has passed. Returns true if it dropped.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Leading-edge throttle: the first keystroke broadcasts, then at most one
/// broadcast per interval.
#[derive(Debug, Clone)]
pub struct BroadcastThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl BroadcastThrottle {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Whether to broadcast now. Records the emission when it returns true.
    pub fn should_emit(&mut self, now: Instant) -> bool {
        let due = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }
}

#[cfg(test)]
#[path = "typing_test.rs"]
mod tests;
