use crate::Millis;

/// Reconnect schedule for the relay transport
///
/// Delays double from `base` up to `max`. Every failure also advances to
/// the next endpoint, so a dead relay does not block the others.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Millis,
    max: Millis,
    attempt: u32,
    endpoints: usize,
    current: usize,
}

impl Backoff {
    pub fn new(base: Millis, max: Millis, endpoints: usize) -> Self {
        Self {
            base,
            max,
            attempt: 0,
            endpoints: endpoints.max(1),
            current: 0,
        }
    }

    /// Index of the endpoint to try next
    pub fn endpoint(&self) -> usize {
        self.current
    }

    /// Consecutive failures so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Record a failure; returns how long to wait before the next attempt
    pub fn fail(&mut self) -> Millis {
        let delay = self
            .base
            .saturating_mul(1u64 << self.attempt.min(20))
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        self.current = (self.current + 1) % self.endpoints;
        delay
    }

    /// Connection established; start over on the current endpoint
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
