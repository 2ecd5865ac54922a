use crate::Millis;

/// Rate limiter for awareness broadcasts
///
/// Cursor moves mark the throttle dirty; at most one broadcast fires per
/// interval and it always carries the latest state, so intermediate
/// positions are dropped rather than queued.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Millis,
    last_fired: Option<Millis>,
    dirty: bool,
}

impl Throttle {
    pub fn new(interval: Millis) -> Self {
        Self {
            interval,
            last_fired: None,
            dirty: false,
        }
    }

    /// Record that there is something new to send
    pub fn mark(&mut self) {
        self.dirty = true;
    }

    /// Whether a broadcast should go out at `now`; clears the dirty flag
    /// when it does
    pub fn ready(&mut self, now: Millis) -> bool {
        if !self.dirty {
            return false;
        }
        let due = self
            .last_fired
            .map_or(true, |last| now >= last.saturating_add(self.interval));
        if due {
            self.dirty = false;
            self.last_fired = Some(now);
        }
        due
    }
}
