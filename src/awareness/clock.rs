/// Increasing clock for awareness conflict resolution
///
/// Awareness state is ephemeral and last-write-wins per client, so a single
/// counter is enough; no vector clocks are needed. Receiving a remote value
/// pulls the local counter forward so the next local write wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IncreasingClock {
    value: u64,
}

impl IncreasingClock {
    /// Create a new clock starting at 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the new value
    pub fn tick(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    /// Current value without incrementing
    pub fn get(&self) -> u64 {
        self.value
    }

    /// Move forward to `other` if it is ahead
    pub fn witness(&mut self, other: u64) {
        self.value = self.value.max(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_tick() {
        let mut clock = IncreasingClock::new();
        assert_eq!(clock.get(), 0);
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.get(), 2);
    }

    #[test]
    fn test_clock_witness() {
        let mut clock = IncreasingClock::new();
        clock.witness(5);
        clock.witness(3); // Should not decrease
        assert_eq!(clock.get(), 5);
        assert_eq!(clock.tick(), 6);
    }
}
