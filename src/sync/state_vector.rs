use crate::crdt::ItemId;
use crate::ClientId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Highest observed sequence number per client
///
/// Sequence numbers start at 1, so a missing entry and an entry of 0 both
/// mean "nothing observed from this client". Entries only ever grow.
///
/// # Example
///
/// ```rust
/// use cowrite_core::StateVector;
///
/// let mut sv = StateVector::new();
/// sv.observe(7, 3);
/// sv.observe(7, 2); // never decreases
/// assert_eq!(sv.get(7), 3);
/// assert_eq!(sv.get(8), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVector {
    clocks: BTreeMap<ClientId, u64>,
}

impl StateVector {
    /// Create an empty state vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence number observed from `client` (0 if none)
    pub fn get(&self, client: ClientId) -> u64 {
        self.clocks.get(&client).copied().unwrap_or(0)
    }

    /// Record that `client` has been observed up to `clock`
    ///
    /// Lower values are ignored to keep the vector monotonic.
    pub fn observe(&mut self, client: ClientId, clock: u64) {
        if clock == 0 {
            return;
        }
        let entry = self.clocks.entry(client).or_insert(0);
        if clock > *entry {
            *entry = clock;
        }
    }

    /// Whether the operation identified by `id` has been observed
    pub fn contains(&self, id: &ItemId) -> bool {
        id.clock <= self.get(id.client)
    }

    /// Iterate `(client, clock)` pairs in client order
    pub fn iter(&self) -> impl Iterator<Item = (ClientId, u64)> + '_ {
        self.clocks.iter().map(|(client, clock)| (*client, *clock))
    }

    /// Number of clients tracked
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

impl FromIterator<(ClientId, u64)> for StateVector {
    fn from_iter<I: IntoIterator<Item = (ClientId, u64)>>(iter: I) -> Self {
        let mut sv = StateVector::new();
        for (client, clock) in iter {
            sv.observe(client, clock);
        }
        sv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_is_monotonic() {
        let mut sv = StateVector::new();
        sv.observe(1, 5);
        sv.observe(1, 3);
        assert_eq!(sv.get(1), 5);
        sv.observe(1, 9);
        assert_eq!(sv.get(1), 9);
    }

    #[test]
    fn test_zero_is_not_recorded() {
        let mut sv = StateVector::new();
        sv.observe(4, 0);
        assert!(sv.is_empty());
    }

    #[test]
    fn test_contains() {
        let sv: StateVector = [(1, 3)].into_iter().collect();
        assert!(sv.contains(&ItemId::new(1, 3)));
        assert!(!sv.contains(&ItemId::new(1, 4)));
        assert!(!sv.contains(&ItemId::new(2, 1)));
    }
}
