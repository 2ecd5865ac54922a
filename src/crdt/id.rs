//! Logical identifiers for document characters and operations
//!
//! Every character (and every delete or format operation) consumes one
//! sequence number from its author. The pair (client, clock) is globally
//! unique and never reused.

use crate::ClientId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Unique identifier for a character or operation
///
/// Ordered lexicographically by (client, clock). This total order is the
/// tie-break for concurrent inserts at the same position, so every replica
/// picks the same interleaving regardless of arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    /// Client that created this item
    pub client: ClientId,

    /// Per-client sequence number (starts at 1)
    pub clock: u64,
}

impl ItemId {
    pub fn new(client: ClientId, clock: u64) -> Self {
        Self { client, clock }
    }

    /// Identifier `n` sequence numbers later from the same client
    pub fn offset(&self, n: u64) -> Self {
        Self::new(self.client, self.clock + n)
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.client.cmp(&other.client) {
            Ordering::Equal => self.clock.cmp(&other.clock),
            other => other,
        }
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}:{}", self.client, self.clock)
    }
}

/// A run of consecutive identifiers from one client
///
/// Used by delete and format operations to address many characters
/// compactly: typing "hello" and deleting it is one range, not five ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdRange {
    pub client: ClientId,
    /// First clock in the run
    pub clock: u64,
    /// Number of identifiers (always >= 1)
    pub len: u64,
}

impl IdRange {
    pub fn new(client: ClientId, clock: u64, len: u64) -> Self {
        Self { client, clock, len }
    }

    /// Last identifier in the run
    pub fn last(&self) -> ItemId {
        ItemId::new(self.client, self.clock + self.len - 1)
    }

    /// Try to extend this run with a range that directly follows it
    pub fn try_extend(&mut self, next: IdRange) -> bool {
        if next.client == self.client && next.clock == self.clock + self.len {
            self.len += next.len;
            true
        } else {
            false
        }
    }
}

/// Merge ranges that continue each other, preserving order
pub fn coalesce_ranges<I: IntoIterator<Item = IdRange>>(ranges: I) -> Vec<IdRange> {
    let mut merged: Vec<IdRange> = Vec::new();
    for range in ranges {
        let extended = match merged.last_mut() {
            Some(last) => last.try_extend(range),
            None => false,
        };
        if !extended {
            merged.push(range);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_ordering() {
        let id1 = ItemId::new(1, 10);
        let id2 = ItemId::new(1, 20);
        let id3 = ItemId::new(2, 5);

        // Same client: ordered by clock
        assert!(id1 < id2);

        // Different clients: client takes precedence
        assert!(id2 < id3);
        assert!(id1 < id3);
    }

    #[test]
    fn test_display() {
        assert_eq!(ItemId::new(255, 3).to_string(), "ff:3");
    }

    #[test]
    fn test_range_last() {
        let range = IdRange::new(3, 10, 4);
        assert_eq!(range.last(), ItemId::new(3, 13));
    }

    #[test]
    fn test_coalesce_ranges() {
        let pieces = vec![
            IdRange::new(1, 1, 1),
            IdRange::new(1, 2, 2),
            IdRange::new(2, 7, 1),
            IdRange::new(1, 4, 1),
        ];
        assert_eq!(
            coalesce_ranges(pieces),
            vec![
                IdRange::new(1, 1, 3),
                IdRange::new(2, 7, 1),
                IdRange::new(1, 4, 1),
            ]
        );
    }
}
