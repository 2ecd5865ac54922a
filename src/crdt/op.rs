//! Operations and update records
//!
//! Local edits are expressed against visible positions ([`LocalOp`]). The
//! document turns them into position-independent [`Op`]s that reference
//! characters by [`ItemId`], which is what travels between replicas inside
//! an [`Update`].

use super::id::{IdRange, ItemId};
use super::item::Attributes;
use crate::ClientId;
use serde::{Deserialize, Serialize};

/// Structural edit produced by the editor widget, in visible coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalOp {
    /// Insert `text` before the character at `index`
    Insert {
        index: usize,
        text: String,
        attrs: Attributes,
    },
    /// Delete `len` characters starting at `index`
    Delete { index: usize, len: usize },
    /// Set (`Some`) or clear (`None`) attribute `key` over a range
    Format {
        index: usize,
        len: usize,
        key: String,
        value: Option<String>,
    },
}

impl LocalOp {
    /// Plain-text insert
    pub fn insert(index: usize, text: impl Into<String>) -> Self {
        LocalOp::Insert {
            index,
            text: text.into(),
            attrs: Attributes::new(),
        }
    }

    pub fn delete(index: usize, len: usize) -> Self {
        LocalOp::Delete { index, len }
    }

    pub fn format(index: usize, len: usize, key: impl Into<String>, value: Option<String>) -> Self {
        LocalOp::Format {
            index,
            len,
            key: key.into(),
            value,
        }
    }
}

/// Replicated operation
///
/// An insert of `n` characters occupies clocks `id.clock .. id.clock + n`;
/// delete and format occupy one clock each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Insert {
        id: ItemId,
        origin: Option<ItemId>,
        right_origin: Option<ItemId>,
        content: String,
        attrs: Attributes,
    },
    Delete {
        id: ItemId,
        targets: Vec<IdRange>,
    },
    Format {
        id: ItemId,
        /// Lamport time of the format, for last-writer-wins
        lamport: u64,
        targets: Vec<IdRange>,
        key: String,
        value: Option<String>,
    },
}

impl Op {
    /// Identifier of the first sequence number this op occupies
    pub fn id(&self) -> ItemId {
        match self {
            Op::Insert { id, .. } | Op::Delete { id, .. } | Op::Format { id, .. } => *id,
        }
    }

    pub fn client(&self) -> ClientId {
        self.id().client
    }

    /// Number of sequence numbers consumed
    pub fn len(&self) -> u64 {
        match self {
            Op::Insert { content, .. } => content.chars().count() as u64,
            Op::Delete { .. } | Op::Format { .. } => 1,
        }
    }

    /// Always false for well-formed ops; inserts never carry empty content
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Last clock occupied by this op
    pub fn last_clock(&self) -> u64 {
        self.id().clock + self.len().saturating_sub(1)
    }

    /// Identifiers this op needs before it can be integrated, besides the
    /// author's previous sequence number
    pub fn dependencies(&self) -> Vec<ItemId> {
        match self {
            Op::Insert {
                origin,
                right_origin,
                ..
            } => origin.iter().chain(right_origin.iter()).copied().collect(),
            Op::Delete { targets, .. } | Op::Format { targets, .. } => {
                targets.iter().map(IdRange::last).collect()
            }
        }
    }

    /// Suffix of this op starting at `clock`
    ///
    /// Only inserts can be split; the suffix keeps the right origin and
    /// hangs off the character just before the split point.
    pub fn tail(&self, clock: u64) -> Option<Op> {
        let start = self.id().clock;
        if clock <= start {
            return Some(self.clone());
        }
        if clock > self.last_clock() {
            return None;
        }
        match self {
            Op::Insert {
                id,
                right_origin,
                content,
                attrs,
                ..
            } => {
                let skip = (clock - start) as usize;
                Some(Op::Insert {
                    id: ItemId::new(id.client, clock),
                    origin: Some(ItemId::new(id.client, clock - 1)),
                    right_origin: *right_origin,
                    content: content.chars().skip(skip).collect(),
                    attrs: attrs.clone(),
                })
            }
            // Single-clock ops are either fully included or not at all
            _ => None,
        }
    }
}

/// Immutable batch of causally ordered operations
///
/// An update is what gets broadcast after a local edit and what
/// `compute_diff` returns. Applying it twice is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub ops: Vec<Op>,
}

impl Update {
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Concatenate updates, preserving order
    pub fn merge<I: IntoIterator<Item = Update>>(updates: I) -> Update {
        Update {
            ops: updates.into_iter().flat_map(|u| u.ops).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(client: ClientId, clock: u64, text: &str, origin: Option<ItemId>) -> Op {
        Op::Insert {
            id: ItemId::new(client, clock),
            origin,
            right_origin: None,
            content: text.to_string(),
            attrs: Attributes::new(),
        }
    }

    #[test]
    fn test_op_length_counts_chars() {
        let op = insert(1, 1, "héllo", None);
        assert_eq!(op.len(), 5);
        assert_eq!(op.last_clock(), 5);

        let del = Op::Delete {
            id: ItemId::new(1, 6),
            targets: vec![IdRange::new(1, 1, 2)],
        };
        assert_eq!(del.len(), 1);
        assert_eq!(del.last_clock(), 6);
    }

    #[test]
    fn test_insert_tail() {
        let op = insert(1, 4, "abcd", Some(ItemId::new(2, 9)));
        let tail = op.tail(6).unwrap();
        match tail {
            Op::Insert {
                id,
                origin,
                content,
                ..
            } => {
                assert_eq!(id, ItemId::new(1, 6));
                assert_eq!(origin, Some(ItemId::new(1, 5)));
                assert_eq!(content, "cd");
            }
            other => panic!("unexpected op {:?}", other),
        }

        assert_eq!(op.tail(1), Some(op.clone()));
        assert_eq!(op.tail(8), None);
    }

    #[test]
    fn test_dependencies() {
        let op = Op::Insert {
            id: ItemId::new(1, 1),
            origin: Some(ItemId::new(2, 3)),
            right_origin: Some(ItemId::new(3, 1)),
            content: "x".into(),
            attrs: Attributes::new(),
        };
        assert_eq!(
            op.dependencies(),
            vec![ItemId::new(2, 3), ItemId::new(3, 1)]
        );

        let fmt = Op::Format {
            id: ItemId::new(1, 2),
            lamport: 1,
            targets: vec![IdRange::new(2, 1, 3)],
            key: "bold".into(),
            value: Some("true".into()),
        };
        assert_eq!(fmt.dependencies(), vec![ItemId::new(2, 3)]);
    }

    #[test]
    fn test_update_merge_preserves_order() {
        let a = Update::new(vec![insert(1, 1, "a", None)]);
        let b = Update::new(vec![insert(2, 1, "b", None)]);
        let merged = Update::merge([a, b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.ops[0].client(), 1);
        assert_eq!(merged.ops[1].client(), 2);
    }
}
