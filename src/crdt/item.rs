//! Item: a run of characters in the replicated sequence
//!
//! Characters inserted by one operation are stored together as one item
//! (run-length encoding) and split only when an edit lands inside the run.
//! Each item knows:
//! - What its first character was inserted after (left origin)
//! - What it was inserted before (right origin)
//! - Whether, and by which operation, it was deleted (tombstone)
//! - Its formatting marks
//!
//! Inside a run, character `i > 0` has character `i - 1` as its left
//! origin and shares the run's right origin, so splitting a run never
//! changes where any character sits.

use super::id::ItemId;
use crate::ClientId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Visible formatting attributes (e.g. `bold -> "true"`)
pub type Attributes = BTreeMap<String, String>;

/// Ordering stamp for last-writer-wins formatting
///
/// Lamport time first, author second. Formats carried by the insert itself
/// use lamport 0 so any later format operation overrides them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub lamport: u64,
    pub client: ClientId,
}

impl Stamp {
    pub fn new(lamport: u64, client: ClientId) -> Self {
        Self { lamport, client }
    }
}

/// A formatting value with the stamp of the operation that wrote it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    /// `None` means the attribute was explicitly removed
    pub value: Option<String>,
    pub stamp: Stamp,
}

/// What an item holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    Text(String),
    /// Tombstone whose characters were garbage collected; only the
    /// identifiers and origins remain
    Collected,
}

/// A run of consecutive characters from one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Identifier of the first character
    pub id: ItemId,

    /// Number of characters (always >= 1)
    pub len: u64,

    /// Item this was inserted after (None = document start)
    pub origin: Option<ItemId>,

    /// Item this was inserted before (None = document end)
    pub right_origin: Option<ItemId>,

    pub content: Content,

    /// Operation that deleted this run, if any
    pub deleted_by: Option<ItemId>,

    pub marks: BTreeMap<String, Mark>,
}

impl Item {
    pub fn new(
        id: ItemId,
        text: impl Into<String>,
        origin: Option<ItemId>,
        right_origin: Option<ItemId>,
    ) -> Self {
        let text = text.into();
        Self {
            id,
            len: text.chars().count() as u64,
            origin,
            right_origin,
            content: Content::Text(text),
            deleted_by: None,
            marks: BTreeMap::new(),
        }
    }

    /// Seed formatting from the inserting operation
    pub fn with_attributes(mut self, attrs: &Attributes) -> Self {
        let stamp = Stamp::new(0, self.id.client);
        for (key, value) in attrs {
            self.marks.insert(
                key.clone(),
                Mark {
                    value: Some(value.clone()),
                    stamp,
                },
            );
        }
        self
    }

    /// Identifier of the last character
    pub fn last_id(&self) -> ItemId {
        self.id.offset(self.len - 1)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        id.client == self.id.client && id.clock >= self.id.clock && id.clock < self.id.clock + self.len
    }

    /// Characters, empty once collected
    pub fn text(&self) -> &str {
        match &self.content {
            Content::Text(text) => text,
            Content::Collected => "",
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_by.is_some()
    }

    pub fn is_collected(&self) -> bool {
        self.content == Content::Collected
    }

    /// Characters this run contributes to the visible text
    pub fn visible_len(&self) -> usize {
        if self.is_deleted() {
            0
        } else {
            self.len as usize
        }
    }

    /// Mark this run deleted; returns false if it already was
    pub fn delete(&mut self, by: ItemId) -> bool {
        if self.deleted_by.is_some() {
            return false;
        }
        self.deleted_by = Some(by);
        true
    }

    /// Drop the characters and marks of a tombstone; returns false if the
    /// run is visible or already collected
    pub fn collect(&mut self) -> bool {
        if !self.is_deleted() || self.is_collected() {
            return false;
        }
        self.content = Content::Collected;
        self.marks.clear();
        true
    }

    /// Split off everything from character `offset` onwards
    ///
    /// `offset` must be within `1..len`.
    pub fn split(&mut self, offset: u64) -> Item {
        debug_assert!(offset > 0 && offset < self.len);
        let content = match &mut self.content {
            Content::Text(text) => {
                let at = text
                    .char_indices()
                    .nth(offset as usize)
                    .map_or(text.len(), |(i, _)| i);
                Content::Text(text.split_off(at))
            }
            Content::Collected => Content::Collected,
        };
        let right = Item {
            id: self.id.offset(offset),
            len: self.len - offset,
            origin: Some(self.id.offset(offset - 1)),
            right_origin: self.right_origin,
            content,
            deleted_by: self.deleted_by,
            marks: self.marks.clone(),
        };
        self.len = offset;
        right
    }

    /// Append `next` if it continues this run exactly; returns whether it
    /// was absorbed
    pub fn try_squash(&mut self, next: &Item) -> bool {
        if next.id != self.id.offset(self.len)
            || next.origin != Some(self.last_id())
            || next.right_origin != self.right_origin
        {
            return false;
        }
        let same_state = self.deleted_by == next.deleted_by && self.marks == next.marks;
        match (&mut self.content, &next.content) {
            (Content::Collected, Content::Collected) => {}
            (Content::Text(text), Content::Text(more)) if same_state => text.push_str(more),
            _ => return false,
        }
        self.len += next.len;
        true
    }

    /// Apply a format mark if it wins last-writer-wins; returns whether
    /// the attribute value changed
    pub fn apply_mark(&mut self, key: &str, value: Option<&str>, stamp: Stamp) -> bool {
        if self.is_collected() {
            return false;
        }
        match self.marks.get_mut(key) {
            Some(existing) if existing.stamp >= stamp => false,
            Some(existing) => {
                let changed = existing.value.as_deref() != value;
                existing.value = value.map(str::to_string);
                existing.stamp = stamp;
                changed
            }
            None => {
                self.marks.insert(
                    key.to_string(),
                    Mark {
                        value: value.map(str::to_string),
                        stamp,
                    },
                );
                value.is_some()
            }
        }
    }

    /// Currently visible attributes (removed marks excluded)
    pub fn attributes(&self) -> Attributes {
        self.marks
            .iter()
            .filter_map(|(key, mark)| mark.value.as_ref().map(|v| (key.clone(), v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_creation() {
        let id = ItemId::new(1, 10);
        let item = Item::new(id, "héllo", None, None);

        assert_eq!(item.id, id);
        assert_eq!(item.len, 5);
        assert_eq!(item.last_id(), ItemId::new(1, 14));
        assert_eq!(item.text(), "héllo");
        assert!(item.contains(&ItemId::new(1, 12)));
        assert!(!item.contains(&ItemId::new(1, 15)));
        assert!(!item.is_deleted());
    }

    #[test]
    fn test_item_deletion_is_once() {
        let mut item = Item::new(ItemId::new(1, 1), "a", None, None);
        assert!(item.delete(ItemId::new(2, 1)));
        assert!(!item.delete(ItemId::new(3, 1)));
        assert_eq!(item.deleted_by, Some(ItemId::new(2, 1)));
        assert_eq!(item.visible_len(), 0);
    }

    #[test]
    fn test_split_keeps_character_origins() {
        let right_origin = Some(ItemId::new(9, 1));
        let mut item = Item::new(ItemId::new(1, 1), "añbc", None, right_origin);
        let right = item.split(2);

        assert_eq!(item.text(), "añ");
        assert_eq!(item.len, 2);
        assert_eq!(right.text(), "bc");
        assert_eq!(right.id, ItemId::new(1, 3));
        assert_eq!(right.origin, Some(ItemId::new(1, 2)));
        assert_eq!(right.right_origin, right_origin);
    }

    #[test]
    fn test_squash_is_inverse_of_split() {
        let mut item = Item::new(ItemId::new(1, 1), "abcd", None, None);
        let whole = item.clone();
        let right = item.split(1);
        assert!(item.try_squash(&right));
        assert_eq!(item, whole);

        // A run typed elsewhere does not continue this one
        let other = Item::new(ItemId::new(1, 5), "e", Some(ItemId::new(1, 2)), None);
        assert!(!item.try_squash(&other));
    }

    #[test]
    fn test_collect_drops_content_only_for_tombstones() {
        let mut item = Item::new(ItemId::new(1, 1), "abc", None, None);
        item.apply_mark("bold", Some("true"), Stamp::new(1, 1));
        assert!(!item.collect());

        item.delete(ItemId::new(1, 4));
        assert!(item.collect());
        assert!(!item.collect());
        assert_eq!(item.text(), "");
        assert_eq!(item.len, 3);
        assert!(item.marks.is_empty());
        assert!(!item.apply_mark("bold", Some("true"), Stamp::new(2, 1)));
    }

    #[test]
    fn test_mark_last_writer_wins() {
        let mut item = Item::new(ItemId::new(1, 1), "a", None, None);

        assert!(item.apply_mark("bold", Some("true"), Stamp::new(2, 1)));
        // Older stamp loses
        assert!(!item.apply_mark("bold", None, Stamp::new(1, 9)));
        assert_eq!(item.attributes().get("bold").map(String::as_str), Some("true"));

        // Same lamport, higher client wins
        assert!(item.apply_mark("bold", None, Stamp::new(2, 5)));
        assert!(item.attributes().is_empty());
    }

    #[test]
    fn test_insert_attributes_are_overridable() {
        let mut attrs = Attributes::new();
        attrs.insert("italic".into(), "true".into());
        let mut item = Item::new(ItemId::new(4, 1), "x", None, None).with_attributes(&attrs);
        assert_eq!(item.attributes(), attrs);

        assert!(item.apply_mark("italic", None, Stamp::new(1, 1)));
        assert!(item.attributes().is_empty());
    }
}
