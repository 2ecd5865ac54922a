//! Document: the replicated rich-text sequence
//!
//! The document keeps every character ever inserted, in document order,
//! including tombstones. Characters are stored in runs ([`Item`]s), one per
//! insert operation, split only where later edits land inside them.
//! Integration follows the YATA rule: a new run is placed between its left
//! and right origin, and among concurrent runs competing for the same gap
//! the order is decided by [`ItemId`]. That makes the final order
//! independent of arrival order.
//!
//! # Architecture
//!
//! ```text
//! Document {
//!     items:   [ab, (c), de]       // runs in document order, (c) is a tombstone
//!     rope:    "abde"              // visible text, kept in step with items
//!     state:   {1: 3, 2: 2}        // highest clock seen per client
//!     history: {1: [ops], 2: [..]} // per-client op log, source of diffs
//!     pending: [ops]               // remote ops waiting for dependencies
//! }
//! ```
//!
//! # Example
//!
//! ```rust
//! use cowrite_core::{Document, LocalOp};
//!
//! let mut x = Document::new(1);
//! let mut y = Document::new(2);
//!
//! let update = x.apply_local_op(LocalOp::insert(0, "ab"));
//! y.apply_remote_update(&update);
//!
//! // Concurrent inserts at the same position
//! let from_x = x.apply_local_op(LocalOp::insert(1, "c"));
//! let from_y = y.apply_local_op(LocalOp::insert(1, "d"));
//! x.apply_remote_update(&from_y);
//! y.apply_remote_update(&from_x);
//!
//! assert_eq!(x.text(), y.text());
//! assert_eq!(x.text(), "acdb");
//! ```

use super::id::{coalesce_ranges, IdRange, ItemId};
use super::item::{Attributes, Item, Stamp};
use super::op::{LocalOp, Op, Update};
use crate::sync::StateVector;
use crate::ClientId;
use ropey::Rope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Result of integrating a remote update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Operations integrated by this call (including previously buffered ones)
    pub applied: usize,
    /// Operations still waiting for dependencies
    pub buffered: usize,
    /// Whether the visible document changed
    pub changed: bool,
}

/// Cursor position anchored to a character instead of an index
///
/// The position sits just before `item`; `None` anchors to the end of the
/// document. Resolving it after concurrent edits gives the index that
/// still points at the same place in the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StickyIndex {
    pub item: Option<ItemId>,
}

/// Run of visible characters sharing the same formatting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub attrs: Attributes,
}

/// Paragraph: the spans between two newlines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub spans: Vec<Span>,
}

impl Block {
    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Replicated document model
#[derive(Debug, Clone)]
pub struct Document {
    client: ClientId,
    items: Vec<Item>,
    rope: Rope,
    state: StateVector,
    lamport: u64,
    history: BTreeMap<ClientId, Vec<Op>>,
    pending: Vec<Op>,
}

impl Document {
    /// Create an empty document owned by `client`
    pub fn new(client: ClientId) -> Self {
        Self {
            client,
            items: Vec::new(),
            rope: Rope::new(),
            state: StateVector::new(),
            lamport: 0,
            history: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client
    }

    /// Number of visible characters
    pub fn len(&self) -> usize {
        self.rope.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Visible text
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Visible text between two character positions (clamped)
    pub fn text_range(&self, start: usize, end: usize) -> String {
        let len = self.len();
        let end = end.min(len);
        let start = start.min(end);
        self.rope.slice(start..end).to_string()
    }

    /// Snapshot of everything this replica has observed
    pub fn state_vector(&self) -> StateVector {
        self.state.clone()
    }

    /// Remote operations waiting for missing dependencies
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Deleted characters whose content is still held in the sequence
    pub fn tombstone_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.is_deleted() && !item.is_collected())
            .map(|item| item.len as usize)
            .sum()
    }

    /// Runs in the sequence, tombstones and collected runs included
    pub fn run_count(&self) -> usize {
        self.items.len()
    }

    /// Apply an edit made on this replica
    ///
    /// The document changes immediately. The returned update is what must
    /// be broadcast to peers; it is empty when the edit was a no-op.
    pub fn apply_local_op(&mut self, op: LocalOp) -> Update {
        self.apply_local_batch(std::iter::once(op))
    }

    /// Apply several local edits as one update
    ///
    /// Positions of later ops refer to the document after the earlier ops.
    pub fn apply_local_batch<I: IntoIterator<Item = LocalOp>>(&mut self, ops: I) -> Update {
        let mut out = Vec::new();
        for local in ops {
            if let Some(op) = self.make_op(local) {
                self.integrate(op.clone());
                out.push(op);
            }
        }
        Update::new(out)
    }

    /// Integrate an update received from a peer
    ///
    /// Operations already observed are skipped. Operations whose
    /// dependencies are missing are buffered and retried whenever later
    /// updates arrive; they are never dropped or applied out of order.
    pub fn apply_remote_update(&mut self, update: &Update) -> ApplyOutcome {
        for op in &update.ops {
            let seen = self.state.get(op.client());
            if op.last_clock() <= seen {
                continue;
            }
            let op = match op.tail(seen + 1) {
                Some(op) => op,
                None => continue,
            };
            let id = op.id();
            if self.pending.iter().any(|p| p.id() == id) {
                continue;
            }
            self.pending.push(op);
        }

        let (applied, changed) = self.drain_pending();
        if !self.pending.is_empty() {
            debug!(
                buffered = self.pending.len(),
                applied, "operations waiting for causal dependencies"
            );
        }

        ApplyOutcome {
            applied,
            buffered: self.pending.len(),
            changed,
        }
    }

    /// Minimal update bringing a replica at `remote` up to date
    pub fn compute_diff(&self, remote: &StateVector) -> Update {
        let mut ops = Vec::new();
        for (client, log) in &self.history {
            let seen = remote.get(*client);
            for op in log {
                if op.last_clock() <= seen {
                    continue;
                }
                if let Some(op) = op.tail(seen + 1) {
                    ops.push(op);
                }
            }
        }
        Update::new(ops)
    }

    /// Full history as a single update
    pub fn encode_state_as_update(&self) -> Update {
        self.compute_diff(&StateVector::new())
    }

    /// Drop the content of tombstones every known peer has observed
    ///
    /// `peers` holds the latest state vector reported by each connected
    /// peer. With no peers the set is unknown and nothing is collected.
    /// Collected runs stay in the sequence with their identifiers and
    /// origins, so operations from a peer that was offline meanwhile still
    /// integrate exactly where they would on a replica that kept the
    /// tombstone. Returns the number of characters collected.
    pub fn garbage_collect_tombstones(&mut self, peers: &[StateVector]) -> usize {
        if peers.is_empty() {
            return 0;
        }

        let mut collected = 0;
        for item in &mut self.items {
            let Some(by) = item.deleted_by else {
                continue;
            };
            let last = item.last_id();
            if peers.iter().all(|sv| sv.contains(&by) && sv.contains(&last)) && item.collect() {
                collected += item.len as usize;
            }
        }

        if collected > 0 {
            self.items.dedup_by(|next, prev| prev.try_squash(next));
            debug!(collected, runs = self.run_count(), "collected tombstones");
        }
        collected
    }

    /// Anchor a visible position to the character currently at it
    pub fn sticky_index(&self, pos: usize) -> StickyIndex {
        StickyIndex {
            item: self
                .locate_visible(pos)
                .map(|(idx, offset)| self.items[idx].id.offset(offset)),
        }
    }

    /// Current visible position of an anchored cursor
    ///
    /// A cursor on a deleted character resolves to where that character
    /// used to be.
    pub fn resolve_sticky(&self, sticky: &StickyIndex) -> usize {
        let Some(id) = sticky.item else {
            return self.len();
        };
        let Some(idx) = self.find(id) else {
            return self.len();
        };
        let item = &self.items[idx];
        let before = self.visible_before(idx);
        if item.is_deleted() {
            before
        } else {
            before + (id.clock - item.id.clock) as usize
        }
    }

    /// Visible text split into formatting runs
    pub fn spans(&self) -> Vec<Span> {
        let mut spans: Vec<Span> = Vec::new();
        for item in self.items.iter().filter(|item| !item.is_deleted()) {
            let attrs = item.attributes();
            match spans.last_mut() {
                Some(last) if last.attrs == attrs => last.text.push_str(item.text()),
                _ => spans.push(Span {
                    text: item.text().to_string(),
                    attrs,
                }),
            }
        }
        spans
    }

    /// Visible text split into newline-delimited blocks of spans
    ///
    /// There is always at least one (possibly empty) block.
    pub fn blocks(&self) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut current = Block::default();
        for item in self.items.iter().filter(|item| !item.is_deleted()) {
            let attrs = item.attributes();
            for (i, line) in item.text().split('\n').enumerate() {
                if i > 0 {
                    blocks.push(std::mem::take(&mut current));
                }
                if line.is_empty() {
                    continue;
                }
                match current.spans.last_mut() {
                    Some(last) if last.attrs == attrs => last.text.push_str(line),
                    _ => current.spans.push(Span {
                        text: line.to_string(),
                        attrs: attrs.clone(),
                    }),
                }
            }
        }
        blocks.push(current);
        blocks
    }

    /// Translate a local edit into a replicated op, or `None` for no-ops
    fn make_op(&mut self, local: LocalOp) -> Option<Op> {
        let id = ItemId::new(self.client, self.state.get(self.client) + 1);
        match local {
            LocalOp::Insert { index, text, attrs } => {
                if text.is_empty() {
                    return None;
                }
                let (origin, right_origin) = match self.locate_visible(index) {
                    Some((idx, offset)) => {
                        let item = &self.items[idx];
                        let origin = if offset > 0 {
                            Some(item.id.offset(offset - 1))
                        } else {
                            idx.checked_sub(1).map(|l| self.items[l].last_id())
                        };
                        (origin, Some(item.id.offset(offset)))
                    }
                    None => (self.items.last().map(Item::last_id), None),
                };
                Some(Op::Insert {
                    id,
                    origin,
                    right_origin,
                    content: text,
                    attrs,
                })
            }
            LocalOp::Delete { index, len } => {
                let targets = self.visible_ranges(index, len);
                if targets.is_empty() {
                    return None;
                }
                Some(Op::Delete { id, targets })
            }
            LocalOp::Format {
                index,
                len,
                key,
                value,
            } => {
                let targets = self.visible_ranges(index, len);
                if targets.is_empty() {
                    return None;
                }
                Some(Op::Format {
                    id,
                    lamport: self.lamport + 1,
                    targets,
                    key,
                    value,
                })
            }
        }
    }

    /// Integrate every buffered op whose dependencies are satisfied
    fn drain_pending(&mut self) -> (usize, bool) {
        let mut applied = 0;
        let mut changed = false;
        loop {
            let mut progressed = false;
            let mut i = 0;
            while i < self.pending.len() {
                let seen = self.state.get(self.pending[i].client());
                if self.pending[i].last_clock() <= seen {
                    self.pending.remove(i);
                    continue;
                }
                if self.pending[i].id().clock <= seen {
                    // Partially covered by something integrated meanwhile
                    let op = self.pending.remove(i);
                    if let Some(tail) = op.tail(seen + 1) {
                        self.pending.insert(i, tail);
                    }
                    continue;
                }
                if self.is_ready(&self.pending[i]) {
                    let op = self.pending.remove(i);
                    changed |= self.integrate(op);
                    applied += 1;
                    progressed = true;
                } else {
                    i += 1;
                }
            }
            if !progressed {
                break;
            }
        }
        (applied, changed)
    }

    fn is_ready(&self, op: &Op) -> bool {
        op.id().clock == self.state.get(op.client()) + 1
            && op.dependencies().iter().all(|dep| self.state.contains(dep))
    }

    /// Integrate a ready op; returns whether visible content changed
    fn integrate(&mut self, op: Op) -> bool {
        let mut changed = false;
        match &op {
            Op::Insert {
                id,
                origin,
                right_origin,
                content,
                attrs,
            } => {
                let item =
                    Item::new(*id, content.as_str(), *origin, *right_origin).with_attributes(attrs);
                self.integrate_item(item);
                changed = true;
            }
            Op::Delete { id, targets } => {
                for range in targets {
                    let end = range.clock + range.len;
                    let mut clock = range.clock;
                    while clock < end {
                        let target = ItemId::new(range.client, clock);
                        let Some(idx) = self.isolate(target, end - clock) else {
                            warn!(%target, "delete target missing from document");
                            break;
                        };
                        let len = self.items[idx].len;
                        if !self.items[idx].is_deleted() {
                            let vis = self.visible_before(idx);
                            self.items[idx].delete(*id);
                            self.rope.remove(vis..vis + len as usize);
                            changed = true;
                        }
                        clock += len;
                    }
                }
            }
            Op::Format {
                id,
                lamport,
                targets,
                key,
                value,
            } => {
                self.lamport = self.lamport.max(*lamport);
                let stamp = Stamp::new(*lamport, id.client);
                for range in targets {
                    let end = range.clock + range.len;
                    let mut clock = range.clock;
                    while clock < end {
                        let target = ItemId::new(range.client, clock);
                        let Some(idx) = self.isolate(target, end - clock) else {
                            warn!(%target, "format target missing from document");
                            break;
                        };
                        let item = &mut self.items[idx];
                        if item.apply_mark(key, value.as_deref(), stamp) && !item.is_deleted() {
                            changed = true;
                        }
                        clock += item.len;
                    }
                }
            }
        }

        self.state.observe(op.client(), op.last_clock());
        self.history.entry(op.client()).or_default().push(op);
        changed
    }

    /// Place one run between its origins (YATA)
    fn integrate_item(&mut self, item: Item) {
        let left = item.origin.and_then(|id| {
            let idx = self.boundary_after(id);
            if idx.is_none() {
                warn!(%id, "left origin missing from document");
            }
            idx
        });
        let right = match item.right_origin {
            Some(id) => self.boundary_at(id).unwrap_or_else(|| {
                warn!(%id, "right origin missing from document");
                self.items.len()
            }),
            None => self.items.len(),
        };

        // Runs in `start..scan` were passed by the scan; of those,
        // `dest..scan` still conflict with the new run
        let start = left.map_or(0, |l| l + 1);
        let mut dest = start;
        let mut scan = start;

        while scan < right {
            let other = &self.items[scan];
            if other.origin == item.origin {
                // Siblings competing for the same gap: lower id goes first
                if other.id < item.id {
                    dest = scan + 1;
                } else if other.right_origin == item.right_origin {
                    break;
                }
            } else if let Some(origin_idx) = other
                .origin
                .and_then(|o| self.find(o))
                .filter(|idx| (start..scan).contains(idx))
            {
                // `other` hangs off a run we already passed
                if origin_idx < dest {
                    dest = scan + 1;
                }
            } else {
                break;
            }
            scan += 1;
        }

        let visible = self.visible_before(dest);
        self.rope.insert(visible, item.text());
        self.items.insert(dest, item);

        // Typing at the end of one's own run extends it
        if dest > 0 {
            let (before, after) = self.items.split_at_mut(dest);
            if before[dest - 1].try_squash(&after[0]) {
                self.items.remove(dest);
            }
        }
    }

    /// Split runs so that one starts at `id`; returns its index
    fn boundary_at(&mut self, id: ItemId) -> Option<usize> {
        let idx = self.find(id)?;
        let offset = id.clock - self.items[idx].id.clock;
        if offset == 0 {
            return Some(idx);
        }
        let right = self.items[idx].split(offset);
        self.items.insert(idx + 1, right);
        Some(idx + 1)
    }

    /// Split runs so that one ends at `id`; returns its index
    fn boundary_after(&mut self, id: ItemId) -> Option<usize> {
        let idx = self.find(id)?;
        let end = id.clock - self.items[idx].id.clock + 1;
        if end < self.items[idx].len {
            let right = self.items[idx].split(end);
            self.items.insert(idx + 1, right);
        }
        Some(idx)
    }

    /// Split runs so that one starts at `id` and holds at most `max`
    /// characters; returns its index
    fn isolate(&mut self, id: ItemId, max: u64) -> Option<usize> {
        let idx = self.boundary_at(id)?;
        if self.items[idx].len > max {
            let rest = self.items[idx].split(max);
            self.items.insert(idx + 1, rest);
        }
        Some(idx)
    }

    /// Index of the run containing `id`
    fn find(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.contains(&id))
    }

    /// Number of visible characters before run `idx`
    fn visible_before(&self, idx: usize) -> usize {
        self.items[..idx].iter().map(Item::visible_len).sum()
    }

    /// Run and offset of the `pos`-th visible character (`None` past the end)
    fn locate_visible(&self, pos: usize) -> Option<(usize, u64)> {
        let mut seen = 0;
        for (idx, item) in self.items.iter().enumerate() {
            let len = item.visible_len();
            if pos < seen + len {
                return Some((idx, (pos - seen) as u64));
            }
            seen += len;
        }
        None
    }

    /// Ids of visible characters in `[index, index + len)`, in order
    fn visible_ranges(&self, index: usize, len: usize) -> Vec<IdRange> {
        let mut skip = index as u64;
        let mut want = len as u64;
        let mut pieces = Vec::new();
        for item in self.items.iter().filter(|item| !item.is_deleted()) {
            if want == 0 {
                break;
            }
            if skip >= item.len {
                skip -= item.len;
                continue;
            }
            let take = (item.len - skip).min(want);
            pieces.push(IdRange::new(item.id.client, item.id.clock + skip, take));
            skip = 0;
            want -= take;
        }
        coalesce_ranges(pieces)
    }
}
