use crate::crdt::Update;
use std::collections::VecDeque;

/// Offline queue for edits made while no peer is reachable.
///
/// The queue is drained and replayed as one update once a handshake
/// completes. A full queue loses nothing: the document itself holds every
/// edit, and the state-vector handshake sends whatever a peer is missing.
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    queue: VecDeque<Update>,
    max_size: usize,
    overflowed: bool,
}

impl OfflineQueue {
    /// Create a new offline queue with max capacity.
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
            overflowed: false,
        }
    }

    /// Queue an update; returns false when the queue is full.
    pub fn enqueue(&mut self, update: Update) -> bool {
        if self.queue.len() >= self.max_size {
            self.overflowed = true;
            return false;
        }
        self.queue.push_back(update);
        true
    }

    /// Drain every queued update as one merged update.
    pub fn drain(&mut self) -> Update {
        self.overflowed = false;
        Update::merge(self.queue.drain(..))
    }

    /// Number of queued updates.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether an enqueue was refused since the last drain or clear.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.overflowed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::{Document, LocalOp};

    #[test]
    fn test_enqueue_and_drain() {
        let mut doc = Document::new(1);
        let mut queue = OfflineQueue::new(10);
        queue.enqueue(doc.apply_local_op(LocalOp::insert(0, "ab")));
        queue.enqueue(doc.apply_local_op(LocalOp::delete(0, 1)));
        assert_eq!(queue.len(), 2);

        let merged = queue.drain();
        assert_eq!(merged.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bounded() {
        let mut queue = OfflineQueue::new(1);
        assert!(queue.enqueue(Update::default()));
        assert!(!queue.enqueue(Update::default()));
        assert!(queue.overflowed());
        queue.clear();
        assert!(!queue.overflowed());
    }
}
