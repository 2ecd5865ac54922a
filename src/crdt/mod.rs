//! Replicated document model
//!
//! A YATA-style sequence CRDT for rich text. Every character carries a
//! globally unique [`ItemId`] and remembers its neighbours at insertion
//! time, so replicas that integrate the same operations in any order end
//! up with the same document.
//!
//! # References
//!
//! - "Near Real-Time Peer-to-Peer Shared Editing on Extensible Data Types" (YATA)
//! - "A comprehensive study of CRDTs" by Marc Shapiro et al.

mod document;
mod id;
mod item;
mod op;

pub use document::{ApplyOutcome, Block, Document, Span, StickyIndex};
pub use id::{coalesce_ranges, IdRange, ItemId};
pub use item::{Attributes, Content, Item, Mark, Stamp};
pub use op::{LocalOp, Op, Update};
