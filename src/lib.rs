//! Cowrite Core - peer-to-peer sync engine for a collaborative editor
//!
//! This is the Rust core of Cowrite, compiled to both native and WASM.
//! It implements:
//! - A YATA-style sequence CRDT for rich text with formatting marks
//! - State vectors and minimal diffs for anti-entropy
//! - A compact Protocol Buffer encoding for update records
//! - A sans-IO peer session with presence (awareness)
//! - An editor adapter that keeps selections anchored across remote edits
//!
//! # Examples
//!
//! ```rust
//! use cowrite_core::{Document, LocalOp, StateVector};
//!
//! let mut alice = Document::new(1);
//! let mut bob = Document::new(2);
//!
//! let update = alice.apply_local_op(LocalOp::insert(0, "Hello"));
//! bob.apply_remote_update(&update);
//! assert_eq!(bob.text(), "Hello");
//!
//! // Bring a fresh replica up to date with a diff
//! let mut carol = Document::new(3);
//! let diff = alice.compute_diff(&StateVector::new());
//! carol.apply_remote_update(&diff);
//! assert_eq!(carol.text(), "Hello");
//! ```

pub mod assist;
pub mod awareness;
pub mod config;
pub mod crdt;
pub mod editor;
pub mod error;
pub mod protocol;
pub mod room;
pub mod session;
pub mod sync;

#[cfg(feature = "relay")]
pub mod relay;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports for convenience
pub use awareness::{Awareness, CursorRange, PresenceState};
pub use config::SessionConfig;
pub use crdt::{Document, ItemId, LocalOp, StickyIndex, Update};
pub use editor::{EditorAdapter, EditorConfig, RenderSurface};
pub use error::{Result, SyncError};
pub use room::RoomId;
pub use session::{Notification, PeerSession, SessionEvent, SessionState};
pub use sync::StateVector;

/// Client identifier type
///
/// Random, non-zero, and below 2^53.
pub type ClientId = u64;

/// Milliseconds on a caller-supplied monotonic clock
pub type Millis = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_import() {
        let doc = Document::new(1);
        assert!(doc.is_empty());
        assert!(doc.state_vector().is_empty());
    }
}
