//! Session inputs and outputs

use crate::awareness::{AwarenessChange, CursorRange};
use crate::crdt::LocalOp;
use crate::error::SyncError;
use crate::ClientId;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Input to a [`PeerSession`](super::PeerSession), drained by `process`
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The relay transport is subscribed to the room topic
    RelayConnected,
    /// The relay transport dropped or failed to connect
    RelayLost { reason: String },
    /// A frame published to the room by some peer
    Frame(Bytes),
    /// Edits from the local editor, applied as one update
    LocalEdit(Vec<LocalOp>),
    /// Local cursor or selection moved
    PresenceChanged(Option<CursorRange>),
    /// Periodic wakeup with no other input
    Tick,
}

/// Connection lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Joining the relay; no peer handshake yet
    Connecting,
    /// At least one peer handshake completed
    Synced,
    /// Every peer link was lost; editing continues locally
    Degraded,
    /// Left the room
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Synced => "synced",
            SessionState::Degraded => "degraded",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Something the application should react to
#[derive(Debug)]
pub enum Notification {
    StateChanged(SessionState),
    PeerJoined(ClientId),
    PeerLeft(ClientId),
    /// Remote operations changed the visible document; re-render
    DocumentChanged,
    AwarenessChanged(AwarenessChange),
    /// Recoverable problem worth surfacing; the session keeps running
    Warning(SyncError),
}

/// Frame to publish on the room topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Intended recipient; `None` for everyone
    pub to: Option<ClientId>,
    pub frame: Bytes,
}
