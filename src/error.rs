//! Error types for the sync engine
//!
//! Every network or protocol failure is recoverable: the session logs it,
//! degrades or resyncs, and keeps the document editable. Only local
//! misuse (bad configuration, a closed session, an edit over the length
//! limit) is reported back to the caller.

use crate::ClientId;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Update record or session frame could not be decoded.
    /// The message is dropped; the session continues.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Buffered operations waited too long for their dependencies
    #[error("causal gap: {pending} operation(s) waiting for {waited_ms}ms")]
    CausalGapTimeout { pending: usize, waited_ms: u64 },

    /// Signaling relay could not be reached
    #[error("relay unavailable after {attempts} attempt(s): {reason}")]
    RelayUnavailable { attempts: u32, reason: String },

    /// A directly connected peer stopped responding
    #[error("lost link to peer {0:016x}")]
    PeerLinkLost(ClientId),

    /// Operation attempted on a session that already left its room
    #[error("session is closed")]
    SessionClosed,

    /// Edit would grow the document past the configured maximum
    #[error("document length {length} would exceed limit {limit}")]
    LengthLimit { length: usize, limit: usize },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the session can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SyncError::Config(_) | SyncError::SessionClosed)
    }
}

impl From<prost::DecodeError> for SyncError {
    fn from(err: prost::DecodeError) -> Self {
        SyncError::MalformedRecord(err.to_string())
    }
}

impl From<base64::DecodeError> for SyncError {
    fn from(err: base64::DecodeError) -> Self {
        SyncError::MalformedRecord(format!("invalid base64: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(SyncError::MalformedRecord("x".into()).is_recoverable());
        assert!(SyncError::PeerLinkLost(7).is_recoverable());
        assert!(SyncError::CausalGapTimeout {
            pending: 1,
            waited_ms: 10
        }
        .is_recoverable());
        assert!(!SyncError::SessionClosed.is_recoverable());
        assert!(!SyncError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = SyncError::PeerLinkLost(0xab);
        assert_eq!(err.to_string(), "lost link to peer 00000000000000ab");

        let err = SyncError::LengthLimit {
            length: 12,
            limit: 10,
        };
        assert_eq!(err.to_string(), "document length 12 would exceed limit 10");
    }
}
