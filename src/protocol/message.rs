//! Session messages
//!
//! Every frame exchanged through the relay is one [`Envelope`]: the
//! sender, an optional recipient and a [`SyncMessage`]. Frames addressed
//! to another client are ignored by everyone else.
//!
//! Handshake between two peers:
//!
//! ```text
//! A                                B
//! |-- Announce ------------------->|
//! |<-------------- Announce(reply) |
//! |<-- SyncStep1(sv_B) ------------|
//! |-- SyncStep1(sv_A) ------------>|
//! |-- SyncStep2(diff for sv_B) --->|
//! |<------ SyncStep2(diff for sv_A)|
//! |<==== Update / Awareness =====> |
//! ```

use super::codec::{self, decode_message, encode_message};
use super::wire::{
    envelope_wire::Body, AnnounceWire, AwarenessEntryWire, AwarenessWire, EnvelopeWire,
    GoodbyeWire,
};
use crate::awareness::{AwarenessUpdate, PresenceState};
use crate::crdt::Update;
use crate::error::{Result, SyncError};
use crate::sync::StateVector;
use crate::ClientId;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// Presence in the room; peers answer with `reply: true`
    Announce { reply: bool },
    /// Sender's state vector, asking for what it is missing
    SyncStep1(StateVector),
    /// Answer to a `SyncStep1`
    SyncStep2(Update),
    /// Incremental local edit
    Update(Update),
    Awareness(Vec<AwarenessUpdate>),
    /// Sender is leaving the room
    Goodbye,
}

impl SyncMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Announce { .. } => "announce",
            SyncMessage::SyncStep1(_) => "sync-step-1",
            SyncMessage::SyncStep2(_) => "sync-step-2",
            SyncMessage::Update(_) => "update",
            SyncMessage::Awareness(_) => "awareness",
            SyncMessage::Goodbye => "goodbye",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub from: ClientId,
    /// `None` addresses everyone in the room
    pub to: Option<ClientId>,
    pub message: SyncMessage,
}

impl Envelope {
    pub fn broadcast(from: ClientId, message: SyncMessage) -> Self {
        Self {
            from,
            to: None,
            message,
        }
    }

    pub fn directed(from: ClientId, to: ClientId, message: SyncMessage) -> Self {
        Self {
            from,
            to: Some(to),
            message,
        }
    }

    /// Whether `client` should process this frame
    pub fn is_for(&self, client: ClientId) -> bool {
        self.from != client && self.to.map_or(true, |to| to == client)
    }

    pub fn encode(&self) -> Result<Bytes> {
        let body = match &self.message {
            SyncMessage::Announce { reply } => Body::Announce(AnnounceWire { reply: *reply }),
            SyncMessage::SyncStep1(sv) => Body::SyncStep1(codec::state_vector_to_wire(sv)),
            SyncMessage::SyncStep2(update) => Body::SyncStep2(codec::encode(update)),
            SyncMessage::Update(update) => Body::Update(codec::encode(update)),
            SyncMessage::Awareness(updates) => Body::Awareness(AwarenessWire {
                entries: updates
                    .iter()
                    .map(awareness_to_wire)
                    .collect::<Result<Vec<_>>>()?,
            }),
            SyncMessage::Goodbye => Body::Goodbye(GoodbyeWire {}),
        };

        Ok(encode_message(&EnvelopeWire {
            from: self.from,
            to: self.to.unwrap_or(0),
            body: Some(body),
        }))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: EnvelopeWire = decode_message(bytes)?;
        if wire.from == 0 {
            return Err(SyncError::MalformedRecord("frame without sender".into()));
        }

        let message = match wire.body {
            None => return Err(SyncError::MalformedRecord("frame without body".into())),
            Some(Body::Announce(a)) => SyncMessage::Announce { reply: a.reply },
            Some(Body::SyncStep1(sv)) => SyncMessage::SyncStep1(codec::state_vector_from_wire(&sv)),
            Some(Body::SyncStep2(bytes)) => SyncMessage::SyncStep2(codec::decode(&bytes)?),
            Some(Body::Update(bytes)) => SyncMessage::Update(codec::decode(&bytes)?),
            Some(Body::Awareness(a)) => SyncMessage::Awareness(
                a.entries
                    .into_iter()
                    .map(awareness_from_wire)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(Body::Goodbye(_)) => SyncMessage::Goodbye,
        };

        Ok(Self {
            from: wire.from,
            to: (wire.to != 0).then_some(wire.to),
            message,
        })
    }
}

fn awareness_to_wire(update: &AwarenessUpdate) -> Result<AwarenessEntryWire> {
    Ok(AwarenessEntryWire {
        client: update.client,
        clock: update.clock,
        state_json: update.state.as_ref().map(serde_json::to_string).transpose()?,
    })
}

fn awareness_from_wire(entry: AwarenessEntryWire) -> Result<AwarenessUpdate> {
    let state = entry
        .state_json
        .map(|json| serde_json::from_str::<PresenceState>(&json))
        .transpose()
        .map_err(|e| SyncError::MalformedRecord(format!("awareness state: {}", e)))?;
    Ok(AwarenessUpdate {
        client: entry.client,
        clock: entry.clock,
        state,
    })
}
