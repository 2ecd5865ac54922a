//! Protocol Buffer message definitions
//!
//! Hand-maintained prost messages; the field numbers are the wire contract
//! and must never be reused.
//!
//! ```text
//! message UpdateWire {
//!   repeated uint64 clients = 1;      // client table, referenced by index
//!   repeated OpWire ops = 2;
//! }
//! message OpWire {
//!   uint32 client_index = 1;
//!   sint64 clock_delta  = 2;          // relative to the client's previous op end + 1
//!   oneof kind { InsertWire insert = 3; DeleteWire delete = 4; FormatWire format = 5; }
//! }
//! message ItemRefWire {
//!   optional uint32 client_index = 1; // absent: same client, clock is a backward delta
//!   uint64 clock = 2;
//! }
//! ```

use std::collections::BTreeMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateWire {
    #[prost(uint64, repeated, tag = "1")]
    pub clients: Vec<u64>,
    #[prost(message, repeated, tag = "2")]
    pub ops: Vec<OpWire>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpWire {
    #[prost(uint32, tag = "1")]
    pub client_index: u32,
    #[prost(sint64, tag = "2")]
    pub clock_delta: i64,
    #[prost(oneof = "op_wire::Kind", tags = "3, 4, 5")]
    pub kind: Option<op_wire::Kind>,
}

pub mod op_wire {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "3")]
        Insert(super::InsertWire),
        #[prost(message, tag = "4")]
        Delete(super::DeleteWire),
        #[prost(message, tag = "5")]
        Format(super::FormatWire),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InsertWire {
    #[prost(message, optional, tag = "1")]
    pub origin: Option<ItemRefWire>,
    #[prost(message, optional, tag = "2")]
    pub right_origin: Option<ItemRefWire>,
    #[prost(string, tag = "3")]
    pub content: String,
    #[prost(btree_map = "string, string", tag = "4")]
    pub attrs: BTreeMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteWire {
    #[prost(message, repeated, tag = "1")]
    pub targets: Vec<RangeWire>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FormatWire {
    #[prost(uint64, tag = "1")]
    pub lamport: u64,
    #[prost(message, repeated, tag = "2")]
    pub targets: Vec<RangeWire>,
    #[prost(string, tag = "3")]
    pub key: String,
    /// Absent clears the attribute
    #[prost(string, optional, tag = "4")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ItemRefWire {
    #[prost(uint32, optional, tag = "1")]
    pub client_index: Option<u32>,
    #[prost(uint64, tag = "2")]
    pub clock: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RangeWire {
    #[prost(uint32, optional, tag = "1")]
    pub client_index: Option<u32>,
    #[prost(uint64, tag = "2")]
    pub clock: u64,
    #[prost(uint64, tag = "3")]
    pub len: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StateVectorWire {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<ClockEntryWire>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClockEntryWire {
    #[prost(uint64, tag = "1")]
    pub client: u64,
    #[prost(uint64, tag = "2")]
    pub clock: u64,
}

/// Session frame: sender, optional recipient, and one message
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnvelopeWire {
    #[prost(uint64, tag = "1")]
    pub from: u64,
    /// Zero addresses every peer in the room
    #[prost(uint64, tag = "2")]
    pub to: u64,
    #[prost(oneof = "envelope_wire::Body", tags = "3, 4, 5, 6, 7, 8")]
    pub body: Option<envelope_wire::Body>,
}

pub mod envelope_wire {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "3")]
        Announce(super::AnnounceWire),
        #[prost(message, tag = "4")]
        SyncStep1(super::StateVectorWire),
        #[prost(bytes = "bytes", tag = "5")]
        SyncStep2(::prost::bytes::Bytes),
        #[prost(bytes = "bytes", tag = "6")]
        Update(::prost::bytes::Bytes),
        #[prost(message, tag = "7")]
        Awareness(super::AwarenessWire),
        #[prost(message, tag = "8")]
        Goodbye(super::GoodbyeWire),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AnnounceWire {
    /// Set when answering another peer's announce
    #[prost(bool, tag = "1")]
    pub reply: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GoodbyeWire {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AwarenessWire {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<AwarenessEntryWire>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AwarenessEntryWire {
    #[prost(uint64, tag = "1")]
    pub client: u64,
    #[prost(uint64, tag = "2")]
    pub clock: u64,
    /// JSON presence state; absent means the client left
    #[prost(string, optional, tag = "3")]
    pub state_json: Option<String>,
}
