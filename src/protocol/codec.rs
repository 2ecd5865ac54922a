//! Update record encoding
//!
//! Converts [`Update`]s and [`StateVector`]s to and from their protobuf
//! wire form. The encoding stays compact for the common case of one
//! author typing a run of characters:
//!
//! - client ids are stored once in a table and referenced by index
//! - each op's clock is a delta from the end of that client's previous op
//! - references to the op author's own earlier items are backward deltas
//!
//! Decoding validates everything the document relies on, so a record
//! that decodes is safe to hand to [`Document::apply_remote_update`].
//!
//! [`Document::apply_remote_update`]: crate::Document::apply_remote_update

use super::wire::{
    op_wire, ClockEntryWire, DeleteWire, FormatWire, InsertWire, ItemRefWire, OpWire, RangeWire,
    StateVectorWire, UpdateWire,
};
use crate::crdt::{IdRange, ItemId, Op, Update};
use crate::error::{Result, SyncError};
use crate::sync::StateVector;
use crate::ClientId;
use base64::Engine;
use bytes::Bytes;
use prost::Message;
use std::collections::HashMap;

/// Serialize any protocol message to bytes
pub fn encode_message<M: Message>(msg: &M) -> Bytes {
    Bytes::from(msg.encode_to_vec())
}

/// Deserialize a protocol message from bytes
pub fn decode_message<M: Message + Default>(bytes: &[u8]) -> Result<M> {
    Ok(M::decode(bytes)?)
}

/// Encode an update record
pub fn encode(update: &Update) -> Bytes {
    encode_message(&update_to_wire(update))
}

/// Decode an update record, rejecting structurally invalid input
pub fn decode(bytes: &[u8]) -> Result<Update> {
    let wire: UpdateWire = decode_message(bytes)?;
    update_from_wire(wire)
}

/// Encode an update as standard base64 text
pub fn encode_text(update: &Update) -> String {
    base64::engine::general_purpose::STANDARD.encode(encode(update))
}

/// Decode the base64 text form
pub fn decode_text(text: &str) -> Result<Update> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(text.trim())?;
    decode(&bytes)
}

pub fn state_vector_to_wire(sv: &StateVector) -> StateVectorWire {
    StateVectorWire {
        entries: sv
            .iter()
            .map(|(client, clock)| ClockEntryWire { client, clock })
            .collect(),
    }
}

pub fn state_vector_from_wire(wire: &StateVectorWire) -> StateVector {
    wire.entries
        .iter()
        .map(|entry| (entry.client, entry.clock))
        .collect()
}

pub fn encode_state_vector(sv: &StateVector) -> Bytes {
    encode_message(&state_vector_to_wire(sv))
}

pub fn decode_state_vector(bytes: &[u8]) -> Result<StateVector> {
    let wire: StateVectorWire = decode_message(bytes)?;
    Ok(state_vector_from_wire(&wire))
}

fn malformed(msg: impl Into<String>) -> SyncError {
    SyncError::MalformedRecord(msg.into())
}

/// Client ids in first-use order
#[derive(Default)]
struct ClientTable {
    clients: Vec<u64>,
    index: HashMap<ClientId, u32>,
}

impl ClientTable {
    fn index_of(&mut self, client: ClientId) -> u32 {
        if let Some(idx) = self.index.get(&client) {
            return *idx;
        }
        let idx = self.clients.len() as u32;
        self.clients.push(client);
        self.index.insert(client, idx);
        idx
    }
}

fn update_to_wire(update: &Update) -> UpdateWire {
    let mut table = ClientTable::default();
    let mut next_clock: HashMap<ClientId, u64> = HashMap::new();
    let mut ops = Vec::with_capacity(update.ops.len());

    for op in &update.ops {
        let id = op.id();
        let client_index = table.index_of(id.client);
        let expected = next_clock.get(&id.client).copied().unwrap_or(0);
        let clock_delta = (id.clock as i64).wrapping_sub(expected as i64);
        next_clock.insert(id.client, op.last_clock() + 1);

        let kind = match op {
            Op::Insert {
                origin,
                right_origin,
                content,
                attrs,
                ..
            } => op_wire::Kind::Insert(InsertWire {
                origin: origin.map(|r| ref_to_wire(&mut table, id, r)),
                right_origin: right_origin.map(|r| ref_to_wire(&mut table, id, r)),
                content: content.clone(),
                attrs: attrs.clone(),
            }),
            Op::Delete { targets, .. } => op_wire::Kind::Delete(DeleteWire {
                targets: targets
                    .iter()
                    .map(|r| range_to_wire(&mut table, id, r))
                    .collect(),
            }),
            Op::Format {
                lamport,
                targets,
                key,
                value,
                ..
            } => op_wire::Kind::Format(FormatWire {
                lamport: *lamport,
                targets: targets
                    .iter()
                    .map(|r| range_to_wire(&mut table, id, r))
                    .collect(),
                key: key.clone(),
                value: value.clone(),
            }),
        };

        ops.push(OpWire {
            client_index,
            clock_delta,
            kind: Some(kind),
        });
    }

    UpdateWire {
        clients: table.clients,
        ops,
    }
}

fn ref_to_wire(table: &mut ClientTable, owner: ItemId, r: ItemId) -> ItemRefWire {
    if r.client == owner.client && r.clock < owner.clock {
        ItemRefWire {
            client_index: None,
            clock: owner.clock - r.clock,
        }
    } else {
        ItemRefWire {
            client_index: Some(table.index_of(r.client)),
            clock: r.clock,
        }
    }
}

fn range_to_wire(table: &mut ClientTable, owner: ItemId, r: &IdRange) -> RangeWire {
    let start = ref_to_wire(table, owner, ItemId::new(r.client, r.clock));
    RangeWire {
        client_index: start.client_index,
        clock: start.clock,
        len: r.len,
    }
}

fn update_from_wire(wire: UpdateWire) -> Result<Update> {
    let UpdateWire { clients, ops } = wire;
    let mut next_clock: HashMap<ClientId, u64> = HashMap::new();
    let mut out = Vec::with_capacity(ops.len());

    for (n, op) in ops.into_iter().enumerate() {
        let client = lookup_client(&clients, op.client_index)?;
        let expected = next_clock.get(&client).copied().unwrap_or(0);
        let clock = i128::from(expected) + i128::from(op.clock_delta);
        if clock < 1 || clock > i128::from(u64::MAX) {
            return Err(malformed(format!("op {}: clock {} out of range", n, clock)));
        }
        let id = ItemId::new(client, clock as u64);

        let op = match op.kind {
            None => return Err(malformed(format!("op {}: missing operation kind", n))),
            Some(op_wire::Kind::Insert(insert)) => {
                if insert.content.is_empty() {
                    return Err(malformed(format!("op {}: empty insert", n)));
                }
                Op::Insert {
                    id,
                    origin: insert
                        .origin
                        .map(|r| ref_from_wire(&clients, id, &r))
                        .transpose()?,
                    right_origin: insert
                        .right_origin
                        .map(|r| ref_from_wire(&clients, id, &r))
                        .transpose()?,
                    content: insert.content,
                    attrs: insert.attrs,
                }
            }
            Some(op_wire::Kind::Delete(delete)) => Op::Delete {
                id,
                targets: ranges_from_wire(&clients, id, &delete.targets)?,
            },
            Some(op_wire::Kind::Format(format)) => {
                if format.key.is_empty() {
                    return Err(malformed(format!("op {}: empty format key", n)));
                }
                Op::Format {
                    id,
                    lamport: format.lamport,
                    targets: ranges_from_wire(&clients, id, &format.targets)?,
                    key: format.key,
                    value: format.value,
                }
            }
        };

        let next = id
            .clock
            .checked_add(op.len())
            .ok_or_else(|| malformed(format!("op {}: clock overflow", n)))?;
        next_clock.insert(client, next);
        out.push(op);
    }

    Ok(Update::new(out))
}

fn lookup_client(clients: &[u64], index: u32) -> Result<ClientId> {
    clients
        .get(index as usize)
        .copied()
        .ok_or_else(|| malformed(format!("client index {} out of range", index)))
}

fn ref_from_wire(clients: &[u64], owner: ItemId, r: &ItemRefWire) -> Result<ItemId> {
    match r.client_index {
        None => {
            if r.clock == 0 || r.clock >= owner.clock {
                return Err(malformed(format!(
                    "backward reference {} from {}",
                    r.clock, owner
                )));
            }
            Ok(ItemId::new(owner.client, owner.clock - r.clock))
        }
        Some(index) => {
            if r.clock == 0 {
                return Err(malformed("reference to clock 0"));
            }
            Ok(ItemId::new(lookup_client(clients, index)?, r.clock))
        }
    }
}

fn ranges_from_wire(clients: &[u64], owner: ItemId, ranges: &[RangeWire]) -> Result<Vec<IdRange>> {
    if ranges.is_empty() {
        return Err(malformed(format!("op {} has no targets", owner)));
    }
    ranges
        .iter()
        .map(|r| {
            if r.len == 0 {
                return Err(malformed("zero-length range"));
            }
            let start = ref_from_wire(
                clients,
                owner,
                &ItemRefWire {
                    client_index: r.client_index,
                    clock: r.clock,
                },
            )?;
            if start.clock.checked_add(r.len).is_none() {
                return Err(malformed("range overflows clock space"));
            }
            Ok(IdRange::new(start.client, start.clock, r.len))
        })
        .collect()
}
