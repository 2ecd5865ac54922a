//! JavaScript bindings for the document, awareness and session types

use crate::awareness::{Awareness, AwarenessUpdate, CursorRange, PresenceState};
use crate::config::SessionConfig;
use crate::crdt::{Document, LocalOp};
use crate::protocol::codec;
use crate::room::RoomId;
use crate::session::{Notification, PeerSession, SessionEvent};
use crate::{ClientId, Millis};
use bytes::Bytes;
use wasm_bindgen::prelude::*;

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(js_err)
}

fn now() -> Millis {
    js_sys::Date::now() as Millis
}

/// JavaScript-friendly wrapper for Document
#[wasm_bindgen]
pub struct WasmDocument {
    inner: Document,
}

#[wasm_bindgen]
impl WasmDocument {
    /// Create an empty document for `client_id` (must be non-zero)
    #[wasm_bindgen(constructor)]
    pub fn new(client_id: u64) -> Result<WasmDocument, JsValue> {
        if client_id == 0 {
            return Err(JsValue::from_str("client id 0 is reserved"));
        }
        Ok(Self {
            inner: Document::new(client_id),
        })
    }

    #[wasm_bindgen(js_name = getClientId)]
    pub fn get_client_id(&self) -> u64 {
        self.inner.client_id()
    }

    /// Insert text; returns the encoded update
    #[wasm_bindgen(js_name = insert)]
    pub fn insert(&mut self, index: usize, text: String) -> Vec<u8> {
        let update = self.inner.apply_local_op(LocalOp::insert(index, text));
        codec::encode(&update).to_vec()
    }

    /// Delete a range; returns the encoded update
    #[wasm_bindgen(js_name = delete)]
    pub fn delete(&mut self, index: usize, len: usize) -> Vec<u8> {
        let update = self.inner.apply_local_op(LocalOp::delete(index, len));
        codec::encode(&update).to_vec()
    }

    /// Set or clear (`value` undefined) an attribute over a range
    #[wasm_bindgen(js_name = format)]
    pub fn format(&mut self, index: usize, len: usize, key: String, value: Option<String>) -> Vec<u8> {
        let update = self
            .inner
            .apply_local_op(LocalOp::format(index, len, key, value));
        codec::encode(&update).to_vec()
    }

    /// Apply several edits (JSON array of local ops) as one update
    #[wasm_bindgen(js_name = applyLocalBatch)]
    pub fn apply_local_batch(&mut self, ops_json: String) -> Result<Vec<u8>, JsValue> {
        let ops: Vec<LocalOp> = serde_json::from_str(&ops_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid JSON: {}", e)))?;
        let update = self.inner.apply_local_batch(ops);
        Ok(codec::encode(&update).to_vec())
    }

    /// Apply a binary update; returns whether the visible document changed
    #[wasm_bindgen(js_name = applyUpdate)]
    pub fn apply_update(&mut self, update: &[u8]) -> Result<bool, JsValue> {
        let update = codec::decode(update).map_err(js_err)?;
        Ok(self.inner.apply_remote_update(&update).changed)
    }

    /// Apply a base64 text update
    #[wasm_bindgen(js_name = applyUpdateText)]
    pub fn apply_update_text(&mut self, update: String) -> Result<bool, JsValue> {
        let update = codec::decode_text(&update).map_err(js_err)?;
        Ok(self.inner.apply_remote_update(&update).changed)
    }

    #[wasm_bindgen(js_name = encodeStateVector)]
    pub fn encode_state_vector(&self) -> Vec<u8> {
        codec::encode_state_vector(&self.inner.state_vector()).to_vec()
    }

    /// Operations the holder of `state_vector` is missing
    #[wasm_bindgen(js_name = computeDiff)]
    pub fn compute_diff(&self, state_vector: &[u8]) -> Result<Vec<u8>, JsValue> {
        let remote = codec::decode_state_vector(state_vector).map_err(js_err)?;
        Ok(codec::encode(&self.inner.compute_diff(&remote)).to_vec())
    }

    #[wasm_bindgen(js_name = encodeStateAsUpdate)]
    pub fn encode_state_as_update(&self) -> Vec<u8> {
        codec::encode(&self.inner.encode_state_as_update()).to_vec()
    }

    #[wasm_bindgen(js_name = getText)]
    pub fn get_text(&self) -> String {
        self.inner.text()
    }

    #[wasm_bindgen(js_name = length)]
    pub fn length(&self) -> usize {
        self.inner.len()
    }

    /// Paragraphs with formatted spans (JSON)
    #[wasm_bindgen(js_name = getBlocks)]
    pub fn get_blocks(&self) -> Result<String, JsValue> {
        to_json(&self.inner.blocks())
    }

    /// Anchor a position (JSON sticky index)
    #[wasm_bindgen(js_name = stickyIndex)]
    pub fn sticky_index(&self, pos: usize) -> Result<String, JsValue> {
        to_json(&self.inner.sticky_index(pos))
    }

    #[wasm_bindgen(js_name = resolveStickyIndex)]
    pub fn resolve_sticky_index(&self, sticky_json: String) -> Result<usize, JsValue> {
        let sticky = serde_json::from_str(&sticky_json).map_err(js_err)?;
        Ok(self.inner.resolve_sticky(&sticky))
    }

    #[wasm_bindgen(js_name = pendingCount)]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_len()
    }
}

/// JavaScript-friendly wrapper for Awareness
#[wasm_bindgen]
pub struct WasmAwareness {
    inner: Awareness,
}

#[wasm_bindgen]
impl WasmAwareness {
    #[wasm_bindgen(constructor)]
    pub fn new(client_id: u64) -> Self {
        Self {
            inner: Awareness::new(client_id),
        }
    }

    #[wasm_bindgen(js_name = getClientId)]
    pub fn get_client_id(&self) -> u64 {
        self.inner.client_id()
    }

    /// Set local presence (JSON); returns the update to broadcast (JSON)
    #[wasm_bindgen(js_name = setLocalState)]
    pub fn set_local_state(&mut self, state_json: String) -> Result<String, JsValue> {
        let state: PresenceState = serde_json::from_str(&state_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid JSON: {}", e)))?;
        let update = self.inner.set_local_state(state, now());
        to_json(&update)
    }

    /// Apply a remote update (JSON); returns whether anything changed
    #[wasm_bindgen(js_name = applyUpdate)]
    pub fn apply_update(&mut self, update_json: String) -> Result<bool, JsValue> {
        let update: AwarenessUpdate = serde_json::from_str(&update_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid JSON: {}", e)))?;
        Ok(self.inner.apply_update(update, now()).is_some())
    }

    /// All presence states as a JSON object keyed by client id
    #[wasm_bindgen(js_name = getStates)]
    pub fn get_states(&self) -> Result<String, JsValue> {
        let states: std::collections::BTreeMap<String, &PresenceState> = self
            .inner
            .states()
            .iter()
            .map(|(client, presence)| (client.to_string(), &presence.state))
            .collect();
        to_json(&states)
    }

    #[wasm_bindgen(js_name = getLocalState)]
    pub fn get_local_state(&self) -> Result<Option<String>, JsValue> {
        self.inner.local_state().map(to_json).transpose()
    }

    /// Remove silent clients; returns their ids (JSON array)
    #[wasm_bindgen(js_name = removeStaleClients)]
    pub fn remove_stale_clients(&mut self, timeout_ms: u64) -> Result<String, JsValue> {
        let removed = self.inner.remove_stale_clients(now(), timeout_ms);
        to_json(&removed)
    }

    #[wasm_bindgen(js_name = createLeaveUpdate)]
    pub fn create_leave_update(&mut self) -> Result<String, JsValue> {
        to_json(&self.inner.create_leave_update())
    }

    #[wasm_bindgen(js_name = clientCount)]
    pub fn client_count(&self) -> usize {
        self.inner.client_count()
    }

    #[wasm_bindgen(js_name = otherClientCount)]
    pub fn other_client_count(&self) -> usize {
        self.inner.other_client_count()
    }
}

/// Peer session driven from JavaScript
///
/// The page owns the signaling socket: it forwards received frames with
/// `receive`, calls `process` on a timer, and publishes whatever
/// `takeOutgoing` returns on the room topic.
#[wasm_bindgen]
pub struct WasmSession {
    inner: PeerSession,
}

#[wasm_bindgen]
impl WasmSession {
    /// Join `room`; `config_json` may be empty for defaults
    #[wasm_bindgen(constructor)]
    pub fn new(room: String, config_json: Option<String>) -> Result<WasmSession, JsValue> {
        let room = RoomId::parse(room).map_err(js_err)?;
        let config = match config_json.filter(|c| !c.trim().is_empty()) {
            Some(json) => SessionConfig::from_json(&json).map_err(js_err)?,
            None => SessionConfig::default(),
        };
        let inner = PeerSession::join(room, config).map_err(js_err)?;
        crate::console_log!("joined {} as {:x}", inner.room(), inner.client_id());
        Ok(Self { inner })
    }

    #[wasm_bindgen(js_name = getClientId)]
    pub fn get_client_id(&self) -> ClientId {
        self.inner.client_id()
    }

    #[wasm_bindgen(js_name = getState)]
    pub fn get_state(&self) -> String {
        self.inner.state().to_string()
    }

    #[wasm_bindgen(js_name = getText)]
    pub fn get_text(&self) -> String {
        self.inner.document().text()
    }

    #[wasm_bindgen(js_name = getBlocks)]
    pub fn get_blocks(&self) -> Result<String, JsValue> {
        to_json(&self.inner.document().blocks())
    }

    #[wasm_bindgen(js_name = relayConnected)]
    pub fn relay_connected(&mut self) {
        self.inner.enqueue(SessionEvent::RelayConnected);
    }

    #[wasm_bindgen(js_name = relayLost)]
    pub fn relay_lost(&mut self, reason: String) {
        self.inner.enqueue(SessionEvent::RelayLost { reason });
    }

    /// Frame received on the room topic
    #[wasm_bindgen(js_name = receive)]
    pub fn receive(&mut self, frame: Vec<u8>) {
        self.inner.enqueue(SessionEvent::Frame(Bytes::from(frame)));
    }

    /// Local edits (JSON array of ops)
    #[wasm_bindgen(js_name = applyLocal)]
    pub fn apply_local(&mut self, ops_json: String) -> Result<(), JsValue> {
        let ops: Vec<LocalOp> = serde_json::from_str(&ops_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid JSON: {}", e)))?;
        self.inner.apply_local(ops).map_err(js_err)?;
        Ok(())
    }

    /// Local selection as character positions; `undefined` clears it
    #[wasm_bindgen(js_name = setCursor)]
    pub fn set_cursor(&mut self, anchor: Option<usize>, head: Option<usize>) {
        let cursor = match (anchor, head) {
            (Some(anchor), Some(head)) => {
                let doc = self.inner.document();
                Some(CursorRange {
                    anchor: doc.sticky_index(anchor),
                    head: doc.sticky_index(head),
                })
            }
            _ => None,
        };
        self.inner.set_cursor(cursor);
    }

    #[wasm_bindgen(js_name = process)]
    pub fn process(&mut self) {
        self.inner.process(now());
    }

    /// Frames to publish, each as a byte array
    #[wasm_bindgen(js_name = takeOutgoing)]
    pub fn take_outgoing(&mut self) -> js_sys::Array {
        self.inner
            .take_outgoing()
            .into_iter()
            .map(|out| JsValue::from(js_sys::Uint8Array::from(out.frame.as_ref())))
            .collect()
    }

    /// Notifications since the last call, as short strings
    /// (`document`, `state:synced`, `joined:<id>`, `left:<id>`, `awareness`, `warning:<text>`)
    #[wasm_bindgen(js_name = takeNotifications)]
    pub fn take_notifications(&mut self) -> Vec<String> {
        self.inner
            .take_notifications()
            .into_iter()
            .map(|n| match n {
                Notification::StateChanged(state) => format!("state:{}", state),
                Notification::PeerJoined(peer) => format!("joined:{}", peer),
                Notification::PeerLeft(peer) => format!("left:{}", peer),
                Notification::DocumentChanged => "document".to_string(),
                Notification::AwarenessChanged(_) => "awareness".to_string(),
                Notification::Warning(err) => format!("warning:{}", err),
            })
            .collect()
    }

    #[wasm_bindgen(js_name = leave)]
    pub fn leave(&mut self) {
        self.inner.leave();
    }
}
