//! Peer session: one room, one document, many peers
//!
//! The session is sans-IO. The transport pushes [`SessionEvent`]s in,
//! calls [`PeerSession::process`] with the current time, and publishes
//! whatever [`Outgoing`] frames come out. The same code therefore runs
//! behind the tokio relay driver, inside WASM, and in tests with an
//! in-memory relay.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting --first handshake--> Synced --all links lost--> Degraded
//!                                   ^                           |
//!                                   +-------handshake-----------+
//! any state --leave()--> Closed
//! ```

mod backoff;
mod event;
mod queue;

pub use backoff::Backoff;
pub use event::{Notification, Outgoing, SessionEvent, SessionState};
pub use queue::OfflineQueue;

use crate::awareness::{random_presence, Awareness, CursorRange, PresenceState, Throttle};
use crate::config::SessionConfig;
use crate::crdt::{Document, LocalOp, Update};
use crate::error::{Result, SyncError};
use crate::protocol::{Envelope, SyncMessage};
use crate::room::RoomId;
use crate::sync::StateVector;
use crate::{ClientId, Millis};
use bytes::Bytes;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Random client id, unique per session
///
/// Kept within 53 bits so it survives a round trip through JavaScript
/// numbers; zero is reserved for "everyone".
pub fn random_client_id() -> ClientId {
    loop {
        let (high, _) = Uuid::new_v4().as_u64_pair();
        let id = high & ((1 << 53) - 1);
        if id != 0 {
            return id;
        }
    }
}

/// Logical link to one remote peer, carried over the relay
#[derive(Debug, Clone)]
struct PeerLink {
    /// Latest state vector the peer reported
    remote_state: Option<StateVector>,
    /// Received the peer's answer to our state vector
    handshake_done: bool,
    last_seen: Millis,
}

pub struct PeerSession {
    room: RoomId,
    client: ClientId,
    config: SessionConfig,
    state: SessionState,
    doc: Document,
    awareness: Awareness,
    throttle: Throttle,
    links: BTreeMap<ClientId, PeerLink>,
    relay_connected: bool,
    relay_failures: u32,
    offline: OfflineQueue,
    events: VecDeque<SessionEvent>,
    outgoing: VecDeque<Outgoing>,
    notifications: VecDeque<Notification>,
    last_heartbeat: Option<Millis>,
    gap_since: Option<Millis>,
    now: Millis,
}

impl PeerSession {
    /// Join `room` with a random identity
    pub fn join(room: RoomId, config: SessionConfig) -> Result<Self> {
        Self::join_as(room, random_client_id(), random_presence(), config)
    }

    /// Join `room` with a chosen client id and presence
    pub fn join_as(
        room: RoomId,
        client: ClientId,
        presence: PresenceState,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        if client == 0 {
            return Err(SyncError::Config("client id 0 is reserved".into()));
        }

        let mut awareness = Awareness::new(client);
        awareness.set_local_state(presence, 0);
        info!(room = %room, client = format_args!("{:x}", client), "joining room");

        Ok(Self {
            room,
            client,
            throttle: Throttle::new(config.awareness_throttle_ms),
            offline: OfflineQueue::new(config.offline_queue_limit),
            config,
            state: SessionState::Connecting,
            doc: Document::new(client),
            awareness,
            links: BTreeMap::new(),
            relay_connected: false,
            relay_failures: 0,
            events: VecDeque::new(),
            outgoing: VecDeque::new(),
            notifications: VecDeque::new(),
            last_heartbeat: None,
            gap_since: None,
            now: 0,
        })
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn client_id(&self) -> ClientId {
        self.client
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn awareness(&self) -> &Awareness {
        &self.awareness
    }

    /// Peers with a live link, in id order
    pub fn peers(&self) -> Vec<ClientId> {
        self.links.keys().copied().collect()
    }

    /// Local updates not yet delivered to any peer
    pub fn queued_updates(&self) -> usize {
        self.offline.len()
    }

    pub fn is_relay_connected(&self) -> bool {
        self.relay_connected
    }

    /// Release the document after leaving
    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Queue an input for the next `process` call
    ///
    /// Events arriving after the session closed are discarded.
    pub fn enqueue(&mut self, event: SessionEvent) {
        if self.state == SessionState::Closed {
            return;
        }
        self.events.push_back(event);
    }

    /// Handle every queued event, then run timers
    pub fn process(&mut self, now: Millis) {
        self.now = self.now.max(now);
        while let Some(event) = self.events.pop_front() {
            if self.state == SessionState::Closed {
                self.events.clear();
                return;
            }
            self.handle_event(event);
        }
        if self.state != SessionState::Closed {
            self.on_tick();
        }
    }

    /// Apply local edits and broadcast them as one update
    pub fn apply_local(&mut self, ops: Vec<LocalOp>) -> Result<Update> {
        if self.state == SessionState::Closed {
            return Err(SyncError::SessionClosed);
        }
        let update = self.doc.apply_local_batch(ops);
        self.broadcast(update.clone());
        Ok(update)
    }

    /// Best-effort delivery of a local update to every peer
    ///
    /// Without a reachable peer the update is queued and replayed once the
    /// next handshake completes.
    pub fn broadcast(&mut self, update: Update) {
        if update.is_empty() || self.state == SessionState::Closed {
            return;
        }
        if self.relay_connected && !self.links.is_empty() {
            self.send(Envelope::broadcast(self.client, SyncMessage::Update(update)));
        } else if !self.offline.enqueue(update) {
            debug!("offline queue full; edits will be recovered by the next handshake");
        }
    }

    /// Move the local cursor; broadcast is throttled
    pub fn set_cursor(&mut self, cursor: Option<CursorRange>) {
        if self.awareness.set_cursor(cursor, self.now).is_some() {
            self.throttle.mark();
        }
    }

    /// Change the local display identity
    pub fn set_presence(&mut self, presence: PresenceState) {
        self.awareness.set_local_state(presence, self.now);
        self.throttle.mark();
    }

    /// Leave the room; calling it again does nothing
    pub fn leave(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if self.relay_connected {
            let leave = self.awareness.create_leave_update();
            self.send(Envelope::broadcast(
                self.client,
                SyncMessage::Awareness(vec![leave]),
            ));
            self.send(Envelope::broadcast(self.client, SyncMessage::Goodbye));
        }
        self.links.clear();
        self.events.clear();
        self.offline.clear();
        self.relay_connected = false;
        info!(room = %self.room, "left room");
        self.set_state(SessionState::Closed);
    }

    /// Frames waiting to be published
    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        self.outgoing.drain(..).collect()
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::RelayConnected => self.on_relay_connected(),
            SessionEvent::RelayLost { reason } => self.on_relay_lost(reason),
            SessionEvent::Frame(bytes) => self.on_frame(&bytes),
            SessionEvent::LocalEdit(ops) => {
                let update = self.doc.apply_local_batch(ops);
                self.broadcast(update);
            }
            SessionEvent::PresenceChanged(cursor) => self.set_cursor(cursor),
            SessionEvent::Tick => {}
        }
    }

    fn on_relay_connected(&mut self) {
        info!(room = %self.room, "relay connected");
        self.relay_connected = true;
        self.relay_failures = 0;
        self.send(Envelope::broadcast(
            self.client,
            SyncMessage::Announce { reply: false },
        ));
    }

    fn on_relay_lost(&mut self, reason: String) {
        warn!(room = %self.room, %reason, "relay lost");
        self.relay_connected = false;
        self.relay_failures = self.relay_failures.saturating_add(1);

        let peers: Vec<ClientId> = self.links.keys().copied().collect();
        for peer in peers {
            self.drop_link(peer);
        }
        if self.state == SessionState::Synced {
            self.set_state(SessionState::Degraded);
        }
        if self.relay_failures == self.config.max_relay_attempts {
            self.notify(Notification::Warning(SyncError::RelayUnavailable {
                attempts: self.relay_failures,
                reason,
            }));
        }
    }

    fn on_frame(&mut self, bytes: &[u8]) {
        let envelope = match Envelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
                self.notify(Notification::Warning(err));
                return;
            }
        };
        if !envelope.is_for(self.client) {
            return;
        }

        let from = envelope.from;
        debug!(
            from = format_args!("{:x}", from),
            kind = envelope.message.kind(),
            "frame"
        );

        match envelope.message {
            SyncMessage::Goodbye => {
                if self.drop_link(from) {
                    info!(peer = format_args!("{:x}", from), "peer left");
                    self.after_link_loss();
                }
            }
            SyncMessage::Announce { reply } => {
                let is_new = self.ensure_link(from);
                if !reply {
                    // A known peer announcing again has reconnected and
                    // needs a fresh handshake
                    if !is_new {
                        self.open_handshake(from);
                    }
                    self.send(Envelope::directed(
                        self.client,
                        from,
                        SyncMessage::Announce { reply: true },
                    ));
                }
            }
            SyncMessage::SyncStep1(remote) => {
                self.ensure_link(from);
                let diff = self.doc.compute_diff(&remote);
                if let Some(link) = self.links.get_mut(&from) {
                    link.remote_state = Some(remote);
                }
                self.send(Envelope::directed(
                    self.client,
                    from,
                    SyncMessage::SyncStep2(diff),
                ));
            }
            SyncMessage::SyncStep2(update) => {
                self.ensure_link(from);
                self.integrate(&update);
                if let Some(link) = self.links.get_mut(&from) {
                    link.handshake_done = true;
                }
                if self.state != SessionState::Synced {
                    self.set_state(SessionState::Synced);
                }
                self.replay_offline();
            }
            SyncMessage::Update(update) => {
                self.ensure_link(from);
                self.integrate(&update);
            }
            SyncMessage::Awareness(updates) => {
                self.ensure_link(from);
                for update in updates {
                    if let Some(change) = self.awareness.apply_update(update, self.now) {
                        self.notify(Notification::AwarenessChanged(change));
                    }
                }
            }
        }
    }

    /// Record traffic from `peer`, opening the handshake for new peers;
    /// returns whether the link is new
    fn ensure_link(&mut self, peer: ClientId) -> bool {
        let now = self.now;
        if let Some(link) = self.links.get_mut(&peer) {
            link.last_seen = now;
            self.awareness.touch(peer, now);
            return false;
        }

        info!(peer = format_args!("{:x}", peer), "peer joined");
        self.links.insert(
            peer,
            PeerLink {
                remote_state: None,
                handshake_done: false,
                last_seen: now,
            },
        );
        self.notify(Notification::PeerJoined(peer));
        self.open_handshake(peer);
        true
    }

    /// Send our state vector and presence to `peer`
    fn open_handshake(&mut self, peer: ClientId) {
        self.send(Envelope::directed(
            self.client,
            peer,
            SyncMessage::SyncStep1(self.doc.state_vector()),
        ));
        let snapshot = self.awareness.snapshot();
        if !snapshot.is_empty() {
            self.send(Envelope::directed(
                self.client,
                peer,
                SyncMessage::Awareness(snapshot),
            ));
        }
    }

    /// Broadcast edits made while no peer was reachable
    ///
    /// Runs when a handshake completes. Peers that already received the
    /// edits in a handshake diff skip them as already observed.
    fn replay_offline(&mut self) {
        if self.offline.is_empty() {
            return;
        }
        if self.offline.overflowed() {
            debug!("offline queue overflowed; older edits travel in handshake diffs only");
        }
        let update = self.offline.drain();
        debug!(ops = update.len(), "replaying offline edits");
        self.broadcast(update);
    }

    /// Remove a link and its presence; returns whether it existed
    fn drop_link(&mut self, peer: ClientId) -> bool {
        if self.links.remove(&peer).is_none() {
            return false;
        }
        if self.awareness.remove_client(peer) {
            self.notify(Notification::AwarenessChanged(
                crate::awareness::AwarenessChange::Removed(peer),
            ));
        }
        self.notify(Notification::PeerLeft(peer));
        true
    }

    fn after_link_loss(&mut self) {
        if self.links.is_empty() && self.state == SessionState::Synced {
            self.set_state(SessionState::Degraded);
        }
    }

    fn integrate(&mut self, update: &Update) {
        let outcome = self.doc.apply_remote_update(update);
        if outcome.changed {
            self.notify(Notification::DocumentChanged);
        }
    }

    fn on_tick(&mut self) {
        let now = self.now;

        if self.relay_connected && self.throttle.ready(now) {
            self.broadcast_local_presence();
        }

        let heartbeat_due = match self.last_heartbeat {
            None => {
                self.last_heartbeat = Some(now);
                false
            }
            Some(last) => now.saturating_sub(last) >= self.config.heartbeat_interval_ms,
        };
        if heartbeat_due {
            self.last_heartbeat = Some(now);
            self.heartbeat();
        }

        self.expire_peers();
        self.check_causal_gap();
    }

    fn broadcast_local_presence(&mut self) {
        let Some(state) = self.awareness.local_state().cloned() else {
            return;
        };
        let Some(entry) = self.awareness.get_state(self.client) else {
            return;
        };
        let update = crate::awareness::AwarenessUpdate {
            client: self.client,
            clock: entry.clock,
            state: Some(state),
        };
        self.send(Envelope::broadcast(
            self.client,
            SyncMessage::Awareness(vec![update]),
        ));
    }

    /// Presence renewal, anti-entropy state exchange and tombstone GC
    fn heartbeat(&mut self) {
        if !self.relay_connected {
            return;
        }
        if let Some(update) = self.awareness.renew(self.now) {
            self.send(Envelope::broadcast(
                self.client,
                SyncMessage::Awareness(vec![update]),
            ));
        }
        if !self.links.is_empty() {
            self.send(Envelope::broadcast(
                self.client,
                SyncMessage::SyncStep1(self.doc.state_vector()),
            ));
        }
        self.collect_garbage();
    }

    /// GC only with a complete picture of the room: synced, and every
    /// link has finished its handshake and reported a state vector
    fn collect_garbage(&mut self) {
        if !self.config.gc_enabled || self.state != SessionState::Synced {
            return;
        }
        let mut peers = Vec::with_capacity(self.links.len());
        for link in self.links.values() {
            match (&link.remote_state, link.handshake_done) {
                (Some(sv), true) => peers.push(sv.clone()),
                _ => return,
            }
        }
        let removed = self.doc.garbage_collect_tombstones(&peers);
        if removed > 0 {
            debug!(removed, "tombstones collected");
        }
    }

    fn expire_peers(&mut self) {
        let now = self.now;
        let timeout = self.config.peer_timeout_ms;
        let expired: Vec<ClientId> = self
            .links
            .iter()
            .filter(|(_, link)| now.saturating_sub(link.last_seen) > timeout)
            .map(|(peer, _)| *peer)
            .collect();

        for peer in expired {
            warn!(peer = format_args!("{:x}", peer), "peer timed out");
            self.drop_link(peer);
            self.notify(Notification::Warning(SyncError::PeerLinkLost(peer)));
        }
        self.after_link_loss();

        for client in self.awareness.remove_stale_clients(now, timeout) {
            self.notify(Notification::AwarenessChanged(
                crate::awareness::AwarenessChange::Removed(client),
            ));
        }
    }

    /// Buffered operations waiting too long: ask every peer again
    fn check_causal_gap(&mut self) {
        let pending = self.doc.pending_len();
        if pending == 0 {
            self.gap_since = None;
            return;
        }
        let since = *self.gap_since.get_or_insert(self.now);
        let waited = self.now.saturating_sub(since);
        if waited < self.config.causal_gap_timeout_ms {
            return;
        }

        warn!(pending, waited_ms = waited, "causal gap; requesting resync");
        self.notify(Notification::Warning(SyncError::CausalGapTimeout {
            pending,
            waited_ms: waited,
        }));
        self.gap_since = Some(self.now);
        if self.relay_connected && !self.links.is_empty() {
            self.send(Envelope::broadcast(
                self.client,
                SyncMessage::SyncStep1(self.doc.state_vector()),
            ));
        }
    }

    fn send(&mut self, envelope: Envelope) {
        if !self.relay_connected {
            return;
        }
        match envelope.encode() {
            Ok(frame) => self.outgoing.push_back(Outgoing {
                to: envelope.to,
                frame,
            }),
            Err(err) => warn!(error = %err, kind = envelope.message.kind(), "failed to encode frame"),
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push_back(notification);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        info!(room = %self.room, from = %self.state, to = %state, "session state");
        self.state = state;
        self.notify(Notification::StateChanged(state));
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("room", &self.room)
            .field("client", &format_args!("{:x}", self.client))
            .field("state", &self.state)
            .field("peers", &self.links.len())
            .finish()
    }
}

/// Frame helper for transports that carry raw bytes
impl From<Bytes> for SessionEvent {
    fn from(frame: Bytes) -> Self {
        SessionEvent::Frame(frame)
    }
}
