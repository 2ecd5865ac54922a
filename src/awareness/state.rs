/// Awareness state management
///
/// Tracks the presence of every client in the room: who is connected,
/// their display identity and where their cursor is. Entries are replaced
/// last-write-wins by the sender's clock and expire when a client stops
/// renewing them.
use super::clock::IncreasingClock;
use crate::crdt::StickyIndex;
use crate::{ClientId, Millis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Selection expressed as two anchored positions
///
/// `anchor == head` is a collapsed caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRange {
    pub anchor: StickyIndex,
    pub head: StickyIndex,
}

/// What a client publishes about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceState {
    /// Display name
    pub name: String,
    /// CSS hex color, e.g. `#1a2b3c`
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorRange>,
}

/// Presence entry for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPresence {
    pub client: ClientId,
    pub state: PresenceState,
    /// Sender clock of the stored state
    pub clock: u64,
    /// Local time the entry was last refreshed
    pub last_seen: Millis,
}

/// Update message for awareness state changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwarenessUpdate {
    pub client: ClientId,
    pub clock: u64,
    /// None = client left
    pub state: Option<PresenceState>,
}

/// Effect of applying a remote awareness update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwarenessChange {
    Added(ClientId),
    Updated(ClientId),
    Removed(ClientId),
}

/// Awareness manager tracking all client states
#[derive(Debug, Clone)]
pub struct Awareness {
    client: ClientId,
    states: HashMap<ClientId, PeerPresence>,
    clock: IncreasingClock,
}

impl Awareness {
    pub fn new(client: ClientId) -> Self {
        Self {
            client,
            states: HashMap::new(),
            clock: IncreasingClock::new(),
        }
    }

    /// Local client id
    pub fn client_id(&self) -> ClientId {
        self.client
    }

    /// All current client states, local included
    pub fn states(&self) -> &HashMap<ClientId, PeerPresence> {
        &self.states
    }

    pub fn get_state(&self, client: ClientId) -> Option<&PeerPresence> {
        self.states.get(&client)
    }

    pub fn local_state(&self) -> Option<&PresenceState> {
        self.states.get(&self.client).map(|p| &p.state)
    }

    /// Replace the local state; returns the update to broadcast
    pub fn set_local_state(&mut self, state: PresenceState, now: Millis) -> AwarenessUpdate {
        let clock = self.clock.tick();
        self.states.insert(
            self.client,
            PeerPresence {
                client: self.client,
                state: state.clone(),
                clock,
                last_seen: now,
            },
        );
        AwarenessUpdate {
            client: self.client,
            clock,
            state: Some(state),
        }
    }

    /// Move the local cursor; `None` when no local state has been set
    pub fn set_cursor(&mut self, cursor: Option<CursorRange>, now: Millis) -> Option<AwarenessUpdate> {
        let mut state = self.local_state()?.clone();
        state.cursor = cursor;
        Some(self.set_local_state(state, now))
    }

    /// Re-publish the local state with a fresh clock (heartbeat)
    pub fn renew(&mut self, now: Millis) -> Option<AwarenessUpdate> {
        let state = self.local_state()?.clone();
        Some(self.set_local_state(state, now))
    }

    /// Apply a remote awareness update
    ///
    /// Updates about the local client are ignored; echoes of our own
    /// state must never override it.
    pub fn apply_update(&mut self, update: AwarenessUpdate, now: Millis) -> Option<AwarenessChange> {
        if update.client == self.client {
            return None;
        }
        self.clock.witness(update.clock);

        match update.state {
            Some(state) => match self.states.get_mut(&update.client) {
                Some(existing) if update.clock <= existing.clock => None,
                Some(existing) => {
                    existing.state = state;
                    existing.clock = update.clock;
                    existing.last_seen = now;
                    Some(AwarenessChange::Updated(update.client))
                }
                None => {
                    self.states.insert(
                        update.client,
                        PeerPresence {
                            client: update.client,
                            state,
                            clock: update.clock,
                            last_seen: now,
                        },
                    );
                    Some(AwarenessChange::Added(update.client))
                }
            },
            // Client left gracefully
            None => self
                .states
                .remove(&update.client)
                .map(|_| AwarenessChange::Removed(update.client)),
        }
    }

    /// Keep a remote entry alive without changing it
    pub fn touch(&mut self, client: ClientId, now: Millis) {
        if let Some(presence) = self.states.get_mut(&client) {
            presence.last_seen = now;
        }
    }

    /// Drop a remote client's entry; returns whether it existed
    pub fn remove_client(&mut self, client: ClientId) -> bool {
        client != self.client && self.states.remove(&client).is_some()
    }

    /// Remove remote clients not refreshed within `timeout`
    /// Returns list of removed client ids
    pub fn remove_stale_clients(&mut self, now: Millis, timeout: Millis) -> Vec<ClientId> {
        let local = self.client;
        let mut removed = Vec::new();
        self.states.retain(|client, presence| {
            if *client != local && now.saturating_sub(presence.last_seen) > timeout {
                removed.push(*client);
                return false;
            }
            true
        });
        removed.sort_unstable();
        removed
    }

    /// Create update to signal local client leaving
    pub fn create_leave_update(&mut self) -> AwarenessUpdate {
        self.states.remove(&self.client);
        AwarenessUpdate {
            client: self.client,
            clock: self.clock.tick(),
            state: None,
        }
    }

    /// Every known state as updates, for a newly connected peer
    pub fn snapshot(&self) -> Vec<AwarenessUpdate> {
        let mut updates: Vec<AwarenessUpdate> = self
            .states
            .values()
            .map(|p| AwarenessUpdate {
                client: p.client,
                clock: p.clock,
                state: Some(p.state.clone()),
            })
            .collect();
        updates.sort_by_key(|u| u.client);
        updates
    }

    /// Number of online clients (including self)
    pub fn client_count(&self) -> usize {
        self.states.len()
    }

    /// Number of online clients excluding self
    pub fn other_client_count(&self) -> usize {
        self.states
            .len()
            .saturating_sub(usize::from(self.states.contains_key(&self.client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(name: &str) -> PresenceState {
        PresenceState {
            name: name.to_string(),
            color: "#ff0000".to_string(),
            cursor: None,
        }
    }

    #[test]
    fn test_set_local_state() {
        let mut awareness = Awareness::new(1);
        let update = awareness.set_local_state(presence("Otter-7"), 0);

        assert_eq!(update.client, 1);
        assert_eq!(update.state, Some(presence("Otter-7")));
        assert_eq!(update.clock, 1);
        assert_eq!(awareness.client_count(), 1);
    }

    #[test]
    fn test_apply_remote_update() {
        let mut awareness = Awareness::new(1);
        let change = awareness.apply_update(
            AwarenessUpdate {
                client: 2,
                clock: 5,
                state: Some(presence("Bob")),
            },
            100,
        );

        assert_eq!(change, Some(AwarenessChange::Added(2)));
        assert_eq!(awareness.get_state(2).map(|p| p.last_seen), Some(100));
    }

    #[test]
    fn test_stale_clock_is_ignored() {
        let mut awareness = Awareness::new(1);
        let newer = AwarenessUpdate {
            client: 2,
            clock: 5,
            state: Some(presence("new")),
        };
        let older = AwarenessUpdate {
            client: 2,
            clock: 4,
            state: Some(presence("old")),
        };
        awareness.apply_update(newer, 0);
        assert_eq!(awareness.apply_update(older, 0), None);
        assert_eq!(awareness.get_state(2).map(|p| p.state.name.as_str()), Some("new"));
    }

    #[test]
    fn test_clock_monotonicity() {
        let mut awareness = Awareness::new(1);
        awareness.apply_update(
            AwarenessUpdate {
                client: 2,
                clock: 100,
                state: Some(presence("Bob")),
            },
            0,
        );

        let local = awareness.set_local_state(presence("Ann"), 0);
        assert!(local.clock > 100);
    }

    #[test]
    fn test_own_echo_is_ignored() {
        let mut awareness = Awareness::new(1);
        awareness.set_local_state(presence("Ann"), 0);
        let echo = AwarenessUpdate {
            client: 1,
            clock: 50,
            state: None,
        };
        assert_eq!(awareness.apply_update(echo, 0), None);
        assert!(awareness.local_state().is_some());
    }

    #[test]
    fn test_client_leaving() {
        let mut awareness = Awareness::new(1);
        awareness.apply_update(
            AwarenessUpdate {
                client: 2,
                clock: 1,
                state: Some(presence("Bob")),
            },
            0,
        );
        let change = awareness.apply_update(
            AwarenessUpdate {
                client: 2,
                clock: 2,
                state: None,
            },
            0,
        );
        assert_eq!(change, Some(AwarenessChange::Removed(2)));
        assert_eq!(awareness.client_count(), 0);
    }

    #[test]
    fn test_remove_stale_clients() {
        let mut awareness = Awareness::new(1);
        awareness.set_local_state(presence("Ann"), 0);
        for client in [2, 3] {
            awareness.apply_update(
                AwarenessUpdate {
                    client,
                    clock: 1,
                    state: Some(presence("peer")),
                },
                0,
            );
        }
        awareness.touch(3, 20_000);

        let removed = awareness.remove_stale_clients(31_000, 30_000);
        assert_eq!(removed, vec![2]);
        // The local entry never expires
        assert!(awareness.local_state().is_some());
        assert_eq!(awareness.other_client_count(), 1);
    }

    #[test]
    fn test_cursor_and_renew() {
        let mut awareness = Awareness::new(1);
        assert!(awareness.renew(0).is_none());
        assert!(awareness.set_cursor(None, 0).is_none());

        awareness.set_local_state(presence("Ann"), 0);
        let cursor = CursorRange {
            anchor: StickyIndex::default(),
            head: StickyIndex::default(),
        };
        let update = awareness.set_cursor(Some(cursor), 10).unwrap();
        assert_eq!(update.state.and_then(|s| s.cursor), Some(cursor));

        let renewed = awareness.renew(20).unwrap();
        assert_eq!(renewed.clock, 3);
    }

    #[test]
    fn test_leave_update_clears_local() {
        let mut awareness = Awareness::new(1);
        awareness.set_local_state(presence("Ann"), 0);
        let leave = awareness.create_leave_update();
        assert_eq!(leave.state, None);
        assert_eq!(leave.clock, 2);
        assert_eq!(awareness.client_count(), 0);
    }
}
