mod clock;
/// Awareness protocol - ephemeral user presence
///
/// Unlike the document, awareness tracks state that only matters while a
/// client is connected:
/// - Who's online
/// - Display name and color
/// - Cursor positions and selections
///
/// Key differences from document sync:
/// - No persistence (in-memory only)
/// - 30-second timeout for offline detection
/// - Simpler conflict resolution (increasing clock, not state vectors)
/// - Never part of the CRDT or its update records
mod state;
mod throttle;

pub use clock::IncreasingClock;
pub use state::{
    Awareness, AwarenessChange, AwarenessUpdate, CursorRange, PeerPresence, PresenceState,
};
pub use throttle::Throttle;

use crate::Millis;
use uuid::Uuid;

/// Default timeout for marking clients offline
pub const DEFAULT_TIMEOUT: Millis = 30_000;

/// Heartbeat interval (send update even if no changes)
pub const HEARTBEAT_INTERVAL: Millis = 10_000;

/// Minimum spacing between cursor broadcasts
pub const THROTTLE_INTERVAL: Millis = 80;

const ANIMALS: [&str; 10] = [
    "Lion", "Panda", "Koala", "Tiger", "Crane", "Falcon", "Otter", "Hare", "Yak", "Gator",
];

/// Random display identity such as `Otter-42` with a random color
pub fn random_presence() -> PresenceState {
    presence_from_seed(Uuid::new_v4())
}

/// Display identity derived from `seed`
pub fn presence_from_seed(seed: Uuid) -> PresenceState {
    let bytes = seed.as_bytes();
    let animal = ANIMALS[bytes[0] as usize % ANIMALS.len()];
    PresenceState {
        name: format!("{}-{}", animal, bytes[1] % 100),
        color: format!("#{:02x}{:02x}{:02x}", bytes[2], bytes[3], bytes[4]),
        cursor: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_awareness_creation() {
        let awareness = Awareness::new(1);
        assert_eq!(awareness.client_id(), 1);
        assert!(awareness.states().is_empty());
    }

    #[test]
    fn test_presence_from_seed() {
        let seed = Uuid::from_bytes([6, 142, 0x1a, 0x2b, 0x3c, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let presence = presence_from_seed(seed);
        assert_eq!(presence.name, "Otter-42");
        assert_eq!(presence.color, "#1a2b3c");
        assert!(presence.cursor.is_none());
    }

    #[test]
    fn test_random_presence_shape() {
        let presence = random_presence();
        let (animal, number) = presence.name.split_once('-').unwrap();
        assert!(ANIMALS.contains(&animal));
        assert!(number.parse::<u8>().unwrap() < 100);
        assert_eq!(presence.color.len(), 7);
        assert!(presence.color.starts_with('#'));
    }
}
