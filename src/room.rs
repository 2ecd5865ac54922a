//! Room identifiers
//!
//! A room is named by the `room` query parameter of the page URL. Opening
//! the page without one creates a fresh room and rewrites the URL so it
//! can be shared.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Validated room name, also used as the relay topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Accepts non-empty names made of url-safe characters
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > 128 {
            return Err(SyncError::Config(format!(
                "room id must be 1..=128 characters, got {}",
                name.len()
            )));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(SyncError::Config(format!(
                "room id contains invalid character {:?}",
                bad
            )));
        }
        Ok(Self(name))
    }

    /// Fresh `room-XXXXXXXX` identifier
    pub fn generate() -> Self {
        let bytes = Uuid::new_v4().into_bytes();
        let suffix: String = bytes[..8]
            .iter()
            .map(|b| ALPHABET[(*b & 63) as usize] as char)
            .collect();
        Self(format!("room-{}", suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        RoomId::parse(value)
    }
}

impl From<RoomId> for String {
    fn from(room: RoomId) -> Self {
        room.0
    }
}

/// Room named by `url`, and the rewritten URL when one was generated
///
/// ```rust
/// use cowrite_core::room::resolve;
///
/// let (room, rewritten) = resolve("https://edit.example/?room=team-notes").unwrap();
/// assert_eq!(room.as_str(), "team-notes");
/// assert!(rewritten.is_none());
///
/// let (room, rewritten) = resolve("https://edit.example/").unwrap();
/// assert_eq!(rewritten.unwrap(), format!("https://edit.example/?room={}", room));
/// ```
pub fn resolve(url: &str) -> Result<(RoomId, Option<String>)> {
    if let Some(name) = query_param(url, "room").filter(|v| !v.is_empty()) {
        return Ok((RoomId::parse(decode_component(name))?, None));
    }
    let room = RoomId::generate();
    let rewritten = with_query_param(url, "room", room.as_str());
    Ok((room, Some(rewritten)))
}

fn split_fragment(url: &str) -> (&str, &str) {
    match url.find('#') {
        Some(pos) => url.split_at(pos),
        None => (url, ""),
    }
}

fn query_param<'a>(url: &'a str, key: &str) -> Option<&'a str> {
    let (base, _) = split_fragment(url);
    let (_, query) = base.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// Undo form encoding: `+` is a space and `%XX` a byte
///
/// Malformed escapes are kept literally, as browsers do.
fn decode_component(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let escaped = bytes
                    .get(i + 1..i + 3)
                    .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match escaped {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            byte => out.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn with_query_param(url: &str, key: &str, value: &str) -> String {
    let (base, fragment) = split_fragment(url);
    let (path, query) = match base.split_once('?') {
        Some((path, query)) => (path, query),
        None => (base, ""),
    };

    let mut pairs: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some(key))
        .collect();
    let param = format!("{}={}", key, value);
    pairs.push(&param);

    format!("{}?{}{}", path, pairs.join("&"), fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_shape() {
        let room = RoomId::generate();
        let suffix = room.as_str().strip_prefix("room-").unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(RoomId::parse(room.as_str()).is_ok());
        assert_ne!(RoomId::generate(), room);
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        assert!(RoomId::parse("").is_err());
        assert!(RoomId::parse("a b").is_err());
        assert!(RoomId::parse("x".repeat(129)).is_err());
        assert!(RoomId::parse("demo-room").is_ok());
    }

    #[test]
    fn test_resolve_existing_room() {
        let (room, rewritten) = resolve("http://localhost:3000/?theme=dark&room=abc_1#top").unwrap();
        assert_eq!(room.as_str(), "abc_1");
        assert!(rewritten.is_none());
    }

    #[test]
    fn test_resolve_decodes_query_value() {
        let (room, _) = resolve("https://edit.example/?room=a%2Db").unwrap();
        assert_eq!(room.as_str(), "a-b");
        let (room, _) = resolve("https://edit.example/?room=team%5fnotes%2E1").unwrap();
        assert_eq!(room.as_str(), "team_notes.1");

        // Decoded names are validated like any other
        assert!(resolve("https://edit.example/?room=team+notes").is_err());
        assert!(resolve("https://edit.example/?room=a%2").is_err());
    }

    #[test]
    fn test_decode_component() {
        assert_eq!(decode_component("a%20b+c"), "a b c");
        assert_eq!(decode_component("100%"), "100%");
        assert_eq!(decode_component("%zz%41"), "%zzA");
        assert_eq!(decode_component("caf%C3%A9"), "café");
    }

    #[test]
    fn test_resolve_rewrites_url() {
        let (room, rewritten) = resolve("http://localhost:3000/doc?theme=dark&room=#top").unwrap();
        assert_eq!(
            rewritten.unwrap(),
            format!("http://localhost:3000/doc?theme=dark&room={}#top", room)
        );
    }

    #[test]
    fn test_serde_validates() {
        let room: RoomId = serde_json::from_str("\"team\"").unwrap();
        assert_eq!(room.as_str(), "team");
        assert!(serde_json::from_str::<RoomId>("\"bad room\"").is_err());
    }
}
