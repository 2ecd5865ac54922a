//! Wire protocol
//!
//! - [`codec`]: update records and state vectors to bytes and back
//! - [`message`]: the session frames exchanged through the relay
//! - [`wire`]: the underlying Protocol Buffer messages

pub mod codec;
pub mod message;
pub mod wire;

pub use codec::{decode, decode_text, encode, encode_text};
pub use message::{Envelope, SyncMessage};
