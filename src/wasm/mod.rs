//! WASM bindings
//!
//! JavaScript-friendly wrappers around the document, awareness and peer
//! session. Binary updates cross the boundary as byte arrays; structured
//! values as JSON strings.

pub mod bindings;
pub mod utils;

pub use bindings::{WasmAwareness, WasmDocument, WasmSession};
