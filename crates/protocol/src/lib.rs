//! Wire types for the Playwright driver protocol.
//!
//! This crate holds the serde-serializable shapes exchanged with the
//! Playwright driver over its JSON-RPC pipe, plus the storage-state document
//! that passbak persists between runs as its session snapshot.
//!
//! Types here are pure data. Behaviour (correlation, waiting, flows) lives in
//! `passbak-runtime` and `passbak`.

pub mod message;
pub mod options;
pub mod storage;

pub use message::*;
pub use options::*;
pub use storage::*;
