//! Offline-first daily goal tracking with server sync.
//!
//! Local state lives in a single JSON file mutated through store actions;
//! every mutation leaves a pending flag behind. The sync layer collects
//! pending records into a batch, ships it to the server, and reconciles
//! the acknowledgements and the server's delta back into local state. The
//! server side applies each batch in one transaction and serves deltas
//! keyed on a per-user watermark.

pub mod config;
pub mod models;
pub mod protocol;
pub mod server;
pub mod store;
pub mod sync;
