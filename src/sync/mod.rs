//! Client-side sync: collect pending changes, ship them to the server,
//! fold the response back into local state.
//!
//! The pieces are deliberately separable: [`collector`] is a pure snapshot
//! over the store, [`client`] is the HTTP transport, and [`reconciler`]
//! performs the only mutations, after a successful round trip.

pub mod client;
pub mod collector;
pub mod reconciler;
pub mod runner;

pub use client::{SyncClient, SyncClientError};
pub use collector::collect_changes;
pub use reconciler::{apply_response, ReconcileSummary};
pub use runner::{SyncEngine, SyncOutcome};
