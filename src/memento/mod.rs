//! Append-only snapshot capture for auditing a run.
//!
//! Capture is one-directional: there is no restore.

mod snapshot;
mod store;

pub use snapshot::Snapshot;
pub use store::SnapshotStore;
