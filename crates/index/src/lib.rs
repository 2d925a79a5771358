//! Stream head index for the Tributary event store.
//!
//! Tracks each stream's current head, per-version log positions, and
//! deletion tombstones, with per-stream mutual exclusion so unrelated
//! streams never contend. Rebuilt from the log at startup by the recovery
//! scan; mutated only through the reserve/commit/rollback protocol.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod heads;

pub use heads::{Head, StreamHeadIndex};
