//! Engine for the Tributary event store.
//!
//! Composes the durability layer and the stream head index into the full
//! single-node write/read/recovery path:
//! - `EventStore::open()`: recover, rebuild the index, write the startup
//!   epoch, then accept requests
//! - `append_to_stream()`: the expected-version write coordinator
//! - `read_event()`: the point-read service
//! - `close()` / `flush()`: graceful shutdown hooks for the supervisor

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod options;
pub mod store;

pub use options::{FlushMode, StoreOptions};
pub use store::EventStore;

// Commonly needed alongside the store API.
pub use tributary_core::{EventData, ReadOutcome, WriteOutcome, EXPECTED_NO_STREAM};
pub use tributary_durability::epoch::{EpochPublisher, EpochWritten, NoopEpochPublisher};
pub use tributary_index::Head;
