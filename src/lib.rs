//! Tributary: a single-node event-store database.
//!
//! Streams of immutable events are appended under optimistic
//! expected-version control, persisted in a chunked transaction log with
//! checkpointed recovery, and served over a compact binary TCP protocol.
//!
//! The workspace splits along those seams:
//! - [`tributary_core`]: shared types and the error taxonomy
//! - [`tributary_durability`]: chunked log, checkpoints, epochs, recovery
//! - [`tributary_index`]: in-memory stream head index
//! - [`tributary_engine`]: the [`EventStore`] composing the above
//! - [`tributary_wire`]: package framing and payload codecs
//! - [`tributary_net`]: TCP [`Server`] and blocking [`ClientSession`]
//!
//! # Example
//!
//! ```no_run
//! use tributary::{EventData, EventStore, StoreOptions, EXPECTED_NO_STREAM};
//!
//! # fn main() -> tributary::Result<()> {
//! let store = EventStore::open("./data", StoreOptions::default())?;
//! store.append_to_stream(
//!     "acct-1",
//!     EXPECTED_NO_STREAM,
//!     vec![EventData::new("Deposited", br#"{"amount":100}"#.to_vec())],
//! )?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use tributary_core::{
    EpochRecord, Error, EventData, EventRecord, LogPosition, ReadOutcome, Result, WriteOutcome,
    EXPECTED_NO_STREAM, TOMBSTONE_EVENT_TYPE,
};
pub use tributary_engine::{EventStore, FlushMode, StoreOptions};
pub use tributary_index::Head;
pub use tributary_net::{ClientSession, Server, SessionError};
pub use tributary_wire::{OperationResult, ReadEventResult};

pub use tributary_durability::epoch::{EpochPublisher, EpochWritten, NoopEpochPublisher};
