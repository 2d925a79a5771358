//! Durability layer for the Tributary event store.
//!
//! This crate owns everything that touches disk:
//! - `checkpoint`: durable writer/commit position markers
//! - `record`: CRC-framed log record encoding
//! - `chunk`: fixed-capacity chunk files
//! - `log`: the chunked append-only transaction log
//! - `epoch`: per-startup epoch records and notifications
//! - `recovery`: the startup scan that rebuilds stream state
//!
//! The engine crate composes these into the full open/recover/serve
//! sequence; nothing here knows about streams' expected-version semantics.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod chunk;
pub mod epoch;
pub mod log;
pub mod record;
pub mod recovery;

pub use checkpoint::Checkpoint;
pub use chunk::{ChunkFile, FrameRead, CHUNK_HEADER_SIZE};
pub use epoch::{EpochManager, EpochPublisher, EpochWritten, NoopEpochPublisher};
pub use log::ChunkedLog;
pub use record::LogRecord;
pub use recovery::{rebuild, RecoveredState, RecoveredStream};
