//! Core types and errors for the Tributary event store
//!
//! This crate defines the foundational types used throughout the system:
//! - LogPosition: absolute address in the chunked transaction log
//! - EventData / EventRecord: event payloads
//! - EpochRecord: per-startup epoch marker
//! - WriteOutcome / ReadOutcome: typed per-request results
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    EpochRecord, EventData, EventRecord, LogPosition, ReadOutcome, WriteOutcome,
    EXPECTED_NO_STREAM, TOMBSTONE_EVENT_TYPE,
};
