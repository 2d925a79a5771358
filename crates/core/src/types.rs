//! Core types for the Tributary event store
//!
//! This module defines the foundational types:
//! - LogPosition: absolute logical address in the chunked transaction log
//! - ExpectedVersion: optimistic-concurrency token supplied with a write
//! - EventData / EventRecord: event payloads before and after append
//! - EpochRecord: per-startup marker embedded in the log
//! - WriteOutcome / ReadOutcome: typed per-request results

use std::fmt;
use uuid::Uuid;

/// Expected-version sentinel: the stream must not exist yet (first event).
pub const EXPECTED_NO_STREAM: i64 = -1;

/// Event type reserved for stream deletion tombstones.
///
/// A tombstone is an ordinary log record, so deletion survives restarts and
/// is rebuilt by the recovery scan like any other head movement.
pub const TOMBSTONE_EVENT_TYPE: &str = "$stream-deleted";

/// Absolute logical address of a record in the transaction log.
///
/// Positions are assigned by the chunked log on append and are stable for
/// the lifetime of the store. The containing chunk is recovered by
/// arithmetic: `chunk = position / chunk_capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition(pub u64);

impl LogPosition {
    /// Raw position value
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event payload supplied by a writer, before a version is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    /// User-defined event category
    pub event_type: String,
    /// Event payload bytes (opaque to the store)
    pub data: Vec<u8>,
    /// Event metadata bytes (opaque to the store)
    pub metadata: Vec<u8>,
}

impl EventData {
    /// Convenience constructor for events without metadata
    pub fn new(event_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        EventData {
            event_type: event_type.into(),
            data: data.into(),
            metadata: Vec::new(),
        }
    }
}

/// A committed event: payload plus the stream and version it landed at.
///
/// Immutable once appended. Owned by the chunked log; the stream head index
/// references events by position, it never owns the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Stream this event belongs to
    pub stream: String,
    /// Version of this event within its stream (0-based, gapless)
    pub event_number: i64,
    /// User-defined event category
    pub event_type: String,
    /// Event payload bytes
    pub data: Vec<u8>,
    /// Event metadata bytes
    pub metadata: Vec<u8>,
}

/// Epoch record written to the log once per process startup.
///
/// Epoch ids are distinct for every startup of the same node and epoch
/// numbers increase by exactly one per startup. The chain of all epochs
/// ever written is recoverable purely by scanning the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochRecord {
    /// Globally unique id for this startup
    pub epoch_id: Uuid,
    /// Strictly increasing epoch number (0 for a fresh store)
    pub epoch_number: i64,
    /// Log position the epoch record was appended at
    pub log_position: u64,
}

/// Typed result of a write request.
///
/// Negative outcomes are values, not errors: callers match exhaustively and
/// decide whether to re-read the head and retry. Only physical storage
/// failure surfaces as `Err` from the write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// All events committed; `first_event_number` is the version of the
    /// first event in the batch (`expected + 1`, or 0 for a new stream).
    Completed {
        /// Version assigned to the first event of the batch
        first_event_number: i64,
    },
    /// The caller's assumed stream state is stale
    WrongExpectedVersion {
        /// Version the caller asserted
        expected: i64,
        /// Head observed at check time (-1 when the stream is absent)
        actual: i64,
    },
    /// Terminal: the stream has been deleted
    StreamDeleted,
}

/// Typed result of a point read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Event found; exact bytes and type passed at write time
    Success {
        /// User-defined event category
        event_type: String,
        /// Event payload bytes
        data: Vec<u8>,
    },
    /// Stream exists but the requested version is beyond its head
    NotFound,
    /// Stream has never been written
    NoStream,
    /// Stream has been deleted
    StreamDeleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_position_ordering() {
        assert!(LogPosition(10) < LogPosition(11));
        assert_eq!(LogPosition(7).raw(), 7);
        assert_eq!(LogPosition(7).to_string(), "7");
    }

    #[test]
    fn test_event_data_new_has_empty_metadata() {
        let e = EventData::new("deposit", b"100".to_vec());
        assert_eq!(e.event_type, "deposit");
        assert_eq!(e.data, b"100");
        assert!(e.metadata.is_empty());
    }

    #[test]
    fn test_write_outcome_matching() {
        let outcome = WriteOutcome::WrongExpectedVersion {
            expected: -1,
            actual: 4,
        };
        match outcome {
            WriteOutcome::WrongExpectedVersion { expected, actual } => {
                assert_eq!(expected, EXPECTED_NO_STREAM);
                assert_eq!(actual, 4);
            }
            _ => panic!("wrong variant"),
        }
    }
}
