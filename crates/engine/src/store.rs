//! The event store: open/recover lifecycle, write coordinator, read service.
//!
//! `EventStore::open()` runs the full startup sequence:
//!
//! 1. open the chunked log (tail repair discards uncommitted bytes);
//! 2. recovery scan rebuilds the stream head index and finds the last epoch;
//! 3. the epoch manager writes and announces the startup epoch.
//!
//! Only then does the store exist, so the epoch write happens-before any
//! accepted client request.
//!
//! # Write path
//!
//! Reserve version(s) in the index → append each event record → flush →
//! commit the reservation. Any failure after the reservation rolls it back
//! before the error propagates, leaving the stream head exactly as it was:
//! a failed write is invisible to subsequent writers and burns no version.
//!
//! Concurrent writes to different streams proceed independently; the
//! physical append is the only shared serialization point. Writes to the
//! same stream serialize through the per-stream reservation.
//!
//! # Read path
//!
//! The head bound is checked first — NotFound / NoStream / StreamDeleted
//! never touch the log. A hit resolves the version's log position through
//! the index and fetches the record from its chunk, independent of the
//! writer.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tributary_core::{
    EpochRecord, Error, EventData, EventRecord, ReadOutcome, Result, WriteOutcome,
    TOMBSTONE_EVENT_TYPE,
};
use tributary_durability::epoch::{EpochManager, EpochPublisher, NoopEpochPublisher};
use tributary_durability::log::ChunkedLog;
use tributary_durability::record::LogRecord;
use tributary_durability::recovery;
use tributary_index::{Head, StreamHeadIndex};

use crate::options::{FlushMode, StoreOptions};

/// Longest accepted stream name, bounded by the wire encoding.
pub const MAX_STREAM_NAME: usize = u16::MAX as usize;

/// A single-node event store over a chunked transaction log.
pub struct EventStore {
    dir: PathBuf,
    log: ChunkedLog,
    index: StreamHeadIndex,
    epoch: EpochRecord,
    options: StoreOptions,
}

impl EventStore {
    /// Open the store with default epoch notification (dropped).
    pub fn open(dir: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        Self::open_with_publisher(dir, options, &NoopEpochPublisher)
    }

    /// Open the store, announcing the startup epoch to `publisher`.
    ///
    /// Fatal if the log is unreadable inside its committed range — the
    /// node must not start writing over data it cannot validate.
    pub fn open_with_publisher(
        dir: impl AsRef<Path>,
        options: StoreOptions,
        publisher: &dyn EpochPublisher,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let log = ChunkedLog::open(&dir, options.chunk_capacity)?;

        let state = recovery::rebuild(&log)?;
        let index = StreamHeadIndex::new();
        for (stream, recovered) in &state.streams {
            index.restore(stream, recovered.head, recovered.positions.clone(), recovered.deleted);
        }

        let mut epochs = EpochManager::new(state.last_epoch);
        let epoch = epochs.on_startup(&log, publisher)?;

        info!(
            dir = %dir.display(),
            streams = index.stream_count(),
            events_recovered = state.events_scanned,
            repaired_bytes = log.repaired_bytes(),
            epoch_number = epoch.epoch_number,
            "event store open"
        );

        Ok(EventStore {
            dir,
            log,
            index,
            epoch,
            options,
        })
    }

    /// Append a batch of events under an expected-version check.
    ///
    /// Returns a typed outcome; only physical storage failure is an `Err`.
    /// On success the batch occupies consecutive versions starting at
    /// `expected + 1` (0 for a new stream).
    pub fn append_to_stream(
        &self,
        stream: &str,
        expected_version: i64,
        events: Vec<EventData>,
    ) -> Result<WriteOutcome> {
        self.validate_stream_name(stream)?;
        if events.is_empty() {
            return Err(Error::InvalidOperation(
                "write must carry at least one event".to_string(),
            ));
        }

        let first = match self.index.try_reserve(stream, expected_version, events.len()) {
            Ok(first) => first,
            Err(Error::WrongExpectedVersion {
                expected, actual, ..
            }) => {
                return Ok(WriteOutcome::WrongExpectedVersion { expected, actual });
            }
            Err(Error::StreamDeleted(_)) => return Ok(WriteOutcome::StreamDeleted),
            Err(e) => return Err(e),
        };

        // The batch goes to the log as one unit: size validation happens
        // before any byte is written, so a rejected batch leaves no ghost
        // records for a later flush to commit or recovery to replay.
        let records: Vec<LogRecord> = events
            .into_iter()
            .enumerate()
            .map(|(i, event)| {
                LogRecord::Event(EventRecord {
                    stream: stream.to_string(),
                    event_number: first + i as i64,
                    event_type: event.event_type,
                    data: event.data,
                    metadata: event.metadata,
                })
            })
            .collect();
        let positions = match self.log.append_batch(&records) {
            Ok(positions) => positions,
            Err(e) => {
                self.index.rollback(stream);
                return Err(e);
            }
        };

        if self.options.flush_mode == FlushMode::Always {
            if let Err(e) = self.log.flush() {
                self.index.rollback(stream);
                return Err(e);
            }
        }

        self.index.commit(stream, &positions)?;
        debug!(stream, first_event_number = first, count = positions.len(), "write committed");
        Ok(WriteOutcome::Completed {
            first_event_number: first,
        })
    }

    /// Read a single event by stream and version.
    pub fn read_event(&self, stream: &str, event_number: i64) -> Result<ReadOutcome> {
        match self.index.current_head(stream) {
            Head::Deleted => return Ok(ReadOutcome::StreamDeleted),
            Head::Absent => return Ok(ReadOutcome::NoStream),
            Head::At(head) => {
                if event_number < 0 || event_number > head {
                    return Ok(ReadOutcome::NotFound);
                }
            }
        }

        let position = match self.index.position_of(stream, event_number) {
            Some(p) => p,
            None => return Ok(ReadOutcome::NotFound),
        };

        match self.log.read(position)? {
            LogRecord::Event(event) => Ok(ReadOutcome::Success {
                event_type: event.event_type,
                data: event.data,
            }),
            LogRecord::Epoch(_) => Err(Error::Corruption(format!(
                "stream index for '{stream}' v{event_number} points at an epoch record"
            ))),
        }
    }

    /// Delete a stream by committing a tombstone event.
    ///
    /// Terminal: subsequent writes and reads observe StreamDeleted. The
    /// tombstone occupies one version, so it survives restarts like any
    /// other head movement.
    pub fn delete_stream(&self, stream: &str, expected_version: i64) -> Result<WriteOutcome> {
        let outcome = self.append_to_stream(
            stream,
            expected_version,
            vec![EventData {
                event_type: TOMBSTONE_EVENT_TYPE.to_string(),
                data: Vec::new(),
                metadata: Vec::new(),
            }],
        )?;
        if let WriteOutcome::Completed { .. } = outcome {
            self.index.mark_deleted(stream);
            info!(stream, "stream deleted");
        }
        Ok(outcome)
    }

    /// Observable head of a stream.
    pub fn stream_head(&self, stream: &str) -> Head {
        self.index.current_head(stream)
    }

    /// The epoch this store instance is running under.
    pub fn current_epoch(&self) -> EpochRecord {
        self.epoch
    }

    /// Force durability of all writes.
    pub fn flush(&self) -> Result<()> {
        self.log.flush()
    }

    /// Graceful shutdown: flush so the next open skips tail repair.
    pub fn close(self) -> Result<()> {
        self.log.flush()?;
        info!(dir = %self.dir.display(), "event store closed");
        Ok(())
    }

    /// Data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn validate_stream_name(&self, stream: &str) -> Result<()> {
        if stream.is_empty() {
            return Err(Error::InvalidOperation(
                "stream name must not be empty".to_string(),
            ));
        }
        if stream.len() > MAX_STREAM_NAME {
            return Err(Error::InvalidOperation(format!(
                "stream name of {} bytes exceeds the {MAX_STREAM_NAME}-byte limit",
                stream.len()
            )));
        }
        Ok(())
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        // Best-effort: close() already flushed for graceful shutdowns.
        let _ = self.log.flush();
    }
}
