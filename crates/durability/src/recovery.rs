//! Startup recovery scan.
//!
//! After the chunked log has repaired its tail (everything past the commit
//! checkpoint is already discarded by `ChunkedLog::open`), this module
//! scans the committed range once, front to back, and rebuilds the
//! in-memory state the engine needs:
//!
//! - per-stream heads and per-version log positions for the stream index;
//! - deletion tombstones;
//! - the highest epoch record, seeding the epoch manager.
//!
//! A torn or undecodable frame *inside* the committed range is fatal: the
//! commit checkpoint promised those bytes were durable, so the node must
//! not start writing over them.

use std::collections::HashMap;
use tracing::info;
use tributary_core::{EpochRecord, Error, Result, TOMBSTONE_EVENT_TYPE};

use crate::chunk::{ChunkFile, FrameRead};
use crate::log::ChunkedLog;
use crate::record::LogRecord;

/// Recovered per-stream state.
#[derive(Debug, Clone, Default)]
pub struct RecoveredStream {
    /// Last committed event number (-1 never occurs here; absent streams
    /// simply have no entry)
    pub head: i64,
    /// Log position of every version, indexed by event number
    pub positions: Vec<u64>,
    /// Whether a deletion tombstone was seen
    pub deleted: bool,
}

/// Everything the recovery scan learned from the committed log.
#[derive(Debug, Default)]
pub struct RecoveredState {
    /// Per-stream heads and positions
    pub streams: HashMap<String, RecoveredStream>,
    /// Highest epoch record found, if any
    pub last_epoch: Option<EpochRecord>,
    /// Event records scanned
    pub events_scanned: u64,
    /// Epoch records scanned
    pub epochs_scanned: u64,
}

/// Scan the committed range of the log and rebuild stream state.
pub fn rebuild(log: &ChunkedLog) -> Result<RecoveredState> {
    let capacity = log.chunk_capacity();
    let commit = log.commit_position();
    let mut state = RecoveredState::default();

    let mut position = 0u64;
    let mut open_chunk: Option<ChunkFile> = None;

    while position < commit {
        let number = position / capacity;
        let offset = position % capacity;

        let chunk = match &mut open_chunk {
            Some(c) if c.number() == number => c,
            slot => slot.insert(ChunkFile::open(log.dir(), number, capacity, false)?),
        };

        match chunk.read_frame(offset)? {
            FrameRead::Record {
                record,
                next_offset,
            } => {
                apply(&mut state, &record, position);
                position = number * capacity + next_offset;
            }
            FrameRead::Padding { .. } | FrameRead::End => {
                // Rest of this chunk window holds no records.
                position = (number + 1) * capacity;
            }
            FrameRead::Torn => {
                return Err(Error::Corruption(format!(
                    "unreadable record inside committed range at position {position}"
                )));
            }
        }
    }

    info!(
        streams = state.streams.len(),
        events = state.events_scanned,
        epochs = state.epochs_scanned,
        last_epoch = state.last_epoch.map(|e| e.epoch_number),
        "recovery scan complete"
    );

    Ok(state)
}

fn apply(state: &mut RecoveredState, record: &LogRecord, position: u64) {
    match record {
        LogRecord::Event(event) => {
            state.events_scanned += 1;
            let entry = state.streams.entry(event.stream.clone()).or_default();
            entry.head = event.event_number;
            entry.positions.push(position);
            if event.event_type == TOMBSTONE_EVENT_TYPE {
                entry.deleted = true;
            }
        }
        LogRecord::Epoch(epoch) => {
            state.epochs_scanned += 1;
            state.last_epoch = Some(*epoch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tributary_core::EventRecord;
    use uuid::Uuid;

    fn event(stream: &str, n: i64) -> LogRecord {
        LogRecord::Event(EventRecord {
            stream: stream.to_string(),
            event_number: n,
            event_type: "test".to_string(),
            data: format!("{stream}:{n}").into_bytes(),
            metadata: Vec::new(),
        })
    }

    #[test]
    fn test_rebuild_recovers_heads_and_positions() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 64 * 1024).unwrap();

        for n in 0..5 {
            log.append(&event("a", n)).unwrap();
        }
        for n in 0..3 {
            log.append(&event("b", n)).unwrap();
        }
        log.flush().unwrap();

        let state = rebuild(&log).unwrap();
        assert_eq!(state.streams["a"].head, 4);
        assert_eq!(state.streams["a"].positions.len(), 5);
        assert_eq!(state.streams["b"].head, 2);
        assert_eq!(state.events_scanned, 8);
    }

    #[test]
    fn test_rebuild_ignores_uncommitted_tail() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 64 * 1024).unwrap();
        log.append(&event("a", 0)).unwrap();
        log.flush().unwrap();
        log.append(&event("a", 1)).unwrap();
        // not flushed: below the writer checkpoint but past commit

        let state = rebuild(&log).unwrap();
        assert_eq!(state.streams["a"].head, 0);
    }

    #[test]
    fn test_rebuild_finds_last_epoch() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 64 * 1024).unwrap();

        for number in 0..3 {
            log.append(&LogRecord::Epoch(EpochRecord {
                epoch_id: Uuid::new_v4(),
                epoch_number: number,
                log_position: log.writer_position(),
            }))
            .unwrap();
        }
        log.flush().unwrap();

        let state = rebuild(&log).unwrap();
        assert_eq!(state.last_epoch.unwrap().epoch_number, 2);
        assert_eq!(state.epochs_scanned, 3);
    }

    #[test]
    fn test_rebuild_spans_chunk_rollover() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 256).unwrap();

        for n in 0..30 {
            log.append(&event("s", n)).unwrap();
        }
        log.flush().unwrap();
        assert!(log.active_chunk_number() > 0);

        let state = rebuild(&log).unwrap();
        assert_eq!(state.streams["s"].head, 29);
        assert_eq!(state.streams["s"].positions.len(), 30);
    }

    #[test]
    fn test_tombstone_marks_stream_deleted() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 64 * 1024).unwrap();
        log.append(&event("s", 0)).unwrap();
        log.append(&LogRecord::Event(EventRecord {
            stream: "s".to_string(),
            event_number: 1,
            event_type: TOMBSTONE_EVENT_TYPE.to_string(),
            data: Vec::new(),
            metadata: Vec::new(),
        }))
        .unwrap();
        log.flush().unwrap();

        let state = rebuild(&log).unwrap();
        assert!(state.streams["s"].deleted);
    }
}
