//! The chunked transaction log.
//!
//! An append-only store built from fixed-capacity chunk files. Writes go to
//! the single active chunk; when a frame would overflow the remaining
//! window the chunk is sealed early (padding fills the tail) and a new
//! chunk is opened, so record boundaries never span two chunks and every
//! chunk file is independently readable.
//!
//! The physical append path is serialized by one mutex — this is the
//! system's sole true bottleneck, matching the single-append-only-file
//! model. Readers resolve a position to its chunk by arithmetic and open
//! their own file handle, so reads never contend with the writer.
//!
//! # Durability
//!
//! `append()` leaves bytes in the OS page cache; `flush()` fsyncs the
//! active chunk and advances the durable commit checkpoint to the writer
//! position. On open, anything past the commit checkpoint is discarded
//! (tail repair), so a crash can lose unflushed appends but never yields a
//! partially-visible record.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tributary_core::{Error, LogPosition, Result};

use crate::checkpoint::Checkpoint;
use crate::chunk::{chunk_path, ChunkFile, FrameRead};
use crate::record::{encode_frame, encode_padding_frame, LogRecord, MIN_FRAME_SIZE};

/// File name of the writer checkpoint.
pub const WRITER_CHECKPOINT: &str = "writer.chk";
/// File name of the commit checkpoint.
pub const COMMIT_CHECKPOINT: &str = "commit.chk";

struct ActiveChunk {
    chunk: ChunkFile,
    number: u64,
    used: u64,
}

/// Append-only chunked log with durable checkpoints.
pub struct ChunkedLog {
    dir: PathBuf,
    chunk_capacity: u64,
    active: Mutex<ActiveChunk>,
    writer_chk: Checkpoint,
    commit_chk: Checkpoint,
    repaired_bytes: u64,
}

impl ChunkedLog {
    /// Open (or create) the log in `dir`, repairing the tail if needed.
    ///
    /// Tail repair discards any bytes past the durable commit checkpoint:
    /// later chunk files are deleted and the active chunk is truncated.
    /// A log that is *shorter* than the commit checkpoint claims is fatal —
    /// committed data cannot be missing.
    pub fn open(dir: impl Into<PathBuf>, chunk_capacity: u64) -> Result<Self> {
        let dir = dir.into();
        if chunk_capacity < MIN_FRAME_SIZE {
            return Err(Error::InvalidOperation(format!(
                "chunk capacity {chunk_capacity} is smaller than one frame"
            )));
        }
        std::fs::create_dir_all(&dir)?;

        let writer_chk = Checkpoint::open(dir.join(WRITER_CHECKPOINT))?;
        let commit_chk = Checkpoint::open(dir.join(COMMIT_CHECKPOINT))?;

        let commit = commit_chk.get();
        let active_number = commit / chunk_capacity;
        let active_offset = commit % chunk_capacity;

        // Drop whole chunks past the committed tail.
        let mut repaired_bytes = 0u64;
        let mut stale = active_number + 1;
        while chunk_path(&dir, stale).exists() {
            let chunk = ChunkFile::open(&dir, stale, chunk_capacity, false)?;
            repaired_bytes += chunk.used_bytes()?;
            drop(chunk);
            std::fs::remove_file(chunk_path(&dir, stale))?;
            stale += 1;
        }

        let mut chunk = if chunk_path(&dir, active_number).exists() {
            ChunkFile::open(&dir, active_number, chunk_capacity, true)?
        } else if active_offset == 0 {
            // Fresh store, or the previous run flushed exactly at a chunk
            // boundary and crashed before creating the next chunk.
            ChunkFile::create(&dir, active_number, chunk_capacity)?
        } else {
            return Err(Error::Corruption(format!(
                "active chunk {active_number} missing but commit checkpoint is {commit}"
            )));
        };

        let used = chunk.used_bytes()?;
        if used < active_offset {
            return Err(Error::Corruption(format!(
                "log is shorter than commit checkpoint: chunk {active_number} holds {used} bytes, \
                 checkpoint expects {active_offset}"
            )));
        }
        if used > active_offset {
            repaired_bytes += used - active_offset;
            chunk.truncate_to(active_offset)?;
        }

        if repaired_bytes > 0 {
            warn!(
                repaired_bytes,
                commit_position = commit,
                "discarded uncommitted log tail"
            );
        }

        // The writer checkpoint may be stale after a crash; the commit
        // checkpoint is the authority for the repaired tail.
        writer_chk.set(commit);
        writer_chk.flush()?;

        info!(
            dir = %dir.display(),
            chunk_capacity,
            active_chunk = active_number,
            commit_position = commit,
            "chunked log opened"
        );

        Ok(ChunkedLog {
            dir,
            chunk_capacity,
            active: Mutex::new(ActiveChunk {
                chunk,
                number: active_number,
                used: active_offset,
            }),
            writer_chk,
            commit_chk,
            repaired_bytes,
        })
    }

    /// Append a record, rolling the active chunk if it lacks capacity.
    ///
    /// Returns the absolute log position of the record. Not durable until
    /// `flush()`. Disk failure here is not converted to a client error —
    /// the log cannot make forward progress without durable storage.
    pub fn append(&self, record: &LogRecord) -> Result<LogPosition> {
        let frame = encode_frame(record);
        self.check_capacity(frame.len() as u64)?;
        let mut active = self.active.lock();
        self.write_locked(&mut active, &frame)
    }

    /// Append a batch of records under one lock acquisition.
    ///
    /// Every frame is encoded and size-checked before any byte is written,
    /// so a rejected batch leaves the log exactly as it was: no prefix of
    /// the batch can reach disk and later be committed by an unrelated
    /// flush or replayed by the recovery scan.
    pub fn append_batch(&self, records: &[LogRecord]) -> Result<Vec<LogPosition>> {
        let mut frames = Vec::with_capacity(records.len());
        for record in records {
            let frame = encode_frame(record);
            self.check_capacity(frame.len() as u64)?;
            frames.push(frame);
        }

        let mut active = self.active.lock();
        let mut positions = Vec::with_capacity(frames.len());
        for frame in &frames {
            positions.push(self.write_locked(&mut active, frame)?);
        }
        Ok(positions)
    }

    /// Append a record whose body carries its own log position.
    ///
    /// `build` receives the position the record will actually land at,
    /// *after* any chunk roll: a frame that does not fit the remaining
    /// window lands at the next chunk boundary, not at the current writer
    /// position. Re-encoding with a different position value cannot change
    /// the frame length, since positions are fixed-width fields.
    pub fn append_with_position<F>(&self, build: F) -> Result<LogPosition>
    where
        F: Fn(LogPosition) -> LogRecord,
    {
        let mut active = self.active.lock();

        let tentative = LogPosition(active.number * self.chunk_capacity + active.used);
        let mut frame = encode_frame(&build(tentative));
        self.check_capacity(frame.len() as u64)?;

        if frame.len() as u64 > self.chunk_capacity - active.used {
            let rolled = LogPosition((active.number + 1) * self.chunk_capacity);
            let refit = encode_frame(&build(rolled));
            debug_assert_eq!(refit.len(), frame.len());
            frame = refit;
        }
        self.write_locked(&mut active, &frame)
    }

    fn check_capacity(&self, frame_len: u64) -> Result<()> {
        if frame_len > self.chunk_capacity {
            return Err(Error::InvalidOperation(format!(
                "record frame of {frame_len} bytes exceeds chunk capacity {}",
                self.chunk_capacity
            )));
        }
        Ok(())
    }

    fn write_locked(&self, active: &mut ActiveChunk, frame: &[u8]) -> Result<LogPosition> {
        let frame_len = frame.len() as u64;
        if frame_len > self.chunk_capacity - active.used {
            self.roll(active)?;
        }

        let position = active.number * self.chunk_capacity + active.used;
        let offset = active.used;
        active.chunk.write_frame(offset, frame)?;
        active.used += frame_len;
        self.writer_chk
            .set(active.number * self.chunk_capacity + active.used);

        Ok(LogPosition(position))
    }

    /// Seal the active chunk and open the next one.
    fn roll(&self, active: &mut ActiveChunk) -> Result<()> {
        let remaining = self.chunk_capacity - active.used;
        if remaining >= MIN_FRAME_SIZE {
            let padding = encode_padding_frame(remaining);
            let offset = active.used;
            active.chunk.write_frame(offset, &padding)?;
            active.used += remaining;
        }
        active.chunk.sync()?;

        let next = active.number + 1;
        info!(sealed_chunk = active.number, next_chunk = next, "chunk sealed");
        active.chunk = ChunkFile::create(&self.dir, next, self.chunk_capacity)?;
        active.number = next;
        active.used = 0;
        // Skipped tail bytes (window too small for a padding frame) still
        // consume address space: the writer position jumps to the boundary.
        self.writer_chk.set(next * self.chunk_capacity);
        Ok(())
    }

    /// Read the record at an absolute log position.
    ///
    /// Fails with `PositionNotFound` past the writer checkpoint or when the
    /// position does not land on a record start.
    pub fn read(&self, position: LogPosition) -> Result<LogRecord> {
        if position.raw() >= self.writer_chk.get() {
            return Err(Error::PositionNotFound(position.raw()));
        }

        let number = position.raw() / self.chunk_capacity;
        let offset = position.raw() % self.chunk_capacity;
        let mut chunk = ChunkFile::open(&self.dir, number, self.chunk_capacity, false)?;

        match chunk.read_frame(offset)? {
            FrameRead::Record { record, .. } => Ok(record),
            FrameRead::Padding { .. } | FrameRead::End => {
                Err(Error::PositionNotFound(position.raw()))
            }
            FrameRead::Torn => Err(Error::Corruption(format!(
                "unreadable record below writer checkpoint at position {position}"
            ))),
        }
    }

    /// Force durability of all appends and advance the commit checkpoint.
    pub fn flush(&self) -> Result<()> {
        let active = self.active.lock();
        active.chunk.sync()?;
        self.commit_chk.set(self.writer_chk.get());
        self.writer_chk.flush()?;
        self.commit_chk.flush()?;
        Ok(())
    }

    /// Next free log position.
    pub fn writer_position(&self) -> u64 {
        self.writer_chk.get()
    }

    /// Last durable, reader-visible position.
    pub fn commit_position(&self) -> u64 {
        self.commit_chk.get()
    }

    /// Bytes discarded by tail repair during `open()`.
    pub fn repaired_bytes(&self) -> u64 {
        self.repaired_bytes
    }

    /// Sequence number of the chunk currently accepting writes.
    pub fn active_chunk_number(&self) -> u64 {
        self.active.lock().number
    }

    /// Configured logical window size per chunk.
    pub fn chunk_capacity(&self) -> u64 {
        self.chunk_capacity
    }

    /// Log directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tributary_core::{EpochRecord, EventRecord};
    use uuid::Uuid;

    fn event(stream: &str, n: i64, payload: &[u8]) -> LogRecord {
        LogRecord::Event(EventRecord {
            stream: stream.to_string(),
            event_number: n,
            event_type: "test".to_string(),
            data: payload.to_vec(),
            metadata: Vec::new(),
        })
    }

    #[test]
    fn test_append_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 64 * 1024).unwrap();

        let record = event("acct-1", 0, b"hello");
        let pos = log.append(&record).unwrap();
        assert_eq!(log.read(pos).unwrap(), record);
    }

    #[test]
    fn test_read_past_writer_checkpoint_is_not_found() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 64 * 1024).unwrap();
        log.append(&event("s", 0, b"x")).unwrap();

        let err = log.read(LogPosition(1 << 40)).unwrap_err();
        assert!(matches!(err, Error::PositionNotFound(_)));
    }

    #[test]
    fn test_rollover_keeps_records_readable() {
        let dir = TempDir::new().unwrap();
        // Tiny capacity forces several rollovers.
        let log = ChunkedLog::open(dir.path(), 256).unwrap();

        let mut positions = Vec::new();
        for i in 0..40i64 {
            let record = event("s", i, &[i as u8; 24]);
            positions.push((log.append(&record).unwrap(), record));
        }
        assert!(log.active_chunk_number() > 0, "expected at least one roll");

        for (pos, record) in positions {
            assert_eq!(log.read(pos).unwrap(), record);
        }
    }

    #[test]
    fn test_record_never_spans_chunks() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 256).unwrap();

        for i in 0..40i64 {
            let pos = log.append(&event("s", i, &[0u8; 24])).unwrap();
            let chunk_of_start = pos.raw() / 256;
            let chunk_of_end = (log.writer_position() - 1) / 256;
            assert_eq!(chunk_of_start, chunk_of_end);
        }
    }

    #[test]
    fn test_oversized_record_is_rejected() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 128).unwrap();
        let err = log.append(&event("s", 0, &[0u8; 4096])).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
    }

    #[test]
    fn test_unflushed_tail_is_discarded_on_reopen() {
        let dir = TempDir::new().unwrap();
        let committed;
        {
            let log = ChunkedLog::open(dir.path(), 64 * 1024).unwrap();
            committed = log.append(&event("s", 0, b"durable")).unwrap();
            log.flush().unwrap();
            log.append(&event("s", 1, b"lost")).unwrap();
            // no flush before "crash"
        }

        let log = ChunkedLog::open(dir.path(), 64 * 1024).unwrap();
        assert!(log.repaired_bytes() > 0);
        assert_eq!(log.read(committed).unwrap(), event("s", 0, b"durable"));
        assert_eq!(log.writer_position(), log.commit_position());
    }

    #[test]
    fn test_rejected_batch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 256).unwrap();

        // Second frame can never fit a 256-byte chunk.
        let batch = [event("s", 0, b"ok"), event("s", 1, &[0u8; 512])];
        let err = log.append_batch(&batch).unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));
        assert_eq!(log.writer_position(), 0, "no prefix of the batch may land");

        let pos = log.append(&event("s", 0, b"ok")).unwrap();
        assert_eq!(pos, LogPosition(0));
    }

    #[test]
    fn test_batch_appends_in_order() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 64 * 1024).unwrap();

        let batch = [
            event("s", 0, b"a"),
            event("s", 1, b"b"),
            event("s", 2, b"c"),
        ];
        let positions = log.append_batch(&batch).unwrap();
        assert_eq!(positions.len(), 3);
        assert!(positions[0] < positions[1] && positions[1] < positions[2]);
        for (pos, record) in positions.iter().zip(&batch) {
            assert_eq!(log.read(*pos).unwrap(), *record);
        }
    }

    #[test]
    fn test_append_with_position_sees_the_post_roll_position() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 128).unwrap();
        // Leave the active chunk with less room than an epoch frame needs.
        log.append(&event("s", 0, &[0u8; 57])).unwrap();

        let pos = log
            .append_with_position(|p| {
                LogRecord::Epoch(EpochRecord {
                    epoch_id: Uuid::nil(),
                    epoch_number: 0,
                    log_position: p.raw(),
                })
            })
            .unwrap();
        assert_eq!(pos.raw(), 128, "frame must land at the next chunk boundary");

        match log.read(pos).unwrap() {
            LogRecord::Epoch(e) => assert_eq!(e.log_position, pos.raw()),
            other => panic!("expected epoch record, got {other:?}"),
        }
    }

    #[test]
    fn test_flush_advances_commit_checkpoint() {
        let dir = TempDir::new().unwrap();
        let log = ChunkedLog::open(dir.path(), 64 * 1024).unwrap();
        log.append(&event("s", 0, b"x")).unwrap();
        assert!(log.commit_position() < log.writer_position());
        log.flush().unwrap();
        assert_eq!(log.commit_position(), log.writer_position());
    }
}
