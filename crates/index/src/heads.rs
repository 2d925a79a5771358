//! Stream head index with per-stream mutual exclusion.
//!
//! Maps a stream name to its current head (last committed event number),
//! the log position of every committed version, and a deletion tombstone
//! flag. Mutation goes exclusively through the reserve/commit/rollback
//! protocol:
//!
//! 1. `try_reserve` atomically checks the caller's expected version against
//!    the head and provisionally claims the next version(s);
//! 2. the write coordinator appends to the log;
//! 3. `commit` finalizes the reservation, or `rollback` restores the entry
//!    to exactly its prior observable state — a failed write never burns a
//!    version.
//!
//! Entries live in a `DashMap`, so unrelated streams never contend: the
//! check-and-reserve holds only the shard guard for the one entry being
//! mutated. While a reservation is pending, competing writers are checked
//! against the *provisional* head and fail fast with WrongExpectedVersion
//! instead of blocking on the winner's log append.

use dashmap::DashMap;
use tracing::debug;
use tributary_core::{Error, LogPosition, Result, EXPECTED_NO_STREAM};

/// Observable head state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Head {
    /// Stream exists; last committed event number
    At(i64),
    /// Stream has never been written
    Absent,
    /// Stream has been deleted
    Deleted,
}

#[derive(Debug)]
struct Entry {
    /// Last committed event number; -1 while only a reservation exists
    head: i64,
    /// Pending reservation: first version and count
    reserved: Option<(i64, usize)>,
    /// Log position of each committed version, indexed by event number
    positions: Vec<u64>,
    /// Deletion tombstone
    deleted: bool,
}

impl Default for Entry {
    fn default() -> Self {
        Entry {
            head: -1,
            reserved: None,
            positions: Vec::new(),
            deleted: false,
        }
    }
}

impl Entry {
    /// Head as seen by a competing reservation attempt.
    fn provisional_head(&self) -> i64 {
        match self.reserved {
            Some((first, count)) => first + count as i64 - 1,
            None => self.head,
        }
    }
}

/// In-memory index of stream heads, rebuilt from the log at startup.
#[derive(Default)]
pub struct StreamHeadIndex {
    entries: DashMap<String, Entry>,
}

impl StreamHeadIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one stream from recovered state. Startup only.
    pub fn restore(&self, stream: &str, head: i64, positions: Vec<u64>, deleted: bool) {
        self.entries.insert(
            stream.to_string(),
            Entry {
                head,
                reserved: None,
                positions,
                deleted,
            },
        );
    }

    /// Atomically check `expected` against the head and reserve the next
    /// `count` versions.
    ///
    /// Returns the first reserved version. `expected == -1` asserts the
    /// stream must not exist; against an existing stream that fails with
    /// WrongExpectedVersion specifically, so callers can distinguish
    /// "already created" from other races.
    pub fn try_reserve(&self, stream: &str, expected: i64, count: usize) -> Result<i64> {
        debug_assert!(count > 0);
        let mut entry = self.entries.entry(stream.to_string()).or_default();

        if entry.deleted {
            return Err(Error::StreamDeleted(stream.to_string()));
        }
        if entry.reserved.is_some() {
            // A writer is mid-append on this stream; competitors see the
            // provisional head and fail fast.
            return Err(Error::WrongExpectedVersion {
                stream: stream.to_string(),
                expected,
                actual: entry.provisional_head(),
            });
        }

        let actual = entry.head;
        let exists = actual >= 0 || !entry.positions.is_empty();

        let matches = if expected == EXPECTED_NO_STREAM {
            !exists
        } else {
            exists && expected == actual
        };
        if !matches {
            // Clean up the placeholder we may have just inserted.
            let inserted_placeholder = !exists;
            drop(entry);
            if inserted_placeholder {
                self.remove_if_untouched(stream);
            }
            return Err(Error::WrongExpectedVersion {
                stream: stream.to_string(),
                expected,
                actual: if exists { actual } else { EXPECTED_NO_STREAM },
            });
        }

        let first = actual + 1;
        entry.reserved = Some((first, count));
        debug!(stream, first, count, "versions reserved");
        Ok(first)
    }

    /// Finalize a reservation with the log positions of the appended
    /// records.
    ///
    /// Fails with `InvalidOperation` when no reservation is pending or the
    /// position count does not match it; the write path is broken in that
    /// case and must not fabricate a head.
    pub fn commit(&self, stream: &str, positions: &[LogPosition]) -> Result<()> {
        let mut entry = self.entries.get_mut(stream).ok_or_else(|| {
            Error::InvalidOperation(format!("commit for '{stream}' without a reservation"))
        })?;
        let (first, count) = entry.reserved.take().ok_or_else(|| {
            Error::InvalidOperation(format!("commit for '{stream}' without a reservation"))
        })?;
        if positions.len() != count {
            entry.reserved = Some((first, count));
            return Err(Error::InvalidOperation(format!(
                "commit for '{stream}' carries {} positions for {count} reserved versions",
                positions.len()
            )));
        }
        debug_assert_eq!(entry.positions.len() as i64, first);

        for p in positions {
            entry.positions.push(p.raw());
        }
        entry.head = first + count as i64 - 1;
        Ok(())
    }

    /// Undo a reservation, restoring the prior observable state.
    ///
    /// A first-event reservation on a previously absent stream removes the
    /// entry entirely, so the stream reads as Absent again.
    pub fn rollback(&self, stream: &str) {
        let was_virgin = {
            let mut entry = match self.entries.get_mut(stream) {
                Some(e) => e,
                None => return,
            };
            entry.reserved = None;
            entry.head < 0 && entry.positions.is_empty() && !entry.deleted
        };
        if was_virgin {
            self.remove_if_untouched(stream);
        }
    }

    /// Mark a stream deleted. The tombstone itself is committed as a
    /// regular event beforehand, so the flag survives restarts via the
    /// recovery scan.
    pub fn mark_deleted(&self, stream: &str) {
        if let Some(mut entry) = self.entries.get_mut(stream) {
            entry.deleted = true;
        }
    }

    /// Current observable head of a stream.
    pub fn current_head(&self, stream: &str) -> Head {
        match self.entries.get(stream) {
            None => Head::Absent,
            Some(entry) if entry.deleted => Head::Deleted,
            Some(entry) if entry.head < 0 => Head::Absent,
            Some(entry) => Head::At(entry.head),
        }
    }

    /// Log position of a committed version, if it exists.
    pub fn position_of(&self, stream: &str, version: i64) -> Option<LogPosition> {
        if version < 0 {
            return None;
        }
        let entry = self.entries.get(stream)?;
        if entry.deleted {
            return None;
        }
        entry
            .positions
            .get(version as usize)
            .copied()
            .map(LogPosition)
    }

    /// Number of streams with any state.
    pub fn stream_count(&self) -> usize {
        self.entries.len()
    }

    /// Remove an entry that holds no committed state and no reservation.
    fn remove_if_untouched(&self, stream: &str) {
        self.entries.remove_if(stream, |_, e| {
            e.head < 0 && e.reserved.is_none() && e.positions.is_empty() && !e.deleted
        });
    }
}
