//! Durable log-position checkpoints.
//!
//! A checkpoint is a single `u64` log position persisted in its own small
//! file. The store keeps two: the writer checkpoint (last appended byte)
//! and the commit checkpoint (last byte guaranteed durable and visible to
//! readers). Both survive restarts and locate the true log tail during
//! recovery.
//!
//! # Binary Format (16 bytes)
//!
//! ```text
//! magic("TBCK", 4) + value(8, LE) + crc32(4, over first 12 bytes) = 16 bytes
//! ```
//!
//! The value is updated in memory on every append and persisted in place on
//! `flush()`. A missing file means a fresh store (position 0); a corrupt
//! file is a fatal open error, since the log tail cannot be located without
//! it.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tributary_core::{Error, Result};

/// Magic bytes for checkpoint files.
pub const CHECKPOINT_MAGIC: &[u8; 4] = b"TBCK";

/// Total size of a serialized checkpoint in bytes.
pub const CHECKPOINT_SIZE: usize = 16;

/// A durable scalar log-position marker.
///
/// `set()` is cheap (atomic store); `flush()` persists the current value
/// with an in-place write and fsync. Reads of the in-memory value never
/// touch disk.
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    value: AtomicU64,
    file: Mutex<File>,
}

impl Checkpoint {
    /// Open a checkpoint file, creating it at position 0 if absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let exists = path.exists();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let value = if exists {
            Self::read_value(&mut file, &path)?
        } else {
            write_value(&mut file, 0)?;
            0
        };

        Ok(Checkpoint {
            path,
            value: AtomicU64::new(value),
            file: Mutex::new(file),
        })
    }

    fn read_value(file: &mut File, path: &Path) -> Result<u64> {
        let mut buf = [0u8; CHECKPOINT_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf).map_err(|_| {
            Error::Corruption(format!("checkpoint file {} is truncated", path.display()))
        })?;

        if &buf[0..4] != CHECKPOINT_MAGIC {
            return Err(Error::Corruption(format!(
                "checkpoint file {} has bad magic",
                path.display()
            )));
        }

        let stored_crc = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let actual_crc = crc32fast::hash(&buf[0..12]);
        if stored_crc != actual_crc {
            return Err(Error::Corruption(format!(
                "checkpoint file {} failed CRC check",
                path.display()
            )));
        }

        Ok(u64::from_le_bytes([
            buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
        ]))
    }

    /// Current in-memory value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Update the in-memory value. Not durable until `flush()`.
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Release);
    }

    /// Persist the current value with an fsync.
    pub fn flush(&self) -> Result<()> {
        let mut file = self.file.lock();
        write_value(&mut file, self.get())?;
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_value(file: &mut File, value: u64) -> Result<()> {
    let mut buf = [0u8; CHECKPOINT_SIZE];
    buf[0..4].copy_from_slice(CHECKPOINT_MAGIC);
    buf[4..12].copy_from_slice(&value.to_le_bytes());
    let crc = crc32fast::hash(&buf[0..12]);
    buf[12..16].copy_from_slice(&crc.to_le_bytes());

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&buf)?;
    file.sync_data()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_checkpoint_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let chk = Checkpoint::open(dir.path().join("writer.chk")).unwrap();
        assert_eq!(chk.get(), 0);
    }

    #[test]
    fn test_value_survives_reopen_after_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("commit.chk");

        {
            let chk = Checkpoint::open(&path).unwrap();
            chk.set(4096);
            chk.flush().unwrap();
        }

        let chk = Checkpoint::open(&path).unwrap();
        assert_eq!(chk.get(), 4096);
    }

    #[test]
    fn test_unflushed_value_is_lost_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("writer.chk");

        {
            let chk = Checkpoint::open(&path).unwrap();
            chk.set(777);
            // no flush
        }

        let chk = Checkpoint::open(&path).unwrap();
        assert_eq!(chk.get(), 0);
    }

    #[test]
    fn test_corrupt_checkpoint_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("writer.chk");
        std::fs::write(&path, b"garbage bytes here").unwrap();

        let err = Checkpoint::open(&path).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }
}
