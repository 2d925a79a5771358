//! Chunk files: fixed-capacity segments of the transaction log.
//!
//! The log is a sequence of chunk files named `chunk-NNNNNN.trc`, ordered
//! by sequence number. Exactly one chunk accepts writes at a time; sealed
//! chunks are immutable. Each file starts with a 32-byte header:
//!
//! ```text
//! magic("TBCH", 4) + version(4) + chunk_number(8) + capacity(8)
//! + reserved(8) = 32 bytes
//! ```
//!
//! The capacity is the size of the chunk's *logical address window*: a
//! record appended at in-chunk offset `o` of chunk `n` has absolute log
//! position `n * capacity + o`. The header lives outside the window, so
//! file offsets are always `CHUNK_HEADER_SIZE + o`. Record frames never
//! span chunks; a frame that would overflow the window forces an early
//! seal with padding.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tributary_core::{Error, Result};

use crate::record::{decode_payload, LogRecord, FRAME_OVERHEAD, MIN_FRAME_SIZE};

/// Magic bytes for chunk files.
pub const CHUNK_MAGIC: &[u8; 4] = b"TBCH";

/// Current chunk format version.
pub const CHUNK_FORMAT_VERSION: u32 = 1;

/// Size of the chunk file header in bytes.
pub const CHUNK_HEADER_SIZE: u64 = 32;

/// File name for a chunk with the given sequence number.
pub fn chunk_file_name(number: u64) -> String {
    format!("chunk-{number:06}.trc")
}

/// Full path of a chunk file inside the log directory.
pub fn chunk_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(chunk_file_name(number))
}

/// Outcome of reading one frame at an in-chunk offset.
#[derive(Debug)]
pub enum FrameRead {
    /// A complete, CRC-valid record
    Record {
        /// The decoded record
        record: LogRecord,
        /// In-chunk offset of the next frame
        next_offset: u64,
    },
    /// A padding frame; the rest of the chunk window holds no records
    Padding {
        /// In-chunk offset just past the padding
        next_offset: u64,
    },
    /// No more data: window exhausted or file ends at a frame boundary
    End,
    /// Bytes present but not a valid frame (partial write or corruption)
    Torn,
}

/// An open chunk file.
#[derive(Debug)]
pub struct ChunkFile {
    file: File,
    number: u64,
    capacity: u64,
}

impl ChunkFile {
    /// Create a fresh chunk file with a synced header.
    pub fn create(dir: &Path, number: u64, capacity: u64) -> Result<Self> {
        let path = chunk_path(dir, number);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        let mut header = [0u8; CHUNK_HEADER_SIZE as usize];
        header[0..4].copy_from_slice(CHUNK_MAGIC);
        header[4..8].copy_from_slice(&CHUNK_FORMAT_VERSION.to_le_bytes());
        header[8..16].copy_from_slice(&number.to_le_bytes());
        header[16..24].copy_from_slice(&capacity.to_le_bytes());
        file.write_all(&header)?;
        file.sync_all()?;

        Ok(ChunkFile {
            file,
            number,
            capacity,
        })
    }

    /// Open an existing chunk file, validating its header.
    pub fn open(dir: &Path, number: u64, capacity: u64, writable: bool) -> Result<Self> {
        let path = chunk_path(dir, number);
        let mut file = OpenOptions::new().read(true).write(writable).open(&path)?;

        let mut header = [0u8; CHUNK_HEADER_SIZE as usize];
        file.read_exact(&mut header).map_err(|_| {
            Error::Corruption(format!("chunk file {} has truncated header", path.display()))
        })?;

        if &header[0..4] != CHUNK_MAGIC {
            return Err(Error::Corruption(format!(
                "chunk file {} has bad magic",
                path.display()
            )));
        }
        let version = u32::from_le_bytes(header[4..8].try_into().expect("slice is 4 bytes"));
        if version != CHUNK_FORMAT_VERSION {
            return Err(Error::Corruption(format!(
                "chunk file {} has unsupported format version {version}",
                path.display()
            )));
        }
        let stored_number = u64::from_le_bytes(header[8..16].try_into().expect("slice is 8 bytes"));
        let stored_capacity =
            u64::from_le_bytes(header[16..24].try_into().expect("slice is 8 bytes"));
        if stored_number != number || stored_capacity != capacity {
            return Err(Error::Corruption(format!(
                "chunk file {} header mismatch: number {stored_number}, capacity {stored_capacity}",
                path.display()
            )));
        }

        Ok(ChunkFile {
            file,
            number,
            capacity,
        })
    }

    /// Chunk sequence number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Logical window size in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes written inside the logical window.
    pub fn used_bytes(&self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        Ok(len.saturating_sub(CHUNK_HEADER_SIZE))
    }

    /// Write a complete frame at the given in-chunk offset.
    pub fn write_frame(&mut self, offset: u64, frame: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(CHUNK_HEADER_SIZE + offset))?;
        self.file.write_all(frame)?;
        Ok(())
    }

    /// Force written frames to durable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Discard everything past `used` bytes of the logical window.
    pub fn truncate_to(&mut self, used: u64) -> Result<()> {
        self.file.set_len(CHUNK_HEADER_SIZE + used)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Read and validate one frame at an in-chunk offset.
    ///
    /// Distinguishes a clean end of data (`End`), skippable padding, and a
    /// torn or corrupt frame (`Torn`). The caller decides whether `Torn`
    /// means a truncatable tail or fatal corruption based on where the
    /// offset lies relative to the commit checkpoint.
    pub fn read_frame(&mut self, offset: u64) -> Result<FrameRead> {
        if offset + MIN_FRAME_SIZE > self.capacity {
            return Ok(FrameRead::End);
        }
        let used = self.used_bytes()?;
        if offset >= used {
            return Ok(FrameRead::End);
        }
        if offset + FRAME_OVERHEAD > used {
            return Ok(FrameRead::Torn);
        }

        let mut header = [0u8; FRAME_OVERHEAD as usize];
        self.file
            .seek(SeekFrom::Start(CHUNK_HEADER_SIZE + offset))?;
        self.file.read_exact(&mut header)?;

        let len = u32::from_le_bytes(header[0..4].try_into().expect("slice is 4 bytes")) as u64;
        let expected_crc = u32::from_le_bytes(header[4..8].try_into().expect("slice is 4 bytes"));

        if len == 0
            || offset + FRAME_OVERHEAD + len > self.capacity
            || offset + FRAME_OVERHEAD + len > used
        {
            return Ok(FrameRead::Torn);
        }

        let mut payload = vec![0u8; len as usize];
        self.file.read_exact(&mut payload)?;
        if crc32fast::hash(&payload) != expected_crc {
            return Ok(FrameRead::Torn);
        }

        let next_offset = offset + FRAME_OVERHEAD + len;
        match decode_payload(&payload) {
            Ok(Some(record)) => Ok(FrameRead::Record {
                record,
                next_offset,
            }),
            Ok(None) => Ok(FrameRead::Padding { next_offset }),
            // CRC was valid but the payload does not decode: still treated
            // as a torn frame so recovery can classify it by position.
            Err(_) => Ok(FrameRead::Torn),
        }
    }
}
