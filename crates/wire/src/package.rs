//! Length-prefixed binary package framing.
//!
//! Every message on the wire is one package:
//!
//! ```text
//! [length: u32 LE, of the remainder]
//! [command: u8][flags: u8][correlation_id: 16 bytes][payload: bytes]
//! ```
//!
//! Responses are matched to requests purely by correlation id; they may
//! arrive out of order relative to requests. An unrecognized command byte
//! decodes to a distinct error, never an unreachable-code panic, so a
//! newer peer cannot crash an older node.

use std::io::{Read, Write};
use tributary_core::{Error, Result};
use uuid::Uuid;

/// Bytes of package content ahead of the payload: command + flags + id.
pub const PACKAGE_PREFIX: usize = 18;

/// Upper bound on a package body; larger frames are treated as corruption.
pub const MAX_PACKAGE_SIZE: usize = 16 * 1024 * 1024;

/// Protocol command bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Client → server: append events to a stream
    WriteEvents = 0x82,
    /// Server → client: write completion
    WriteEventsCompleted = 0x83,
    /// Client → server: read one event
    ReadEvent = 0xB0,
    /// Server → client: read completion
    ReadEventCompleted = 0xB1,
}

impl Command {
    /// Decode a command byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x82 => Ok(Command::WriteEvents),
            0x83 => Ok(Command::WriteEventsCompleted),
            0xB0 => Ok(Command::ReadEvent),
            0xB1 => Ok(Command::ReadEventCompleted),
            other => Err(Error::UnknownCommand(other)),
        }
    }
}

/// One framed protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Command discriminator
    pub command: Command,
    /// Reserved flag bits (authentication etc.); zero in this core
    pub flags: u8,
    /// Opaque id pairing this package with its eventual completion
    pub correlation_id: Uuid,
    /// Command-specific payload
    pub payload: Vec<u8>,
}

impl Package {
    /// Build a package with zeroed flags.
    pub fn new(command: Command, correlation_id: Uuid, payload: Vec<u8>) -> Self {
        Package {
            command,
            flags: 0,
            correlation_id,
            payload,
        }
    }

    /// Serialize with the length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let body_len = PACKAGE_PREFIX + self.payload.len();
        let mut buf = Vec::with_capacity(4 + body_len);
        buf.extend_from_slice(&(body_len as u32).to_le_bytes());
        buf.push(self.command as u8);
        buf.push(self.flags);
        buf.extend_from_slice(self.correlation_id.as_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Write the framed package to a stream.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode())?;
        writer.flush()?;
        Ok(())
    }

    /// Read one framed package from a stream.
    ///
    /// Returns `Ok(None)` on a clean EOF at a frame boundary; EOF mid-frame
    /// is an I/O error (the peer died mid-send).
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Package>> {
        let mut len_bytes = [0u8; 4];
        match read_full(reader, &mut len_bytes)? {
            ReadFull::Eof => return Ok(None),
            ReadFull::Complete => {}
        }

        let len = u32::from_le_bytes(len_bytes) as usize;
        if len < PACKAGE_PREFIX {
            return Err(Error::Corruption(format!(
                "package length {len} is shorter than the fixed prefix"
            )));
        }
        if len > MAX_PACKAGE_SIZE {
            return Err(Error::Corruption(format!(
                "package length {len} exceeds the {MAX_PACKAGE_SIZE}-byte limit"
            )));
        }

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;

        let command = Command::from_u8(body[0])?;
        let flags = body[1];
        let correlation_id = Uuid::from_bytes(
            body[2..18]
                .try_into()
                .expect("prefix length checked above"),
        );
        let payload = body[PACKAGE_PREFIX..].to_vec();

        Ok(Some(Package {
            command,
            flags,
            correlation_id,
            payload,
        }))
    }
}

enum ReadFull {
    Complete,
    Eof,
}

/// Read exactly `buf.len()` bytes, reporting a clean EOF only when zero
/// bytes were available.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<ReadFull> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(ReadFull::Eof);
            }
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "package frame truncated",
            )));
        }
        filled += n;
    }
    Ok(ReadFull::Complete)
}
