//! Log record framing and encoding.
//!
//! Every record in a chunk is wrapped in a CRC-protected frame:
//!
//! ```text
//! [len: u32 LE][crc32: u32 LE][tag: u8][body: len-1 bytes]
//! ```
//!
//! `len` covers the tag byte plus the body; the CRC covers the same range.
//! Three tags exist:
//!
//! - `Event` (0x01): a committed stream event
//! - `Epoch` (0x02): per-startup epoch marker
//! - `Padding` (0x00): fills the tail of an early-sealed chunk
//!
//! # Body layouts
//!
//! Event: `stream(u16-len str) + event_number(i64) + event_type(u16-len str)
//! + data(u32-len bytes) + metadata(u32-len bytes)`.
//!
//! Epoch: `epoch_id(16) + epoch_number(i64) + log_position(u64)`.
//!
//! Padding bodies are zero bytes and decode to no record. A CRC mismatch or
//! unknown tag decodes to `Error::Corruption`; whether that is a truncatable
//! torn tail or a fatal error is decided by the recovery scan, not here.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use tributary_core::{EpochRecord, Error, EventRecord, Result};
use uuid::Uuid;

/// Frame tag for padding records.
pub const TAG_PADDING: u8 = 0x00;
/// Frame tag for event records.
pub const TAG_EVENT: u8 = 0x01;
/// Frame tag for epoch records.
pub const TAG_EPOCH: u8 = 0x02;

/// Bytes of frame overhead ahead of the tag: length + CRC.
pub const FRAME_OVERHEAD: u64 = 8;

/// Smallest possible frame: overhead plus a lone tag byte.
pub const MIN_FRAME_SIZE: u64 = FRAME_OVERHEAD + 1;

/// A decoded, typed log record.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    /// A committed stream event
    Event(EventRecord),
    /// A per-startup epoch marker
    Epoch(EpochRecord),
}

impl LogRecord {
    /// Stream name, for event records.
    pub fn stream(&self) -> Option<&str> {
        match self {
            LogRecord::Event(e) => Some(&e.stream),
            LogRecord::Epoch(_) => None,
        }
    }
}

/// Encode a record into a complete CRC-framed byte sequence.
pub fn encode_frame(record: &LogRecord) -> Vec<u8> {
    let mut payload = Vec::with_capacity(64);
    match record {
        LogRecord::Event(event) => {
            payload.push(TAG_EVENT);
            encode_event_body(event, &mut payload);
        }
        LogRecord::Epoch(epoch) => {
            payload.push(TAG_EPOCH);
            encode_epoch_body(epoch, &mut payload);
        }
    }
    frame(payload)
}

/// Encode a padding frame of exactly `total_len` bytes (overhead included).
///
/// The caller guarantees `total_len >= MIN_FRAME_SIZE`.
pub fn encode_padding_frame(total_len: u64) -> Vec<u8> {
    debug_assert!(total_len >= MIN_FRAME_SIZE);
    let body_len = (total_len - FRAME_OVERHEAD) as usize;
    let mut payload = vec![0u8; body_len];
    payload[0] = TAG_PADDING;
    frame(payload)
}

fn frame(payload: Vec<u8>) -> Vec<u8> {
    let crc = crc32fast::hash(&payload);
    let mut buf = Vec::with_capacity(FRAME_OVERHEAD as usize + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(&payload);
    buf
}

fn encode_event_body(event: &EventRecord, out: &mut Vec<u8>) {
    write_short_string(out, &event.stream);
    out.extend_from_slice(&event.event_number.to_le_bytes());
    write_short_string(out, &event.event_type);
    write_blob(out, &event.data);
    write_blob(out, &event.metadata);
}

fn encode_epoch_body(epoch: &EpochRecord, out: &mut Vec<u8>) {
    out.extend_from_slice(epoch.epoch_id.as_bytes());
    out.extend_from_slice(&epoch.epoch_number.to_le_bytes());
    out.extend_from_slice(&epoch.log_position.to_le_bytes());
}

fn write_short_string(out: &mut Vec<u8>, s: &str) {
    debug_assert!(s.len() <= u16::MAX as usize);
    out.extend_from_slice(&(s.len() as u16).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn write_blob(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

/// Decode a CRC-validated frame payload (tag + body).
///
/// Returns `Ok(None)` for padding. The payload must already have passed the
/// CRC check performed by the chunk reader.
pub fn decode_payload(payload: &[u8]) -> Result<Option<LogRecord>> {
    let (tag, body) = payload
        .split_first()
        .ok_or_else(|| Error::Corruption("empty record payload".to_string()))?;

    match *tag {
        TAG_PADDING => Ok(None),
        TAG_EVENT => decode_event_body(body).map(|e| Some(LogRecord::Event(e))),
        TAG_EPOCH => decode_epoch_body(body).map(|e| Some(LogRecord::Epoch(e))),
        other => Err(Error::Corruption(format!(
            "unknown log record tag {other:#04x}"
        ))),
    }
}

fn decode_event_body(body: &[u8]) -> Result<EventRecord> {
    let mut cur = Cursor::new(body);
    let stream = read_short_string(&mut cur)?;
    let event_number = cur
        .read_i64::<LittleEndian>()
        .map_err(|_| truncated("event_number"))?;
    let event_type = read_short_string(&mut cur)?;
    let data = read_blob(&mut cur)?;
    let metadata = read_blob(&mut cur)?;
    Ok(EventRecord {
        stream,
        event_number,
        event_type,
        data,
        metadata,
    })
}

fn decode_epoch_body(body: &[u8]) -> Result<EpochRecord> {
    let mut cur = Cursor::new(body);
    let mut id_bytes = [0u8; 16];
    cur.read_exact(&mut id_bytes)
        .map_err(|_| truncated("epoch_id"))?;
    let epoch_number = cur
        .read_i64::<LittleEndian>()
        .map_err(|_| truncated("epoch_number"))?;
    let log_position = cur
        .read_u64::<LittleEndian>()
        .map_err(|_| truncated("log_position"))?;
    Ok(EpochRecord {
        epoch_id: Uuid::from_bytes(id_bytes),
        epoch_number,
        log_position,
    })
}

fn read_short_string(cur: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cur
        .read_u16::<LittleEndian>()
        .map_err(|_| truncated("string length"))? as usize;
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)
        .map_err(|_| truncated("string bytes"))?;
    String::from_utf8(bytes)
        .map_err(|_| Error::Corruption("record string is not valid UTF-8".to_string()))
}

fn read_blob(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = cur
        .read_u32::<LittleEndian>()
        .map_err(|_| truncated("blob length"))? as usize;
    let remaining = cur.get_ref().len() - cur.position() as usize;
    if len > remaining {
        return Err(truncated("blob bytes"));
    }
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)
        .map_err(|_| truncated("blob bytes"))?;
    Ok(bytes)
}

fn truncated(what: &str) -> Error {
    Error::Corruption(format!("record body truncated reading {what}"))
}
