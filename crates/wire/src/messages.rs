//! Request and completion payload codecs.
//!
//! Payload layouts (all integers little-endian):
//!
//! - `WriteEvents`: `stream(u16-len str) + expected_version(i64) +
//!   event_count(u16) + events + require_leader(u8)`, each event being
//!   `event_type(u16-len str) + data(u32-len bytes) + metadata(u32-len
//!   bytes)`.
//! - `WriteEventsCompleted`: `result(u8) + first_event_number(i64)`.
//! - `ReadEvent`: `stream(u16-len str) + event_number(i64) +
//!   resolve_link_tos(u8)`.
//! - `ReadEventCompleted`: `result(u8) + event_type(u16-len str) +
//!   data(u32-len bytes)`.
//!
//! Result codes round-trip through `u8` with a fallible decode: an
//! unrecognized code is a `MalformedPayload` error, not an
//! unreachable-code panic.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use tributary_core::{Error, EventData, Result};

/// Typed result of a write request on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationResult {
    /// Write committed
    Success = 0,
    /// Preparing the write timed out; it may or may not have been applied
    PrepareTimeout = 1,
    /// Committing the write timed out; it may or may not have been applied
    CommitTimeout = 2,
    /// Forwarding to the write coordinator timed out
    ForwardTimeout = 3,
    /// Expected version did not match the stream head
    WrongExpectedVersion = 4,
    /// The stream has been deleted
    StreamDeleted = 5,
}

impl OperationResult {
    /// Decode a result code byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(OperationResult::Success),
            1 => Ok(OperationResult::PrepareTimeout),
            2 => Ok(OperationResult::CommitTimeout),
            3 => Ok(OperationResult::ForwardTimeout),
            4 => Ok(OperationResult::WrongExpectedVersion),
            5 => Ok(OperationResult::StreamDeleted),
            other => Err(Error::MalformedPayload(format!(
                "unknown operation result code {other}"
            ))),
        }
    }
}

/// Typed result of a point read on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadEventResult {
    /// Event found
    Success = 0,
    /// Version beyond the stream head
    NotFound = 1,
    /// Stream has never been written
    NoStream = 2,
    /// Stream has been deleted
    StreamDeleted = 3,
}

impl ReadEventResult {
    /// Decode a result code byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(ReadEventResult::Success),
            1 => Ok(ReadEventResult::NotFound),
            2 => Ok(ReadEventResult::NoStream),
            3 => Ok(ReadEventResult::StreamDeleted),
            other => Err(Error::MalformedPayload(format!(
                "unknown read result code {other}"
            ))),
        }
    }
}

/// Append a batch of events to a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvents {
    /// Target stream
    pub stream: String,
    /// Expected-version assertion (-1: stream must not exist)
    pub expected_version: i64,
    /// Events to append, in order
    pub events: Vec<EventData>,
    /// Whether the request must be served by the leader node
    pub require_leader: bool,
}

impl WriteEvents {
    /// Serialize the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        write_short_string(&mut buf, &self.stream);
        buf.extend_from_slice(&self.expected_version.to_le_bytes());
        buf.extend_from_slice(&(self.events.len() as u16).to_le_bytes());
        for event in &self.events {
            write_short_string(&mut buf, &event.event_type);
            write_blob(&mut buf, &event.data);
            write_blob(&mut buf, &event.metadata);
        }
        buf.push(self.require_leader as u8);
        buf
    }

    /// Deserialize the payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let stream = read_short_string(&mut cur)?;
        let expected_version = read_i64(&mut cur)?;
        let event_count = cur
            .read_u16::<LittleEndian>()
            .map_err(|_| truncated("event count"))? as usize;
        let mut events = Vec::with_capacity(event_count.min(1024));
        for _ in 0..event_count {
            let event_type = read_short_string(&mut cur)?;
            let data = read_blob(&mut cur)?;
            let metadata = read_blob(&mut cur)?;
            events.push(EventData {
                event_type,
                data,
                metadata,
            });
        }
        let require_leader = read_bool(&mut cur)?;
        Ok(WriteEvents {
            stream,
            expected_version,
            events,
            require_leader,
        })
    }
}

/// Completion of a `WriteEvents` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEventsCompleted {
    /// Outcome code
    pub result: OperationResult,
    /// Version of the first appended event; -1 unless `Success`
    pub first_event_number: i64,
}

impl WriteEventsCompleted {
    /// Serialize the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9);
        buf.push(self.result as u8);
        buf.extend_from_slice(&self.first_event_number.to_le_bytes());
        buf
    }

    /// Deserialize the payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let result = OperationResult::from_u8(read_u8(&mut cur)?)?;
        let first_event_number = read_i64(&mut cur)?;
        Ok(WriteEventsCompleted {
            result,
            first_event_number,
        })
    }
}

/// Read one event by stream and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEvent {
    /// Target stream
    pub stream: String,
    /// Version to read
    pub event_number: i64,
    /// Whether link events should be resolved to their targets
    pub resolve_link_tos: bool,
}

impl ReadEvent {
    /// Serialize the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        write_short_string(&mut buf, &self.stream);
        buf.extend_from_slice(&self.event_number.to_le_bytes());
        buf.push(self.resolve_link_tos as u8);
        buf
    }

    /// Deserialize the payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let stream = read_short_string(&mut cur)?;
        let event_number = read_i64(&mut cur)?;
        let resolve_link_tos = read_bool(&mut cur)?;
        Ok(ReadEvent {
            stream,
            event_number,
            resolve_link_tos,
        })
    }
}

/// Completion of a `ReadEvent` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEventCompleted {
    /// Outcome code
    pub result: ReadEventResult,
    /// Event type; empty unless `Success`
    pub event_type: String,
    /// Event payload bytes; empty unless `Success`
    pub data: Vec<u8>,
}

impl ReadEventCompleted {
    /// Serialize the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.data.len());
        buf.push(self.result as u8);
        write_short_string(&mut buf, &self.event_type);
        write_blob(&mut buf, &self.data);
        buf
    }

    /// Deserialize the payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let result = ReadEventResult::from_u8(read_u8(&mut cur)?)?;
        let event_type = read_short_string(&mut cur)?;
        let data = read_blob(&mut cur)?;
        Ok(ReadEventCompleted {
            result,
            event_type,
            data,
        })
    }
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

fn read_u8(cur: &mut Cursor<&[u8]>) -> Result<u8> {
    cur.read_u8().map_err(|_| truncated("byte"))
}

fn read_bool(cur: &mut Cursor<&[u8]>) -> Result<bool> {
    Ok(read_u8(cur)? != 0)
}

fn read_i64(cur: &mut Cursor<&[u8]>) -> Result<i64> {
    cur.read_i64::<LittleEndian>()
        .map_err(|_| truncated("integer"))
}

fn read_short_string(cur: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cur
        .read_u16::<LittleEndian>()
        .map_err(|_| truncated("string length"))? as usize;
    let mut bytes = vec![0u8; len];
    cur.read_exact(&mut bytes)
        .map_err(|_| truncated("string bytes"))?;
    String::from_utf8(bytes).map_err(|_| Error::MalformedPayload("string is not UTF-8".to_string()))
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
    Error::MalformedPayload(format!("payload truncated reading {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_write_events_roundtrip() {
        let msg = WriteEvents {
            stream: "acct-1".to_string(),
            expected_version: -1,
            events: vec![
                EventData::new("Deposit", b"{\"amount\":100}".to_vec()),
                EventData {
                    event_type: "Withdraw".to_string(),
                    data: b"{\"amount\":30}".to_vec(),
                    metadata: b"trace=7".to_vec(),
                },
            ],
            require_leader: true,
        };
        assert_eq!(WriteEvents::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_read_event_roundtrip() {
        let msg = ReadEvent {
            stream: "acct-1".to_string(),
            event_number: 42,
            resolve_link_tos: false,
        };
        assert_eq!(ReadEvent::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_completions_roundtrip() {
        let write = WriteEventsCompleted {
            result: OperationResult::WrongExpectedVersion,
            first_event_number: -1,
        };
        assert_eq!(WriteEventsCompleted::decode(&write.encode()).unwrap(), write);

        let read = ReadEventCompleted {
            result: ReadEventResult::Success,
            event_type: "Deposit".to_string(),
            data: b"bytes".to_vec(),
        };
        assert_eq!(ReadEventCompleted::decode(&read.encode()).unwrap(), read);
    }

    #[test]
    fn test_unknown_result_code_is_decoding_failure() {
        let mut payload = WriteEventsCompleted {
            result: OperationResult::Success,
            first_event_number: 0,
        }
        .encode();
        payload[0] = 0xEE;
        let err = WriteEventsCompleted::decode(&payload).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }

    #[test]
    fn test_truncated_write_events_is_error() {
        let msg = WriteEvents {
            stream: "s".to_string(),
            expected_version: 0,
            events: vec![EventData::new("t", b"d".to_vec())],
            require_leader: false,
        };
        let encoded = msg.encode();
        for cut in 0..encoded.len() {
            assert!(
                WriteEvents::decode(&encoded[..cut]).is_err(),
                "decode succeeded on {cut}-byte prefix"
            );
        }
    }

    proptest! {
        // Decoding must never panic or overallocate, whatever bytes arrive.
        #[test]
        fn prop_decode_arbitrary_bytes_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = WriteEvents::decode(&payload);
            let _ = WriteEventsCompleted::decode(&payload);
            let _ = ReadEvent::decode(&payload);
            let _ = ReadEventCompleted::decode(&payload);
        }
    }
}
