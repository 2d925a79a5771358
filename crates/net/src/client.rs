//! Blocking client session with one in-flight request.
//!
//! The session is an explicit state machine:
//!
//! ```text
//! Connecting --connect ok--> Established --close()--> Closed
//!      ^                          |
//!      +------socket error--------+
//! ```
//!
//! Requests are strictly sequential: send one package, wait for the
//! completion carrying the same correlation id. A reply that fails to
//! arrive within the response timeout surfaces as `Timeout`; the
//! connection stays usable only if no reply bytes arrived at all — a
//! timeout mid-frame leaves half a package buffered in the socket, which
//! cannot be resynchronized, so the next request reconnects. A socket
//! error surfaces as `ConnectionLost` and likewise reconnects after a
//! fixed backoff. An in-flight request is always reported failed, never
//! dropped silently.

use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use tributary_core::EventData;
use tributary_wire::{
    Command, Package, ReadEvent, ReadEventCompleted, WriteEvents, WriteEventsCompleted,
};
use uuid::Uuid;

/// Failures surfaced to the session's caller.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `close()` was called; the session will never carry requests again.
    #[error("session is closed")]
    Closed,
    /// No completion arrived within the response timeout. The request may
    /// still have been applied by the server. The connection is kept only
    /// when no reply bytes arrived at all; a partial reply forces the next
    /// request to reconnect.
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// The socket failed; the in-flight request (if any) has unknown fate.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The peer answered with bytes that violate the protocol.
    #[error("protocol violation: {0}")]
    Protocol(#[from] tributary_core::Error),
}

enum State {
    Connecting,
    Established(TcpStream),
    Closed,
}

/// A blocking one-request-at-a-time client session.
pub struct ClientSession {
    addr: SocketAddr,
    state: State,
    response_timeout: Duration,
    reconnect_delay: Duration,
    connect_attempts: u32,
}

impl ClientSession {
    /// Create a session; the first request performs the actual connect.
    pub fn new(addr: SocketAddr) -> ClientSession {
        ClientSession {
            addr,
            state: State::Connecting,
            response_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            connect_attempts: 5,
        }
    }

    /// How long to wait for a completion before reporting `Timeout`.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Fixed sleep between reconnect attempts.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Append events to a stream and wait for the completion.
    pub fn write_events(
        &mut self,
        stream: &str,
        expected_version: i64,
        events: Vec<EventData>,
    ) -> Result<WriteEventsCompleted, SessionError> {
        let request = WriteEvents {
            stream: stream.to_string(),
            expected_version,
            events,
            require_leader: false,
        };
        let reply = self.request(
            Command::WriteEvents,
            request.encode(),
            Command::WriteEventsCompleted,
        )?;
        Ok(WriteEventsCompleted::decode(&reply.payload)?)
    }

    /// Read one event by stream and version and wait for the completion.
    pub fn read_event(
        &mut self,
        stream: &str,
        event_number: i64,
    ) -> Result<ReadEventCompleted, SessionError> {
        let request = ReadEvent {
            stream: stream.to_string(),
            event_number,
            resolve_link_tos: false,
        };
        let reply = self.request(
            Command::ReadEvent,
            request.encode(),
            Command::ReadEventCompleted,
        )?;
        Ok(ReadEventCompleted::decode(&reply.payload)?)
    }

    /// Close the session permanently.
    pub fn close(&mut self) {
        self.state = State::Closed;
    }

    fn request(
        &mut self,
        command: Command,
        payload: Vec<u8>,
        expect: Command,
    ) -> Result<Package, SessionError> {
        let correlation_id = Uuid::new_v4();
        let package = Package::new(command, correlation_id, payload);

        let stream = self.established()?;
        if let Err(e) = package.write_to(stream) {
            warn!(error = %e, "send failed");
            self.state = State::Connecting;
            return Err(SessionError::ConnectionLost(e.to_string()));
        }

        loop {
            let (read, consumed) = match &mut self.state {
                State::Established(stream) => {
                    let mut reader = FrameProgress {
                        inner: stream,
                        consumed: 0,
                    };
                    let read = Package::read_from(&mut reader);
                    (read, reader.consumed)
                }
                _ => return Err(SessionError::ConnectionLost("socket gone".to_string())),
            };
            let reply = match read {
                Ok(Some(reply)) => reply,
                Ok(None) => {
                    self.state = State::Connecting;
                    return Err(SessionError::ConnectionLost(
                        "peer closed the connection".to_string(),
                    ));
                }
                Err(tributary_core::Error::Io(e))
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {
                    if consumed > 0 {
                        // Half a reply is stuck in the socket and cannot be
                        // resynchronized; the next request reconnects.
                        warn!(consumed, "timed out mid-frame, dropping connection");
                        self.state = State::Connecting;
                    }
                    return Err(SessionError::Timeout(self.response_timeout));
                }
                Err(tributary_core::Error::Io(e)) => {
                    self.state = State::Connecting;
                    return Err(SessionError::ConnectionLost(e.to_string()));
                }
                Err(e) => {
                    self.state = State::Connecting;
                    return Err(SessionError::Protocol(e));
                }
            };

            if reply.correlation_id != correlation_id {
                // Completion of an earlier request that already timed out.
                debug!(stale = %reply.correlation_id, "discarding stale completion");
                continue;
            }
            if reply.command != expect {
                self.state = State::Connecting;
                return Err(SessionError::Protocol(
                    tributary_core::Error::InvalidOperation(format!(
                        "expected {expect:?} completion, got {:?}",
                        reply.command
                    )),
                ));
            }
            return Ok(reply);
        }
    }

    /// Hand out the live socket, reconnecting first if necessary.
    fn established(&mut self) -> Result<&mut TcpStream, SessionError> {
        match self.state {
            State::Closed => return Err(SessionError::Closed),
            State::Established(_) => {}
            State::Connecting => {
                let stream = self.connect_with_backoff()?;
                self.state = State::Established(stream);
            }
        }
        match &mut self.state {
            State::Established(stream) => Ok(stream),
            _ => unreachable!("state set above"),
        }
    }

    fn connect_with_backoff(&mut self) -> Result<TcpStream, SessionError> {
        let mut last_error = String::new();
        for attempt in 0..self.connect_attempts {
            if attempt > 0 {
                std::thread::sleep(self.reconnect_delay);
            }
            match TcpStream::connect(self.addr) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.response_timeout))
                        .map_err(|e| SessionError::ConnectionLost(e.to_string()))?;
                    stream
                        .set_nodelay(true)
                        .map_err(|e| SessionError::ConnectionLost(e.to_string()))?;
                    debug!(addr = %self.addr, attempt, "connected");
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(addr = %self.addr, attempt, error = %e, "connect failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(SessionError::ConnectionLost(last_error))
    }
}

/// Counts reply bytes consumed, so a timeout can be classified: on an idle
/// socket the connection is reusable, mid-frame it is not.
struct FrameProgress<'a> {
    inner: &'a mut TcpStream,
    consumed: usize,
}

impl Read for FrameProgress<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n;
        Ok(n)
    }
}

