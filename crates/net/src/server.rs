//! TCP front end: one accept loop, one thread per connection.
//!
//! Each connection thread reads packages, dispatches them against the
//! shared store, and replies with the request's correlation id. Requests
//! on one connection are served in order; connections are independent.
//!
//! A malformed frame (bad length, unknown command, undecodable payload)
//! closes the connection; the store itself is never affected by peer
//! bytes. Internal write failures are reported as `CommitTimeout` — the
//! client cannot know whether the write landed, which is exactly what
//! that code means.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};
use tributary_core::{ReadOutcome, Result, WriteOutcome};
use tributary_engine::EventStore;
use tributary_wire::{
    Command, OperationResult, Package, ReadEvent, ReadEventCompleted, ReadEventResult,
    WriteEvents, WriteEventsCompleted,
};

/// A running TCP server over a shared event store.
pub struct Server {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl Server {
    /// Bind `addr` and start accepting connections on a background thread.
    pub fn start(addr: SocketAddr, store: Arc<EventStore>) -> Result<Server> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));

        let accept_stop = Arc::clone(&stop);
        let accept_thread = std::thread::Builder::new()
            .name("tributary-accept".to_string())
            .spawn(move || accept_loop(listener, store, accept_stop))?;

        info!(addr = %local_addr, "server listening");
        Ok(Server {
            local_addr,
            stop,
            accept_thread: Some(accept_thread),
        })
    }

    /// The bound address (useful when started on port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and join the accept thread.
    ///
    /// Connections already established keep running until their peers
    /// disconnect.
    pub fn shutdown(mut self) {
        self.stop_accepting();
    }

    fn stop_accepting(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Unblock accept() with a throwaway connection.
        let _ = TcpStream::connect(self.local_addr);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
        }
        info!(addr = %self.local_addr, "server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.accept_thread.is_some() {
            self.stop_accepting();
        }
    }
}

fn accept_loop(listener: TcpListener, store: Arc<EventStore>, stop: Arc<AtomicBool>) {
    for conn in listener.incoming() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match conn {
            Ok(stream) => {
                let peer = stream
                    .peer_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!(peer, "connection accepted");
                let conn_store = Arc::clone(&store);
                let spawned = std::thread::Builder::new()
                    .name("tributary-conn".to_string())
                    .spawn(move || serve_connection(stream, conn_store, peer));
                if let Err(e) = spawned {
                    error!(error = %e, "failed to spawn connection thread");
                }
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Serve one connection until the peer disconnects or sends garbage.
fn serve_connection(mut stream: TcpStream, store: Arc<EventStore>, peer: String) {
    loop {
        let package = match Package::read_from(&mut stream) {
            Ok(Some(package)) => package,
            Ok(None) => {
                debug!(peer, "peer disconnected");
                return;
            }
            Err(e) => {
                warn!(peer, error = %e, "closing connection on malformed frame");
                return;
            }
        };

        let reply = match dispatch(&store, &package) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(peer, error = %e, "closing connection on bad request");
                return;
            }
        };

        if let Err(e) = reply.write_to(&mut stream) {
            warn!(peer, error = %e, "closing connection on failed reply");
            return;
        }
    }
}

fn dispatch(store: &EventStore, package: &Package) -> Result<Package> {
    match package.command {
        Command::WriteEvents => {
            let request = WriteEvents::decode(&package.payload)?;
            let completed = handle_write(store, request);
            Ok(Package::new(
                Command::WriteEventsCompleted,
                package.correlation_id,
                completed.encode(),
            ))
        }
        Command::ReadEvent => {
            let request = ReadEvent::decode(&package.payload)?;
            let completed = handle_read(store, request)?;
            Ok(Package::new(
                Command::ReadEventCompleted,
                package.correlation_id,
                completed.encode(),
            ))
        }
        Command::WriteEventsCompleted | Command::ReadEventCompleted => {
            Err(tributary_core::Error::InvalidOperation(format!(
                "completion command {:?} sent to the server",
                package.command
            )))
        }
    }
}

fn handle_write(store: &EventStore, request: WriteEvents) -> WriteEventsCompleted {
    match store.append_to_stream(&request.stream, request.expected_version, request.events) {
        Ok(WriteOutcome::Completed { first_event_number }) => WriteEventsCompleted {
            result: OperationResult::Success,
            first_event_number,
        },
        Ok(WriteOutcome::WrongExpectedVersion { expected, actual }) => {
            debug!(
                stream = request.stream,
                expected, actual, "write rejected on expected version"
            );
            WriteEventsCompleted {
                result: OperationResult::WrongExpectedVersion,
                first_event_number: -1,
            }
        }
        Ok(WriteOutcome::StreamDeleted) => WriteEventsCompleted {
            result: OperationResult::StreamDeleted,
            first_event_number: -1,
        },
        Err(e) => {
            // The append may or may not have reached disk; say so.
            error!(stream = request.stream, error = %e, "write failed internally");
            WriteEventsCompleted {
                result: OperationResult::CommitTimeout,
                first_event_number: -1,
            }
        }
    }
}

fn handle_read(store: &EventStore, request: ReadEvent) -> Result<ReadEventCompleted> {
    let completed = match store.read_event(&request.stream, request.event_number)? {
        ReadOutcome::Success { event_type, data } => ReadEventCompleted {
            result: ReadEventResult::Success,
            event_type,
            data,
        },
        ReadOutcome::NotFound => ReadEventCompleted {
            result: ReadEventResult::NotFound,
            event_type: String::new(),
            data: Vec::new(),
        },
        ReadOutcome::NoStream => ReadEventCompleted {
            result: ReadEventResult::NoStream,
            event_type: String::new(),
            data: Vec::new(),
        },
        ReadOutcome::StreamDeleted => ReadEventCompleted {
            result: ReadEventResult::StreamDeleted,
            event_type: String::new(),
            data: Vec::new(),
        },
    };
    Ok(completed)
}
