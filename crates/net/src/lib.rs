//! TCP transport for the Tributary event store.
//!
//! `Server` owns the accept loop and serves the shared `EventStore` one
//! thread per connection; `ClientSession` is the matching blocking client
//! with reconnect, response timeouts, and a single in-flight request.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod server;

pub use client::{ClientSession, SessionError};
pub use server::Server;
