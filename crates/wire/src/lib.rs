//! Binary wire protocol for the Tributary event store.
//!
//! Two layers:
//! - `package`: the length-prefixed frame every message travels in, with
//!   a command byte and a correlation id;
//! - `messages`: the per-command payload codecs.
//!
//! All decoding is fallible and bounded; arbitrary peer bytes produce
//! typed errors, never panics or unbounded allocations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod messages;
pub mod package;

pub use messages::{
    OperationResult, ReadEvent, ReadEventCompleted, ReadEventResult, WriteEvents,
    WriteEventsCompleted,
};
pub use package::{Command, Package, MAX_PACKAGE_SIZE, PACKAGE_PREFIX};
