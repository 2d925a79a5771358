//! Epoch management.
//!
//! An epoch marks one validated startup of the node. On every startup the
//! epoch manager allocates a fresh globally-unique id, appends an epoch
//! record at the log tail, flushes it durably, and only then announces
//! `EpochWritten` to subscribers. Epoch records live inside the log itself,
//! so the full epoch chain is recoverable purely by scanning chunks — no
//! separate epoch file exists.
//!
//! Invariants:
//! - no two startups ever reuse an epoch id;
//! - epoch numbers increase by exactly one per startup;
//! - the epoch record is durable before the notification fires;
//! - the epoch write happens before any client write is accepted (enforced
//!   by the store's open sequence).

use tracing::info;
use tributary_core::{EpochRecord, Result};
use uuid::Uuid;

use crate::log::ChunkedLog;
use crate::record::LogRecord;

/// Notification published after an epoch record is durably committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochWritten {
    /// Unique id of the new epoch
    pub epoch_id: Uuid,
    /// Number of the new epoch
    pub epoch_number: i64,
    /// Log position of the epoch record
    pub log_position: u64,
}

/// Fan-out target for epoch notifications.
///
/// Delivery is fire-and-forget to subscribers present at publish time;
/// supervisory components use it for readiness signaling.
pub trait EpochPublisher: Send + Sync {
    /// Called once per startup, after the epoch record is durable.
    fn epoch_written(&self, epoch: &EpochWritten);
}

/// Publisher that drops notifications.
pub struct NoopEpochPublisher;

impl EpochPublisher for NoopEpochPublisher {
    fn epoch_written(&self, _epoch: &EpochWritten) {}
}

/// Per-process epoch state.
pub struct EpochManager {
    current: Option<EpochRecord>,
}

impl EpochManager {
    /// Create a manager seeded with the last epoch recovered from the log.
    pub fn new(last_known: Option<EpochRecord>) -> Self {
        EpochManager {
            current: last_known,
        }
    }

    /// Write the startup epoch record and announce it.
    ///
    /// Synchronous with respect to durability: the record is flushed before
    /// the publisher fires. The caller must have completed tail repair
    /// first so the epoch starts a clean, fully-committed tail.
    pub fn on_startup(
        &mut self,
        log: &ChunkedLog,
        publisher: &dyn EpochPublisher,
    ) -> Result<EpochRecord> {
        let epoch_number = match self.current {
            Some(prev) => prev.epoch_number + 1,
            None => 0,
        };
        let epoch_id = Uuid::new_v4();

        // The record's position field must match where the frame actually
        // lands, which differs from the current writer position when the
        // frame forces a chunk roll.
        let position = log.append_with_position(|pos| {
            LogRecord::Epoch(EpochRecord {
                epoch_id,
                epoch_number,
                log_position: pos.raw(),
            })
        })?;
        let epoch = EpochRecord {
            epoch_id,
            epoch_number,
            log_position: position.raw(),
        };
        log.flush()?;

        info!(
            epoch_id = %epoch.epoch_id,
            epoch_number,
            log_position = epoch.log_position,
            "epoch written"
        );

        publisher.epoch_written(&EpochWritten {
            epoch_id: epoch.epoch_id,
            epoch_number: epoch.epoch_number,
            log_position: epoch.log_position,
        });

        self.current = Some(epoch);
        Ok(epoch)
    }

    /// The epoch this process is running under, once written.
    pub fn current(&self) -> Option<&EpochRecord> {
        self.current.as_ref()
    }
}
