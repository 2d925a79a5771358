//! Store configuration.

/// When appends become durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// fsync and advance the commit checkpoint after every write request.
    /// Slowest, loses nothing on crash. The default.
    Always,
    /// Durability only on explicit `flush()` / close. A crash may lose
    /// writes since the last flush; the recovery scan discards them
    /// cleanly.
    Manual,
}

/// Configuration for opening an event store.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Logical capacity of each chunk file in bytes
    pub chunk_capacity: u64,
    /// Durability behavior for write requests
    pub flush_mode: FlushMode,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            chunk_capacity: 1024 * 1024,
            flush_mode: FlushMode::Always,
        }
    }
}

impl StoreOptions {
    /// Set the per-chunk logical capacity.
    pub fn with_chunk_capacity(mut self, bytes: u64) -> Self {
        self.chunk_capacity = bytes;
        self
    }

    /// Set the durability behavior.
    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = StoreOptions::default();
        assert_eq!(opts.chunk_capacity, 1024 * 1024);
        assert_eq!(opts.flush_mode, FlushMode::Always);
    }

    #[test]
    fn test_builder_chain() {
        let opts = StoreOptions::default()
            .with_chunk_capacity(4096)
            .with_flush_mode(FlushMode::Manual);
        assert_eq!(opts.chunk_capacity, 4096);
        assert_eq!(opts.flush_mode, FlushMode::Manual);
    }
}
