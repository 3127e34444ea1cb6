//! Tunables for the connection and listener adapters.
//!
//! ```rust,no_run
//! use sockbridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::default()
//!     .with_chunk_queue_capacity(256)
//!     .with_accept_backlog(16);
//! assert!(config.validate().is_ok());
//! ```
use crate::error::BridgeError;

/// Default depth of the per-connection chunk queue
pub const DEFAULT_CHUNK_QUEUE_CAPACITY: usize = 1000;
/// Default number of accepted-but-unclaimed connections per listener
pub const DEFAULT_ACCEPT_BACKLOG: usize = 5;
/// Default buffer size of the in-memory pipe feeding each reader
pub const DEFAULT_PIPE_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    chunk_queue_capacity: usize,
    accept_backlog: usize,
    pipe_buffer_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            chunk_queue_capacity: DEFAULT_CHUNK_QUEUE_CAPACITY,
            accept_backlog: DEFAULT_ACCEPT_BACKLOG,
            pipe_buffer_size: DEFAULT_PIPE_BUFFER_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Sets how many chunks may wait for the reader before the data callback blocks
    pub fn with_chunk_queue_capacity(mut self, capacity: usize) -> Self {
        self.chunk_queue_capacity = capacity;
        self
    }

    /// Sets how many accepted connections may wait for `accept` before the accept callback blocks
    pub fn with_accept_backlog(mut self, backlog: usize) -> Self {
        self.accept_backlog = backlog;
        self
    }

    pub fn with_pipe_buffer_size(mut self, size: usize) -> Self {
        self.pipe_buffer_size = size;
        self
    }

    pub fn chunk_queue_capacity(&self) -> usize {
        self.chunk_queue_capacity
    }

    pub fn accept_backlog(&self) -> usize {
        self.accept_backlog
    }

    pub fn pipe_buffer_size(&self) -> usize {
        self.pipe_buffer_size
    }

    /// Bounded channels cannot have a capacity of zero
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.chunk_queue_capacity == 0 {
            return Err(BridgeError::InvalidConfig(
                "chunk_queue_capacity must be greater than zero",
            ));
        }

        if self.accept_backlog == 0 {
            return Err(BridgeError::InvalidConfig(
                "accept_backlog must be greater than zero",
            ));
        }

        if self.pipe_buffer_size == 0 {
            return Err(BridgeError::InvalidConfig(
                "pipe_buffer_size must be greater than zero",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.chunk_queue_capacity(), 1000);
        assert_eq!(config.accept_backlog(), 5);
        assert_eq!(config.pipe_buffer_size(), 64 * 1024);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(BridgeConfig::default().with_chunk_queue_capacity(0))]
    #[case(BridgeConfig::default().with_accept_backlog(0))]
    #[case(BridgeConfig::default().with_pipe_buffer_size(0))]
    fn zero_values_rejected(#[case] config: BridgeConfig) {
        assert!(matches!(
            config.validate(),
            Err(BridgeError::InvalidConfig(_))
        ));
    }
}
