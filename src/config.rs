//! Configuration for blockfile readers

/// Configuration for a [`BlockFile`](crate::BlockFile) handle.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Bound of the packet channel returned by `all_packets`
    /// and expected by `lookup` sinks created from this config.
    pub stream_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            stream_capacity: 100,
        }
    }
}
