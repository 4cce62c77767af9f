//! Dispatcher configuration.

use std::time::Duration;

use serde::Deserialize;

/// Dispatcher limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Time allowed to receive a whole request.
    pub read_timeout: Duration,
    /// Time allowed to write a result.
    pub write_timeout: Duration,
    /// Largest accepted request, in bytes.
    pub max_message_size: usize,
    /// Bound on reservation wait plus guest execution, 30 seconds by
    /// default. Unbounded if unset.
    pub call_timeout: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            max_message_size: ww_wire::DEFAULT_MAX_FRAME_LEN,
            call_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl DispatcherConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}
