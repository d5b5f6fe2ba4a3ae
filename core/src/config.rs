//! Programmatic client configuration.
//!
//! There are no config files or flags: base URLs, credentials and limits
//! are supplied by the test code that builds the client.

use std::time::Duration;

/// Default cap on how much of a response body is read.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// Settings for the default ureq-backed transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Global deadline for one request, connect through body. `None` waits
    /// for as long as the platform allows.
    pub timeout: Option<Duration>,
    /// Bodies larger than this fail with a transport error.
    pub max_body_bytes: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = limit;
        self
    }
}
