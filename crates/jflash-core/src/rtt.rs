//! RTT channel policy types
//!
//! RTT is best-effort telemetry: right after the subsystem starts, the
//! target firmware may not have mapped its control block yet, and writes
//! come back as "0 bytes accepted". The write policy therefore retries a
//! bounded number of times with a fixed delay and reports the outcome
//! instead of raising; see [`crate::programmer::Programmer::rtt_write`].

use std::time::Duration;

/// Default number of write attempts before giving up.
pub const DEFAULT_WRITE_RETRIES: u32 = 10;

/// Default delay between write attempts.
pub const DEFAULT_WRITE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Terminal channel: up buffer 0 (target to host).
pub const UP_BUFFER_INDEX: u32 = 0;

/// Terminal channel: down buffer 0 (host to target).
pub const DOWN_BUFFER_INDEX: u32 = 0;

/// RTT subsystem state on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RttState {
    /// RTT has not been started (or has been stopped).
    #[default]
    Stopped,
    /// RTT is running on an attached session.
    Started,
}

/// Result of a bounded-retry RTT write.
///
/// `written == 0` after `attempts == retries` means the channel never
/// became ready; that is reported (with a warning log), never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttWriteOutcome {
    /// Bytes the target accepted (0 if every attempt was refused).
    pub written: usize,
    /// Attempts actually performed, including the successful one.
    pub attempts: u32,
}

impl RttWriteOutcome {
    /// Whether the target accepted any data.
    pub fn delivered(&self) -> bool {
        self.written > 0
    }
}
