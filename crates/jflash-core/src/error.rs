//! Error types shared by all jflash crates

use thiserror::Error;

/// Errors surfaced by probe operations.
///
/// An RTT write that delivers fewer bytes than requested is deliberately
/// *not* represented here: partial telemetry delivery is an expected
/// outcome and is reported through [`crate::rtt::RttWriteOutcome`] plus a
/// warning log instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or contradictory user parameters (e.g. both serial and IP
    /// given). Never retried, surfaced immediately.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Auto-detection exhausted every candidate core without attaching.
    #[error("no supported target found (tried cores: {tried})")]
    Detection {
        /// Comma-separated list of the core names that were attempted.
        tried: String,
    },

    /// The firmware container format was not recognized. Raised before
    /// any native call is made.
    #[error("unrecognized firmware image format: {0}")]
    ImageFormat(String),

    /// The native layer reported a flash download failure.
    #[error("flash write failed at 0x{address:08X} (native result {code})")]
    FlashWrite { address: u32, code: i32 },

    /// The native layer reported an erase failure.
    #[error("chip erase failed (native result {code})")]
    Erase { code: i32 },

    /// An RTT operation was attempted while the channel is stopped.
    #[error("RTT is not started")]
    RttNotStarted,

    /// Probe/backend-level failure: open failed, no probes attached,
    /// a native call returned an error code, or the vendor library could
    /// not be loaded.
    #[error("probe error: {0}")]
    Probe(String),

    /// Host-side I/O failure (reading the firmware file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a probe-level error from a failing native call.
    pub fn native(call: &str, code: i32) -> Self {
        Error::Probe(format!("{call} returned {code}"))
    }
}

/// Result alias used throughout jflash.
pub type Result<T> = core::result::Result<T, Error>;
