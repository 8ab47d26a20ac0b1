//! Probe backend abstraction
//!
//! All hardware protocol logic (SWD transport, flash algorithms, the RTT
//! ring buffer protocol) lives behind this trait. The real implementation
//! in `jflash-jlink` sequences calls into SEGGER's native library; the
//! `jflash-dummy` crate emulates a probe in memory for testing. Policy
//! code in this crate (lifecycle, detection ordering, retries) only ever
//! talks to `&mut dyn ProbeBackend`.

use crate::error::Result;
use crate::identity::ProbeIdentity;

/// One enumerated probe, as reported by the native layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInfo {
    /// Probe serial number.
    pub serial: u32,
    /// Product name, when the native layer reports one.
    pub product: Option<String>,
}

/// Low-level probe operations provided by a native (or emulated) backend.
///
/// Implementations are plain call sequencers: they must not retry, sleep
/// or reorder operations on their own. All such policy lives in
/// [`crate::programmer::Programmer`].
pub trait ProbeBackend {
    /// List attached probes.
    ///
    /// Does not require (and must not leave behind) an open connection.
    fn list_probes(&mut self) -> Result<Vec<ProbeInfo>>;

    /// Open a connection to the probe addressed by `identity`.
    ///
    /// Callers guarantee the backend is not already open; opening twice
    /// is a bug in the session layer, and backends may reject it.
    fn open(&mut self, identity: &ProbeIdentity) -> Result<()>;

    /// Whether a probe connection is currently open.
    fn is_open(&self) -> bool;

    /// Close the probe connection.
    ///
    /// Infallible and must tolerate being called while closed: the native
    /// library faults the whole process on a bad close sequence, so the
    /// session layer leans on this being a safe no-op.
    fn close(&mut self);

    /// Select the SWD target interface.
    fn select_swd(&mut self) -> Result<()>;

    /// Attach to the target as `device` (a concrete part name such as
    /// "STM32F765ZG", or a generic core name such as "Cortex-M4").
    fn connect(&mut self, device: &str) -> Result<()>;

    /// Re-declare the target device name on an existing attachment, so
    /// the native layer picks the right flash algorithm.
    fn set_device(&mut self, device: &str) -> Result<()>;

    /// Read one 32-bit word from target memory.
    fn read_mem32(&mut self, address: u32) -> Result<u32>;

    /// Whether the target core is halted.
    fn is_halted(&mut self) -> Result<bool>;

    /// Halt the target core.
    fn halt(&mut self) -> Result<()>;

    /// Reset the target core, leaving it halted or running.
    fn reset(&mut self, halt: bool) -> Result<()>;

    /// Download `data` to flash at `address`.
    fn download(&mut self, address: u32, data: &[u8]) -> Result<()>;

    /// Erase the target's flash.
    fn erase_chip(&mut self) -> Result<()>;

    /// Start the RTT subsystem, optionally with an explicit control block
    /// address instead of the native auto-search.
    fn rtt_start(&mut self, control_block: Option<u32>) -> Result<()>;

    /// Stop the RTT subsystem.
    fn rtt_stop(&mut self) -> Result<()>;

    /// Read available bytes from an RTT up buffer. Never blocks; returns
    /// 0 when no data is pending.
    fn rtt_read(&mut self, buffer_index: u32, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes to an RTT down buffer. Returns the number of bytes the
    /// target accepted, which is 0 while its control block is not ready.
    fn rtt_write(&mut self, buffer_index: u32, data: &[u8]) -> Result<usize>;
}
