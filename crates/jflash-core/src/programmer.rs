//! High-level programmer operations
//!
//! [`Programmer`] owns a probe backend and sequences it through the
//! open / attach / operate / close lifecycle. The rules it enforces:
//!
//! - `close()` is idempotent and infallible. The native library faults
//!   the process on a bad close sequence, so double-close must be a
//!   structural impossibility, not a caught error.
//! - Every operation that opens a session closes it on all exit paths,
//!   success and failure alike. `Drop` closes as a last resort.
//! - RTT writes retry a bounded number of times while the target's
//!   control block is not ready, then report the shortfall instead of
//!   raising.

use std::thread;
use std::time::Duration;

use crate::backend::{ProbeBackend, ProbeInfo};
use crate::detect::{self, TargetDescriptor, CORE_PRIORITY};
use crate::error::{Error, Result};
use crate::identity::ProbeIdentity;
use crate::image::FirmwareImage;
use crate::rtt::{RttState, RttWriteOutcome, DOWN_BUFFER_INDEX, UP_BUFFER_INDEX};

/// Flash downloads are chunked so progress reporting stays responsive.
const FLASH_CHUNK_SIZE: usize = 16 * 1024;

/// Progress sink for flash downloads.
///
/// The CLI implements this with an indicatif bar; library users get
/// [`NoProgress`] unless they ask otherwise.
pub trait FlashProgress {
    /// Called once before the first byte, with the total payload size.
    fn begin(&mut self, _total_bytes: usize) {}
    /// Called after each chunk with the cumulative byte count.
    fn progress(&mut self, _bytes_written: usize) {}
    /// Called once after the last byte.
    fn finish(&mut self) {}
}

/// No-op progress sink.
pub struct NoProgress;

impl FlashProgress for NoProgress {}

/// A probe programmer: one backend, one identity, one session at a time.
pub struct Programmer {
    backend: Box<dyn ProbeBackend>,
    identity: ProbeIdentity,
    target: Option<TargetDescriptor>,
    rtt: RttState,
}

impl Programmer {
    /// Wrap a backend with a resolved probe identity.
    pub fn new(backend: Box<dyn ProbeBackend>, identity: ProbeIdentity) -> Self {
        Programmer {
            backend,
            identity,
            target: None,
            rtt: RttState::Stopped,
        }
    }

    /// Construct from the two optional user parameters; exactly one of
    /// `serial`/`ip` must be given.
    pub fn from_options(
        backend: Box<dyn ProbeBackend>,
        serial: Option<u32>,
        ip: Option<&str>,
    ) -> Result<Self> {
        let identity = ProbeIdentity::from_options(serial, ip)?;
        Ok(Self::new(backend, identity))
    }

    /// The identity this programmer opens.
    pub fn identity(&self) -> &ProbeIdentity {
        &self.identity
    }

    /// The attached target, if any.
    pub fn target(&self) -> Option<&TargetDescriptor> {
        self.target.as_ref()
    }

    /// Whether a probe session is currently open.
    pub fn is_open(&self) -> bool {
        self.backend.is_open()
    }

    /// Current RTT channel state.
    pub fn rtt_state(&self) -> RttState {
        self.rtt
    }

    /// List attached probes.
    pub fn probe(&mut self) -> Result<Vec<ProbeInfo>> {
        self.backend.list_probes()
    }

    /// Open the probe (if not already open) and attach to the target,
    /// auto-detecting the MCU when `mcu` is `None`.
    ///
    /// On failure the session is closed before the error is returned, so
    /// a failed connect never leaks a native handle.
    pub fn connect(&mut self, mcu: Option<&str>) -> Result<&TargetDescriptor> {
        if let Err(e) = self.connect_inner(mcu) {
            self.close();
            return Err(e);
        }
        self.target
            .as_ref()
            .ok_or_else(|| Error::Probe("target attachment left no descriptor".into()))
    }

    fn connect_inner(&mut self, mcu: Option<&str>) -> Result<()> {
        if self.backend.is_open() && self.target.is_some() {
            return Ok(());
        }

        if !self.backend.is_open() {
            log::info!("Opening probe {}", self.identity);
            self.backend.open(&self.identity)?;
            self.backend.select_swd()?;
            log::debug!("Target interface set to SWD");
        }

        let target = match mcu {
            Some(name) => {
                log::info!("Connecting to specified MCU: {name}");
                self.backend.connect(name)?;
                TargetDescriptor::named(name)
            }
            None => {
                log::info!("Auto-detecting MCU...");
                let desc = detect::detect_target(self.backend.as_mut(), CORE_PRIORITY)?;
                // Re-declare the concrete part so the native layer picks
                // the matching flash algorithm instead of the generic
                // core connection used during detection.
                if desc.core.as_deref() != Some(desc.device.as_str()) {
                    if let Err(e) = self.backend.set_device(&desc.device) {
                        log::warn!(
                            "Could not set device to {}: {e}, keeping generic connection",
                            desc.device
                        );
                    }
                }
                desc
            }
        };

        log::info!("Connected to {}", target.device);
        self.target = Some(target);
        Ok(())
    }

    /// Close the session. Safe to call any number of times, in any state.
    pub fn close(&mut self) {
        if self.rtt == RttState::Started {
            let _ = self.backend.rtt_stop();
            self.rtt = RttState::Stopped;
        }
        if self.backend.is_open() {
            log::info!("Closing probe connection");
            self.backend.close();
        }
        self.target = None;
    }

    /// Flash `image` to the target and optionally reset it afterwards.
    ///
    /// Opens a session if none is open, resolves the MCU (explicit or
    /// auto-detected), and always closes the session before returning.
    /// Returns the number of bytes written.
    pub fn flash(
        &mut self,
        image: &FirmwareImage,
        mcu: Option<&str>,
        reset: bool,
    ) -> Result<usize> {
        self.flash_with_progress(image, mcu, reset, &mut NoProgress)
    }

    /// Parse the firmware container at `path` and flash it.
    ///
    /// A malformed or unrecognized container fails before the probe is
    /// touched.
    pub fn flash_file(
        &mut self,
        path: &std::path::Path,
        mcu: Option<&str>,
        reset: bool,
    ) -> Result<usize> {
        let image = FirmwareImage::from_path(path)?;
        self.flash(&image, mcu, reset)
    }

    /// Like [`Programmer::flash`], reporting download progress.
    pub fn flash_with_progress(
        &mut self,
        image: &FirmwareImage,
        mcu: Option<&str>,
        reset: bool,
        progress: &mut dyn FlashProgress,
    ) -> Result<usize> {
        let result = self.flash_inner(image, mcu, reset, progress);
        self.close();
        result
    }

    fn flash_inner(
        &mut self,
        image: &FirmwareImage,
        mcu: Option<&str>,
        reset: bool,
        progress: &mut dyn FlashProgress,
    ) -> Result<usize> {
        self.connect(mcu)?;

        if !self.backend.is_halted()? {
            self.backend.halt()?;
            log::debug!("Core halted for flashing");
        }

        let total = image.total_len();
        progress.begin(total);
        let mut written = 0;
        for segment in image.segments() {
            log::info!(
                "Writing {} bytes at 0x{:08X}",
                segment.data.len(),
                segment.address
            );
            for (i, chunk) in segment.data.chunks(FLASH_CHUNK_SIZE).enumerate() {
                let address = segment
                    .address
                    .checked_add((i * FLASH_CHUNK_SIZE) as u32)
                    .ok_or_else(|| {
                        Error::ImageFormat(
                            "segment extends past the 32-bit address space".into(),
                        )
                    })?;
                self.backend.download(address, chunk)?;
                written += chunk.len();
                progress.progress(written);
            }
        }
        progress.finish();
        log::info!("Flash successful: {written} bytes written");

        if reset {
            log::info!("Resetting target");
            self.backend.reset(false)?;
        }

        Ok(written)
    }

    /// Erase the target's flash. Same open/resolve/operate/close shape as
    /// [`Programmer::flash`].
    pub fn erase(&mut self, mcu: Option<&str>) -> Result<()> {
        let result = self.erase_inner(mcu);
        self.close();
        result
    }

    fn erase_inner(&mut self, mcu: Option<&str>) -> Result<()> {
        self.connect(mcu)?;

        if !self.backend.is_halted()? {
            self.backend.halt()?;
            log::debug!("Core halted for erase");
        }

        log::info!("Erasing chip...");
        self.backend.erase_chip()?;
        log::info!("Erase complete");
        Ok(())
    }

    /// Reset the target core on an already-open, attached session.
    pub fn reset(&mut self, halt: bool) -> Result<()> {
        if !self.backend.is_open() || self.target.is_none() {
            return Err(Error::Probe(
                "reset requires an open target connection".into(),
            ));
        }
        log::info!("Resetting target (halt={halt})");
        self.backend.reset(halt)
    }

    /// Start RTT on the attached session, then wait `delay` for the
    /// target firmware to finish mapping its control block. Without the
    /// settle delay, immediate reads and writes can silently find no
    /// channel.
    pub fn start_rtt(&mut self, delay: Duration, control_block: Option<u32>) -> Result<()> {
        if !self.backend.is_open() || self.target.is_none() {
            return Err(Error::Probe(
                "RTT requires an open target connection".into(),
            ));
        }
        if self.rtt == RttState::Started {
            log::debug!("RTT already started");
            return Ok(());
        }

        match control_block {
            Some(addr) => log::info!("Starting RTT (control block at 0x{addr:08X})"),
            None => log::info!("Starting RTT (auto-searching control block)"),
        }
        self.backend.rtt_start(control_block)?;

        if !delay.is_zero() {
            log::debug!("Waiting {delay:?} for target-side RTT init");
            thread::sleep(delay);
        }

        self.rtt = RttState::Started;
        Ok(())
    }

    /// Stop RTT. A no-op when the channel is already stopped.
    pub fn stop_rtt(&mut self) -> Result<()> {
        if self.rtt == RttState::Stopped {
            return Ok(());
        }
        self.rtt = RttState::Stopped;
        self.backend.rtt_stop()
    }

    /// Read whatever bytes are currently buffered on the up channel, up
    /// to `max_bytes`. Never blocks; an empty result means no data.
    pub fn rtt_read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        if self.rtt != RttState::Started {
            return Err(Error::RttNotStarted);
        }
        let mut buf = vec![0u8; max_bytes];
        let n = self.backend.rtt_read(UP_BUFFER_INDEX, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Write `data` to the down channel with a bounded retry policy.
    ///
    /// A zero-byte result from the native write means the target's
    /// control block is not ready yet; sleep `retry_delay` and try again,
    /// up to `retries` attempts total. The write is always attempted at
    /// least once, so `retries` below 1 is treated as 1. Exhausting the
    /// attempts is not an error: a warning is logged and the outcome
    /// reports 0 bytes.
    pub fn rtt_write(
        &mut self,
        data: &[u8],
        retries: u32,
        retry_delay: Duration,
    ) -> Result<RttWriteOutcome> {
        if self.rtt != RttState::Started {
            return Err(Error::RttNotStarted);
        }
        if data.is_empty() {
            return Ok(RttWriteOutcome {
                written: 0,
                attempts: 0,
            });
        }

        let retries = retries.max(1);
        for attempt in 1..=retries {
            let written = self.backend.rtt_write(DOWN_BUFFER_INDEX, data)?;
            if written > 0 {
                log::debug!("RTT write accepted {written} bytes on attempt {attempt}");
                return Ok(RttWriteOutcome {
                    written,
                    attempts: attempt,
                });
            }
            if attempt < retries {
                thread::sleep(retry_delay);
            }
        }

        log::warn!(
            "RTT channel did not accept data after {retries} attempts, wrote 0 of {} bytes",
            data.len()
        );
        Ok(RttWriteOutcome {
            written: 0,
            attempts: retries,
        })
    }
}

impl Drop for Programmer {
    fn drop(&mut self) {
        self.close();
    }
}
