//! jflash-dummy - in-memory emulated debug probe
//!
//! Implements [`ProbeBackend`] without hardware: open/close bookkeeping,
//! scriptable attach behavior per core name, a sparse 32-bit register map
//! for IDCODE reads, RTT loopback buffers and failure injection. Used by
//! the test suites and available from the CLI as `--programmer dummy` for
//! trying the tool without a probe attached.
//!
//! Clones share state, so a test can hand one clone to a `Programmer`
//! and keep another to assert on call counts afterwards.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use jflash_core::backend::{ProbeBackend, ProbeInfo};
use jflash_core::error::{Error, Result};
use jflash_core::identity::ProbeIdentity;

#[derive(Default)]
struct Inner {
    // Configuration
    probes: Vec<ProbeInfo>,
    /// Device names `connect` accepts; `None` accepts anything.
    attachable: Option<Vec<String>>,
    memory: HashMap<u32, u32>,
    fail_download: Option<i32>,
    fail_erase: Option<i32>,
    /// Scripted per-call accepted byte counts for RTT writes; once the
    /// script runs out, writes accept everything.
    rtt_write_script: VecDeque<usize>,

    // Session state
    open: bool,
    opened_with: Option<ProbeIdentity>,
    swd_selected: bool,
    device: Option<String>,
    halted: bool,
    rtt_running: bool,
    rtt_control_block: Option<u32>,
    rtt_up: VecDeque<u8>,
    rtt_down: Vec<u8>,

    // Call recording
    open_count: usize,
    close_calls: usize,
    connect_attempts: Vec<String>,
    set_device_calls: Vec<String>,
    reset_count: usize,
    erase_count: usize,
    downloads: Vec<(u32, Vec<u8>)>,
    rtt_write_attempts: usize,
}

/// Emulated probe. Cheap to clone; clones share one probe.
#[derive(Clone, Default)]
pub struct DummyProbe {
    inner: Rc<RefCell<Inner>>,
}

impl DummyProbe {
    /// An emulated probe with the given serial number that attaches to
    /// any device name.
    pub fn new(serial: u32) -> Self {
        let probe = DummyProbe::default();
        probe.inner.borrow_mut().probes.push(ProbeInfo {
            serial,
            product: Some("Dummy probe".to_string()),
        });
        probe
    }

    /// A probe preloaded for interactive demo use: an STM32F765 IDCODE
    /// behind the usual DBGMCU register and a greeting in the RTT up
    /// buffer.
    pub fn demo() -> Self {
        let probe = DummyProbe::new(600100000);
        probe.set_memory(0xE004_2000, 0x1001_0451);
        probe.push_rtt_up(b"hello from the dummy target\n");
        probe
    }

    /// Restrict `connect` to the given device names; everything else
    /// fails to attach.
    pub fn attach_only_on(&self, devices: &[&str]) {
        self.inner.borrow_mut().attachable =
            Some(devices.iter().map(|d| d.to_string()).collect());
    }

    /// Make every `connect` attempt fail.
    pub fn attach_nothing(&self) {
        self.inner.borrow_mut().attachable = Some(Vec::new());
    }

    /// Put a 32-bit value into the emulated register map.
    pub fn set_memory(&self, address: u32, value: u32) {
        self.inner.borrow_mut().memory.insert(address, value);
    }

    /// Make flash downloads fail with the given native result code.
    pub fn fail_downloads(&self, code: i32) {
        self.inner.borrow_mut().fail_download = Some(code);
    }

    /// Make chip erases fail with the given native result code.
    pub fn fail_erase(&self, code: i32) {
        self.inner.borrow_mut().fail_erase = Some(code);
    }

    /// Script the accepted byte count of the next RTT writes (0 emulates
    /// a not-yet-ready control block).
    pub fn script_rtt_writes(&self, accepted: &[usize]) {
        self.inner
            .borrow_mut()
            .rtt_write_script
            .extend(accepted.iter().copied());
    }

    /// Queue bytes on the up (target to host) buffer.
    pub fn push_rtt_up(&self, data: &[u8]) {
        self.inner.borrow_mut().rtt_up.extend(data.iter().copied());
    }

    // Observation side, for assertions.

    pub fn open_count(&self) -> usize {
        self.inner.borrow().open_count
    }

    pub fn close_calls(&self) -> usize {
        self.inner.borrow().close_calls
    }

    pub fn opened_with(&self) -> Option<ProbeIdentity> {
        self.inner.borrow().opened_with.clone()
    }

    pub fn connect_attempts(&self) -> Vec<String> {
        self.inner.borrow().connect_attempts.clone()
    }

    pub fn set_device_calls(&self) -> Vec<String> {
        self.inner.borrow().set_device_calls.clone()
    }

    pub fn reset_count(&self) -> usize {
        self.inner.borrow().reset_count
    }

    pub fn erase_count(&self) -> usize {
        self.inner.borrow().erase_count
    }

    pub fn downloads(&self) -> Vec<(u32, Vec<u8>)> {
        self.inner.borrow().downloads.clone()
    }

    pub fn rtt_write_attempts(&self) -> usize {
        self.inner.borrow().rtt_write_attempts
    }

    /// Bytes the host successfully delivered over RTT.
    pub fn rtt_down(&self) -> Vec<u8> {
        self.inner.borrow().rtt_down.clone()
    }

    pub fn rtt_control_block(&self) -> Option<u32> {
        self.inner.borrow().rtt_control_block
    }
}

impl Inner {
    fn require_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::Probe("dummy probe is not open".into()))
        }
    }

    fn require_attached(&self) -> Result<()> {
        self.require_open()?;
        if self.device.is_some() {
            Ok(())
        } else {
            Err(Error::Probe("dummy probe is not attached to a target".into()))
        }
    }
}

impl ProbeBackend for DummyProbe {
    fn list_probes(&mut self) -> Result<Vec<ProbeInfo>> {
        Ok(self.inner.borrow().probes.clone())
    }

    fn open(&mut self, identity: &ProbeIdentity) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.open {
            return Err(Error::Probe("dummy probe is already open".into()));
        }
        if let ProbeIdentity::Usb(serial) = identity {
            if !inner.probes.iter().any(|p| p.serial == *serial) {
                return Err(Error::Probe(format!("no probe with serial {serial}")));
            }
        }
        log::debug!("dummy: open {identity}");
        inner.open = true;
        inner.opened_with = Some(identity.clone());
        inner.open_count += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.borrow().open
    }

    fn close(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.close_calls += 1;
        inner.open = false;
        inner.swd_selected = false;
        inner.device = None;
        inner.rtt_running = false;
    }

    fn select_swd(&mut self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.require_open()?;
        inner.swd_selected = true;
        Ok(())
    }

    fn connect(&mut self, device: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.require_open()?;
        inner.connect_attempts.push(device.to_string());
        let accepts = match &inner.attachable {
            None => true,
            Some(list) => list.iter().any(|d| d == device),
        };
        if !accepts {
            return Err(Error::Probe(format!("could not attach to {device}")));
        }
        inner.device = Some(device.to_string());
        inner.halted = false;
        Ok(())
    }

    fn set_device(&mut self, device: &str) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.require_attached()?;
        inner.set_device_calls.push(device.to_string());
        inner.device = Some(device.to_string());
        Ok(())
    }

    fn read_mem32(&mut self, address: u32) -> Result<u32> {
        let inner = self.inner.borrow();
        inner.require_attached()?;
        inner
            .memory
            .get(&address)
            .copied()
            .ok_or_else(|| Error::Probe(format!("bus fault reading 0x{address:08X}")))
    }

    fn is_halted(&mut self) -> Result<bool> {
        let inner = self.inner.borrow();
        inner.require_attached()?;
        Ok(inner.halted)
    }

    fn halt(&mut self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.require_attached()?;
        inner.halted = true;
        Ok(())
    }

    fn reset(&mut self, halt: bool) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.require_attached()?;
        inner.reset_count += 1;
        inner.halted = halt;
        Ok(())
    }

    fn download(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.require_attached()?;
        if let Some(code) = inner.fail_download {
            return Err(Error::FlashWrite { address, code });
        }
        inner.downloads.push((address, data.to_vec()));
        Ok(())
    }

    fn erase_chip(&mut self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.require_attached()?;
        if let Some(code) = inner.fail_erase {
            return Err(Error::Erase { code });
        }
        inner.erase_count += 1;
        Ok(())
    }

    fn rtt_start(&mut self, control_block: Option<u32>) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.require_attached()?;
        inner.rtt_running = true;
        inner.rtt_control_block = control_block;
        Ok(())
    }

    fn rtt_stop(&mut self) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.require_open()?;
        inner.rtt_running = false;
        Ok(())
    }

    fn rtt_read(&mut self, _buffer_index: u32, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.borrow_mut();
        if !inner.rtt_running {
            return Err(Error::Probe("dummy RTT is not running".into()));
        }
        let n = buf.len().min(inner.rtt_up.len());
        for slot in buf.iter_mut().take(n) {
            // n is bounded by the queue length.
            if let Some(byte) = inner.rtt_up.pop_front() {
                *slot = byte;
            }
        }
        Ok(n)
    }

    fn rtt_write(&mut self, _buffer_index: u32, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.borrow_mut();
        if !inner.rtt_running {
            return Err(Error::Probe("dummy RTT is not running".into()));
        }
        inner.rtt_write_attempts += 1;
        let accepted = inner
            .rtt_write_script
            .pop_front()
            .unwrap_or(data.len())
            .min(data.len());
        if accepted > 0 {
            inner.rtt_down.extend_from_slice(&data[..accepted]);
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_requires_known_serial() {
        let mut probe = DummyProbe::new(42);
        assert!(probe.open(&ProbeIdentity::Usb(43)).is_err());
        assert!(probe.open(&ProbeIdentity::Usb(42)).is_ok());
        assert!(probe.is_open());
    }

    #[test]
    fn reopen_rejected_while_open() {
        let mut probe = DummyProbe::new(42);
        probe.open(&ProbeIdentity::Usb(42)).unwrap();
        assert!(probe.open(&ProbeIdentity::Usb(42)).is_err());
    }

    #[test]
    fn rtt_loopback() {
        let mut probe = DummyProbe::new(1);
        probe.push_rtt_up(b"abc");
        probe.open(&ProbeIdentity::Usb(1)).unwrap();
        probe.connect("Cortex-M4").unwrap();
        probe.rtt_start(None).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(probe.rtt_read(0, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(probe.rtt_read(0, &mut buf).unwrap(), 0);

        assert_eq!(probe.rtt_write(0, b"xy").unwrap(), 2);
        assert_eq!(probe.rtt_down(), b"xy");
    }

    #[test]
    fn scripted_write_refusals_run_out() {
        let mut probe = DummyProbe::new(1);
        probe.script_rtt_writes(&[0, 0]);
        probe.open(&ProbeIdentity::Usb(1)).unwrap();
        probe.connect("Cortex-M4").unwrap();
        probe.rtt_start(None).unwrap();

        assert_eq!(probe.rtt_write(0, b"hi").unwrap(), 0);
        assert_eq!(probe.rtt_write(0, b"hi").unwrap(), 0);
        assert_eq!(probe.rtt_write(0, b"hi").unwrap(), 2);
        assert_eq!(probe.rtt_write_attempts(), 3);
    }
}
