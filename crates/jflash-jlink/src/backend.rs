//! `ProbeBackend` implementation over the vendor library

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;

use jflash_core::backend::{ProbeBackend, ProbeInfo};
use jflash_core::error::{Error, Result};
use jflash_core::identity::ProbeIdentity;
use libloading::Library;

use crate::api;

/// Default J-Link remote server port, used when an IP endpoint carries no
/// explicit port.
const DEFAULT_IP_PORT: u16 = 19020;

/// Fixed SWD clock for target attachment, in kHz.
const SWD_SPEED_KHZ: u32 = 4000;

/// Environment variable overriding the vendor library location.
pub const LIBRARY_ENV: &str = "JFLASH_JLINK_LIB";

fn library_candidates() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["JLink_x64.dll", "JLinkARM.dll"]
    } else if cfg!(target_os = "macos") {
        &[
            "libjlinkarm.dylib",
            "/Applications/SEGGER/JLink/libjlinkarm.dylib",
        ]
    } else {
        &[
            "libjlinkarm.so",
            "libjlinkarm.so.8",
            "libjlinkarm.so.7",
            "/opt/SEGGER/JLink/libjlinkarm.so",
        ]
    }
}

/// Probe backend driving SEGGER's `JLinkARM` shared library.
///
/// The library is loaded at construction; every entry point is resolved
/// by name per call, so a partially stripped or older library fails with
/// a named error on first use rather than at load time. The native
/// library holds one global connection, which is why the session layer
/// above never opens twice and never closes twice.
pub struct JlinkBackend {
    lib: Library,
    open: bool,
}

impl JlinkBackend {
    /// Load the vendor library from `JFLASH_JLINK_LIB` or the well-known
    /// install locations.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(LIBRARY_ENV) {
            let lib = unsafe { Library::new(&path) }
                .map_err(|e| Error::Probe(format!("could not load {path}: {e}")))?;
            log::debug!("Loaded J-Link library from {path} ({LIBRARY_ENV})");
            return Ok(JlinkBackend { lib, open: false });
        }

        for candidate in library_candidates() {
            match unsafe { Library::new(candidate) } {
                Ok(lib) => {
                    log::debug!("Loaded J-Link library {candidate}");
                    return Ok(JlinkBackend { lib, open: false });
                }
                Err(e) => log::debug!("{candidate}: {e}"),
            }
        }

        Err(Error::Probe(format!(
            "could not load the SEGGER JLinkARM library; install the J-Link \
             Software Pack or point {LIBRARY_ENV} at it"
        )))
    }

    fn sym<T>(&self, name: &'static [u8]) -> Result<libloading::Symbol<'_, T>> {
        unsafe { self.lib.get(name) }.map_err(|e| {
            Error::Probe(format!(
                "missing J-Link entry point {}: {e}",
                String::from_utf8_lossy(&name[..name.len() - 1])
            ))
        })
    }

    fn exec_command(&self, command: &str) -> Result<()> {
        let exec: libloading::Symbol<'_, api::JlinkarmExecCommand> =
            self.sym(b"JLINKARM_ExecCommand\0")?;
        let command_c = CString::new(command)
            .map_err(|_| Error::Configuration(format!("command contains NUL: {command:?}")))?;
        let mut err_buf = [0 as c_char; 256];
        let ret =
            unsafe { exec(command_c.as_ptr(), err_buf.as_mut_ptr(), err_buf.len() as c_int) };
        if ret < 0 {
            let msg = c_chars_to_string(&err_buf);
            return Err(Error::Probe(if msg.is_empty() {
                format!("JLINKARM_ExecCommand({command:?}) returned {ret}")
            } else {
                format!("JLINKARM_ExecCommand({command:?}): {msg}")
            }));
        }
        Ok(())
    }
}

fn c_chars_to_string(chars: &[c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

impl ProbeBackend for JlinkBackend {
    fn list_probes(&mut self) -> Result<Vec<ProbeInfo>> {
        const MAX_PROBES: usize = 16;

        let get_list: libloading::Symbol<'_, api::JlinkarmEmuGetList> =
            self.sym(b"JLINKARM_EMU_GetList\0")?;
        let mut infos = [api::EmuConnectInfo::zeroed(); MAX_PROBES];
        let ret = unsafe {
            get_list(
                api::HOST_IF_USB,
                infos.as_mut_ptr(),
                MAX_PROBES as c_int,
            )
        };
        if ret < 0 {
            return Err(Error::native("JLINKARM_EMU_GetList", ret));
        }

        let count = (ret as usize).min(MAX_PROBES);
        Ok(infos[..count]
            .iter()
            .map(|info| {
                let product = c_chars_to_string(&info.product);
                ProbeInfo {
                    serial: info.serial_number,
                    product: if product.is_empty() {
                        None
                    } else {
                        Some(product)
                    },
                }
            })
            .collect())
    }

    fn open(&mut self, identity: &ProbeIdentity) -> Result<()> {
        match identity {
            ProbeIdentity::Usb(serial) => {
                let select: libloading::Symbol<'_, api::JlinkarmEmuSelectByUsbSn> =
                    self.sym(b"JLINKARM_EMU_SelectByUSBSN\0")?;
                let ret = unsafe { select(*serial) };
                if ret < 0 {
                    return Err(Error::Probe(format!(
                        "no J-Link with serial {serial} (JLINKARM_EMU_SelectByUSBSN returned {ret})"
                    )));
                }
            }
            ProbeIdentity::Ip(endpoint) => {
                let (host, port) = match endpoint.rsplit_once(':') {
                    Some((host, port)) => {
                        let port = port.parse::<u16>().map_err(|_| {
                            Error::Configuration(format!("invalid port in {endpoint:?}"))
                        })?;
                        (host, port)
                    }
                    None => (endpoint.as_str(), DEFAULT_IP_PORT),
                };
                let host_c = CString::new(host).map_err(|_| {
                    Error::Configuration(format!("endpoint contains NUL: {endpoint:?}"))
                })?;
                let select: libloading::Symbol<'_, api::JlinkarmSelectIp> =
                    self.sym(b"JLINKARM_SelectIP\0")?;
                let ret = unsafe { select(host_c.as_ptr(), port as c_int) };
                if ret != 0 {
                    return Err(Error::Probe(format!(
                        "could not select J-Link at {host}:{port}"
                    )));
                }
            }
        }

        let open_ex: libloading::Symbol<'_, api::JlinkarmOpenEx> =
            self.sym(b"JLINKARM_OpenEx\0")?;
        let err = unsafe { open_ex(ptr::null(), ptr::null()) };
        if !err.is_null() {
            let msg = unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned();
            return Err(Error::Probe(format!("JLINKARM_OpenEx failed: {msg}")));
        }

        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        // Must stay infallible: a missing symbol here means the handle
        // was never really usable, so just drop our flag.
        match self.sym::<api::JlinkarmClose>(b"JLINKARM_Close\0") {
            Ok(close) => unsafe { close() },
            Err(e) => log::warn!("skipping native close: {e}"),
        }
        self.open = false;
    }

    fn select_swd(&mut self) -> Result<()> {
        let tif_select: libloading::Symbol<'_, api::JlinkarmTifSelect> =
            self.sym(b"JLINKARM_TIF_Select\0")?;
        // Returns the previously selected interface, not an error code.
        unsafe { tif_select(api::TIF_SWD) };

        let set_speed: libloading::Symbol<'_, api::JlinkarmSetSpeed> =
            self.sym(b"JLINKARM_SetSpeed\0")?;
        unsafe { set_speed(SWD_SPEED_KHZ) };
        Ok(())
    }

    fn connect(&mut self, device: &str) -> Result<()> {
        self.exec_command(&format!("Device = {device}"))?;

        let connect: libloading::Symbol<'_, api::JlinkarmConnect> =
            self.sym(b"JLINKARM_Connect\0")?;
        let ret = unsafe { connect() };
        if ret < 0 {
            return Err(Error::native("JLINKARM_Connect", ret));
        }

        let is_connected: libloading::Symbol<'_, api::JlinkarmIsConnected> =
            self.sym(b"JLINKARM_IsConnected\0")?;
        if unsafe { is_connected() } == 0 {
            return Err(Error::Probe(format!(
                "target {device} did not report connected after attach"
            )));
        }
        Ok(())
    }

    fn set_device(&mut self, device: &str) -> Result<()> {
        self.exec_command(&format!("Device = {device}"))
    }

    fn read_mem32(&mut self, address: u32) -> Result<u32> {
        let read: libloading::Symbol<'_, api::JlinkarmReadMemU32> =
            self.sym(b"JLINKARM_ReadMemU32\0")?;
        let mut value = 0u32;
        let mut status = 0u8;
        let ret = unsafe { read(address, 1, &mut value, &mut status) };
        if ret < 0 {
            return Err(Error::native("JLINKARM_ReadMemU32", ret));
        }
        if status != 0 {
            return Err(Error::Probe(format!(
                "memory access failed at 0x{address:08X} (status {status})"
            )));
        }
        Ok(value)
    }

    fn is_halted(&mut self) -> Result<bool> {
        let is_halted: libloading::Symbol<'_, api::JlinkarmIsHalted> =
            self.sym(b"JLINKARM_IsHalted\0")?;
        let ret = unsafe { is_halted() };
        if ret < 0 {
            return Err(Error::native("JLINKARM_IsHalted", ret));
        }
        Ok(ret != 0)
    }

    fn halt(&mut self) -> Result<()> {
        let halt: libloading::Symbol<'_, api::JlinkarmHalt> = self.sym(b"JLINKARM_Halt\0")?;
        let ret = unsafe { halt() };
        if ret != 0 {
            return Err(Error::native("JLINKARM_Halt", ret));
        }
        Ok(())
    }

    fn reset(&mut self, halt: bool) -> Result<()> {
        // JLINKARM_Reset leaves the core halted; resume unless asked to
        // stay halted.
        let reset: libloading::Symbol<'_, api::JlinkarmReset> =
            self.sym(b"JLINKARM_Reset\0")?;
        let ret = unsafe { reset() };
        if ret < 0 {
            return Err(Error::native("JLINKARM_Reset", ret));
        }
        if !halt {
            let go: libloading::Symbol<'_, api::JlinkarmGo> = self.sym(b"JLINKARM_Go\0")?;
            unsafe { go() };
        }
        Ok(())
    }

    fn download(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let begin: libloading::Symbol<'_, api::JlinkarmBeginDownload> =
            self.sym(b"JLINKARM_BeginDownload\0")?;
        let write: libloading::Symbol<'_, api::JlinkarmWriteMem> =
            self.sym(b"JLINKARM_WriteMem\0")?;
        let end: libloading::Symbol<'_, api::JlinkarmEndDownload> =
            self.sym(b"JLINKARM_EndDownload\0")?;

        unsafe { begin(0) };
        let ret = unsafe {
            write(
                address,
                data.len() as u32,
                data.as_ptr() as *const c_void,
            )
        };
        if ret < 0 {
            // Leave the download state machine cleanly even on failure.
            unsafe { end() };
            return Err(Error::FlashWrite {
                address,
                code: ret,
            });
        }
        let ret = unsafe { end() };
        if ret < 0 {
            return Err(Error::FlashWrite {
                address,
                code: ret,
            });
        }
        Ok(())
    }

    fn erase_chip(&mut self) -> Result<()> {
        let erase: libloading::Symbol<'_, api::JlinkarmEraseChip> =
            self.sym(b"JLINKARM_EraseChip\0")?;
        let ret = unsafe { erase() };
        if ret < 0 {
            return Err(Error::Erase { code: ret });
        }
        Ok(())
    }

    fn rtt_start(&mut self, control_block: Option<u32>) -> Result<()> {
        let control: libloading::Symbol<'_, api::JlinkRtterminalControl> =
            self.sym(b"JLINK_RTTERMINAL_Control\0")?;
        let ret = match control_block {
            Some(address) => {
                let mut start = api::RttTerminalStart {
                    config_block_address: address,
                    reserved: [0; 3],
                };
                unsafe {
                    control(
                        api::RTTERMINAL_CMD_START,
                        &mut start as *mut _ as *mut c_void,
                    )
                }
            }
            None => unsafe { control(api::RTTERMINAL_CMD_START, ptr::null_mut()) },
        };
        if ret < 0 {
            return Err(Error::native("JLINK_RTTERMINAL_Control(START)", ret));
        }
        Ok(())
    }

    fn rtt_stop(&mut self) -> Result<()> {
        let control: libloading::Symbol<'_, api::JlinkRtterminalControl> =
            self.sym(b"JLINK_RTTERMINAL_Control\0")?;
        let ret = unsafe { control(api::RTTERMINAL_CMD_STOP, ptr::null_mut()) };
        if ret < 0 {
            return Err(Error::native("JLINK_RTTERMINAL_Control(STOP)", ret));
        }
        Ok(())
    }

    fn rtt_read(&mut self, buffer_index: u32, buf: &mut [u8]) -> Result<usize> {
        let read: libloading::Symbol<'_, api::JlinkRtterminalRead> =
            self.sym(b"JLINK_RTTERMINAL_Read\0")?;
        let ret = unsafe {
            read(
                buffer_index,
                buf.as_mut_ptr() as *mut c_char,
                buf.len() as u32,
            )
        };
        if ret < 0 {
            return Err(Error::native("JLINK_RTTERMINAL_Read", ret));
        }
        Ok(ret as usize)
    }

    fn rtt_write(&mut self, buffer_index: u32, data: &[u8]) -> Result<usize> {
        let write: libloading::Symbol<'_, api::JlinkRtterminalWrite> =
            self.sym(b"JLINK_RTTERMINAL_Write\0")?;
        let ret = unsafe {
            write(
                buffer_index,
                data.as_ptr() as *const c_char,
                data.len() as u32,
            )
        };
        if ret < 0 {
            return Err(Error::native("JLINK_RTTERMINAL_Write", ret));
        }
        Ok(ret as usize)
    }
}

impl Drop for JlinkBackend {
    fn drop(&mut self) {
        self.close();
    }
}
