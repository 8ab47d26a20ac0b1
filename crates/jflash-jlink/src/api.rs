//! Raw `JLinkARM` entry points
//!
//! Function signatures, constants and C structs of the vendor library,
//! as documented by the SEGGER SDK. Only the subset this project
//! sequences is declared; everything is resolved at runtime by name.

use std::ffi::{c_char, c_int, c_uint, c_void};

/// USB host interface selector for `JLINKARM_EMU_GetList`.
pub const HOST_IF_USB: c_int = 1;

/// SWD target interface selector for `JLINKARM_TIF_Select`.
pub const TIF_SWD: c_int = 1;

/// `JLINK_RTTERMINAL_Control` command: start the RTT subsystem.
pub const RTTERMINAL_CMD_START: c_uint = 0;
/// `JLINK_RTTERMINAL_Control` command: stop the RTT subsystem.
pub const RTTERMINAL_CMD_STOP: c_uint = 1;

/// `JLINKARM_EMU_CONNECT_INFO`, 264 bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EmuConnectInfo {
    pub serial_number: u32,
    pub connection: c_uint,
    pub usb_addr: u32,
    pub ip_addr: [u8; 16],
    pub time: c_int,
    pub time_us: u64,
    pub product: [c_char; 32],
    pub nickname: [c_char; 32],
    pub fw_string: [c_char; 112],
    pub is_dhcp_assigned_ip: c_char,
    pub is_dhcp_assigned_ip_valid: c_char,
    pub num_ip_connections: c_char,
    pub num_ip_connections_valid: c_char,
    pub padding: [u8; 34],
}

impl EmuConnectInfo {
    pub fn zeroed() -> Self {
        // A struct of integers and byte arrays; all-zero is a valid value.
        unsafe { std::mem::zeroed() }
    }
}

/// `JLINK_RTTERMINAL_START`.
#[repr(C)]
pub struct RttTerminalStart {
    pub config_block_address: u32,
    pub reserved: [u32; 3],
}

// Signatures of the entry points we resolve. Names mirror the SDK.
pub type JlinkarmEmuGetList =
    unsafe extern "C" fn(c_int, *mut EmuConnectInfo, c_int) -> c_int;
pub type JlinkarmEmuSelectByUsbSn = unsafe extern "C" fn(u32) -> c_int;
pub type JlinkarmSelectIp = unsafe extern "C" fn(*const c_char, c_int) -> c_char;
pub type JlinkarmOpenEx =
    unsafe extern "C" fn(*const c_void, *const c_void) -> *const c_char;
pub type JlinkarmClose = unsafe extern "C" fn();
pub type JlinkarmExecCommand =
    unsafe extern "C" fn(*const c_char, *mut c_char, c_int) -> c_int;
pub type JlinkarmTifSelect = unsafe extern "C" fn(c_int) -> c_int;
pub type JlinkarmSetSpeed = unsafe extern "C" fn(u32);
pub type JlinkarmConnect = unsafe extern "C" fn() -> c_int;
pub type JlinkarmIsConnected = unsafe extern "C" fn() -> c_char;
pub type JlinkarmIsHalted = unsafe extern "C" fn() -> c_int;
pub type JlinkarmHalt = unsafe extern "C" fn() -> c_int;
pub type JlinkarmReset = unsafe extern "C" fn() -> c_int;
pub type JlinkarmGo = unsafe extern "C" fn();
pub type JlinkarmReadMemU32 =
    unsafe extern "C" fn(u32, u32, *mut u32, *mut u8) -> c_int;
pub type JlinkarmBeginDownload = unsafe extern "C" fn(u32);
pub type JlinkarmWriteMem = unsafe extern "C" fn(u32, u32, *const c_void) -> c_int;
pub type JlinkarmEndDownload = unsafe extern "C" fn() -> c_int;
pub type JlinkarmEraseChip = unsafe extern "C" fn() -> c_int;
pub type JlinkRtterminalControl = unsafe extern "C" fn(c_uint, *mut c_void) -> c_int;
pub type JlinkRtterminalRead = unsafe extern "C" fn(c_uint, *mut c_char, c_uint) -> c_int;
pub type JlinkRtterminalWrite =
    unsafe extern "C" fn(c_uint, *const c_char, c_uint) -> c_int;
