//! jflash-core - probe session lifecycle, MCU auto-detection and RTT policy
//!
//! All hardware protocol logic (SWD transport, flash algorithms, the RTT
//! ring buffer protocol) belongs to the probe vendor's native library.
//! This crate owns only the policy around it:
//!
//! - probe identity (USB serial xor IP endpoint, structurally exclusive)
//! - session lifecycle with idempotent close and cleanup on every exit
//!   path, because a bad native close sequence faults the whole process
//! - MCU auto-detection in a fixed most-capable-first core order
//! - firmware image container handling (Intel HEX, raw binary)
//! - the bounded RTT write retry policy
//!
//! Backends implement [`backend::ProbeBackend`]: `jflash-jlink` binds the
//! SEGGER library, `jflash-dummy` emulates a probe in memory.

pub mod backend;
pub mod detect;
pub mod error;
pub mod identity;
pub mod image;
pub mod programmer;
pub mod rtt;

pub use backend::{ProbeBackend, ProbeInfo};
pub use detect::{TargetDescriptor, CORE_PRIORITY};
pub use error::{Error, Result};
pub use identity::ProbeIdentity;
pub use image::{FirmwareImage, ImageFormat, Segment, DEFAULT_RAW_BASE};
pub use programmer::{FlashProgress, NoProgress, Programmer};
pub use rtt::{RttState, RttWriteOutcome, DEFAULT_WRITE_RETRIES, DEFAULT_WRITE_RETRY_DELAY};
