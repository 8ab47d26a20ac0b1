//! MCU auto-detection
//!
//! Given an open, not-yet-attached session, try attaching under each
//! candidate core type in a fixed priority order and stop at the first
//! success. Higher-end cores go first: their debug capability is a
//! superset of the smaller ones, so probing top-down avoids the case
//! where a less capable core type half-matches but cannot fully attach.
//!
//! After a successful attach the target is narrowed down to a concrete
//! part by reading the STM32 DBGMCU IDCODE register from the known
//! per-family addresses and mapping the device id.

use crate::backend::ProbeBackend;
use crate::error::{Error, Result};

/// Candidate core types, most capable first.
pub const CORE_PRIORITY: &[&str] = &["Cortex-M7", "Cortex-M4", "Cortex-M3", "Cortex-M0"];

/// Known DBGMCU IDCODE register locations, tried in order.
pub const IDCODE_ADDRESSES: &[(u32, &str)] = &[
    (0xE004_2000, "DBGMCU_IDCODE (F1/F2/F4/F7/L4)"),
    (0x5C00_1000, "DBGMCU_IDC (H7)"),
    (0x4001_5800, "DBGMCU_IDCODE (F0/G0/L0)"),
];

/// Device id (IDCODE[11:0]) to family name.
pub const DEVICE_FAMILIES: &[(u16, &str)] = &[
    (0x410, "STM32F103 (medium-density)"),
    (0x414, "STM32F103 (high-density)"),
    (0x413, "STM32F405/F407/F415/F417"),
    (0x419, "STM32F42x/F43x"),
    (0x421, "STM32F446"),
    (0x423, "STM32F401xB/C"),
    (0x431, "STM32F411"),
    (0x433, "STM32F401xD/E"),
    (0x440, "STM32F030x8"),
    (0x435, "STM32L43x/L44x"),
    (0x449, "STM32F74x/F75x"),
    (0x451, "STM32F76x/F77x"),
    (0x450, "STM32H742/H743/H753/H750"),
];

/// Device id to the default part name used for flashing when the user did
/// not name a concrete MCU.
pub const DEFAULT_PARTS: &[(u16, &str)] = &[
    (0x410, "STM32F103RB"),
    (0x414, "STM32F103RE"),
    (0x413, "STM32F407VG"),
    (0x419, "STM32F429ZI"),
    (0x421, "STM32F446RE"),
    (0x423, "STM32F401CC"),
    (0x431, "STM32F411RE"),
    (0x433, "STM32F401RE"),
    (0x440, "STM32F030C8"),
    (0x435, "STM32L433RC"),
    (0x449, "STM32F746ZG"),
    (0x451, "STM32F765ZG"),
    (0x450, "STM32H743ZI"),
];

/// Resolved target identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    /// Device name used for flashing ("STM32F765ZG", or a core name when
    /// no concrete part could be resolved).
    pub device: String,
    /// Core type the attachment succeeded under, when auto-detected.
    pub core: Option<String>,
    /// Raw DBGMCU IDCODE value, when one was read.
    pub idcode: Option<u32>,
}

impl TargetDescriptor {
    /// Descriptor for an explicitly user-named device.
    pub fn named(device: &str) -> Self {
        TargetDescriptor {
            device: device.to_string(),
            core: None,
            idcode: None,
        }
    }
}

fn plausible(word: u32) -> bool {
    word != 0 && word != 0xFFFF_FFFF
}

/// Attach to the target under the first core type in `priority` that
/// connects, then resolve the concrete part via the DBGMCU IDCODE.
///
/// Fails with [`Error::Detection`] only after every candidate has been
/// tried exactly once. A successful attach with an unreadable or unknown
/// IDCODE is not an error; the descriptor falls back to the core name.
pub fn detect_target(
    backend: &mut dyn ProbeBackend,
    priority: &[&str],
) -> Result<TargetDescriptor> {
    let mut attached: Option<&str> = None;

    for &core in priority {
        log::debug!("Trying to attach as {core}...");
        match backend.connect(core) {
            Ok(()) => {
                log::info!("Attached as {core}");
                attached = Some(core);
                break;
            }
            Err(e) => {
                log::debug!("Attach as {core} failed: {e}");
            }
        }
    }

    let Some(core) = attached else {
        return Err(Error::Detection {
            tried: priority.join(", "),
        });
    };

    // Attachment succeeded; everything below is best-effort narrowing.
    let mut idcode = None;
    for &(addr, desc) in IDCODE_ADDRESSES {
        match backend.read_mem32(addr) {
            Ok(word) if plausible(word) => {
                log::info!("Read IDCODE 0x{word:08X} from 0x{addr:08X} ({desc})");
                idcode = Some(word);
                break;
            }
            Ok(word) => {
                log::debug!("0x{addr:08X} returned implausible IDCODE 0x{word:08X}, skipping {desc}");
            }
            Err(e) => {
                log::debug!("Cannot read 0x{addr:08X} ({desc}): {e}");
            }
        }
    }

    let device = match idcode {
        Some(word) => {
            let dev_id = (word & 0xFFF) as u16;
            let rev_id = (word >> 16) as u16;
            log::info!("Device id 0x{dev_id:03X}, revision 0x{rev_id:04X}");

            if let Some(&(_, part)) = DEFAULT_PARTS.iter().find(|(id, _)| *id == dev_id) {
                part.to_string()
            } else if let Some(&(_, family)) =
                DEVICE_FAMILIES.iter().find(|(id, _)| *id == dev_id)
            {
                log::warn!("No default part for device id 0x{dev_id:03X}, using family name");
                family.replace(' ', "_")
            } else {
                log::warn!("Unknown device id 0x{dev_id:03X}, staying on generic {core}");
                core.to_string()
            }
        }
        None => {
            log::warn!("No readable IDCODE, staying on generic {core}");
            core.to_string()
        }
    };

    Ok(TargetDescriptor {
        device,
        core: Some(core.to_string()),
        idcode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_most_capable_first() {
        assert_eq!(
            CORE_PRIORITY,
            &["Cortex-M7", "Cortex-M4", "Cortex-M3", "Cortex-M0"]
        );
    }

    #[test]
    fn idcode_plausibility() {
        assert!(!plausible(0));
        assert!(!plausible(0xFFFF_FFFF));
        assert!(plausible(0x1001_6451));
    }

    #[test]
    fn device_tables_agree() {
        // Every default part has a family entry.
        for (id, _) in DEFAULT_PARTS {
            assert!(
                DEVICE_FAMILIES.iter().any(|(fid, _)| fid == id),
                "device id 0x{id:03X} has a default part but no family"
            );
        }
    }
}
