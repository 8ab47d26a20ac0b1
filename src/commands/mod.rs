//! CLI command implementations
//!
//! Each command resolves the probe arguments into a
//! [`jflash_core::Programmer`] and drives it; all session lifecycle and
//! retry policy lives in the core crate, not here.

mod erase;
mod flash;
mod probe;
mod rtt;

pub use erase::run_erase;
pub use flash::run_flash;
pub use probe::run_probe;
pub use rtt::{run_rtt, RttOptions};

use crate::cli::ProbeArgs;
use crate::programmers;
use jflash_core::{ProbeIdentity, Programmer};

/// Resolve CLI probe arguments into a programmer.
///
/// The library requires exactly one identity; the CLI convenience of
/// "no identity given" is resolved here by enumerating attached probes
/// and taking the first one.
pub(crate) fn open_programmer(
    args: &ProbeArgs,
) -> Result<Programmer, Box<dyn std::error::Error>> {
    let mut backend = programmers::open_backend(&args.programmer)?;

    let identity = match (args.serial, args.ip.as_deref()) {
        (None, None) => {
            log::info!("No probe specified, searching for attached probes...");
            let probes = backend.list_probes()?;
            let Some(first) = probes.first() else {
                return Err("no probes found; connect one or pass --serial/--ip".into());
            };
            if probes.len() > 1 {
                log::warn!(
                    "{} probes attached, using the first one (serial {})",
                    probes.len(),
                    first.serial
                );
            }
            log::info!("Using probe with serial {}", first.serial);
            ProbeIdentity::Usb(first.serial)
        }
        (serial, ip) => ProbeIdentity::from_options(serial, ip)?,
    };

    Ok(Programmer::new(backend, identity))
}
