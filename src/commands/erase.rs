//! Erase command implementation

use crate::cli::ProbeArgs;

pub fn run_erase(probe: &ProbeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut prog = super::open_programmer(probe)?;
    prog.erase(probe.mcu.as_deref())?;
    println!("Chip erased");
    Ok(())
}
