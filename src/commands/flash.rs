//! Flash command implementation

use indicatif::{ProgressBar, ProgressStyle};
use jflash_core::{FirmwareImage, FlashProgress};
use std::path::Path;

use crate::cli::ProbeArgs;

/// Progress reporter using an indicatif progress bar
struct IndicatifProgress {
    bar: Option<ProgressBar>,
}

impl FlashProgress for IndicatifProgress {
    fn begin(&mut self, total_bytes: usize) {
        let pb = ProgressBar::new(total_bytes as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                     {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) Flashing",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.bar = Some(pb);
    }

    fn progress(&mut self, bytes_written: usize) {
        if let Some(pb) = &self.bar {
            pb.set_position(bytes_written as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message("Flash complete");
        }
    }
}

pub fn run_flash(
    probe: &ProbeArgs,
    firmware: &Path,
    reset: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    // Parse before any probe is opened: a bad container must never
    // touch the target.
    let image = FirmwareImage::from_path(firmware)?;
    log::info!(
        "Flashing {} ({} bytes)...",
        firmware.display(),
        image.total_len()
    );

    let mut prog = super::open_programmer(probe)?;
    let mut progress = IndicatifProgress { bar: None };
    let written =
        prog.flash_with_progress(&image, probe.mcu.as_deref(), reset, &mut progress)?;

    println!("Flashed {} bytes from {}", written, firmware.display());
    Ok(())
}
