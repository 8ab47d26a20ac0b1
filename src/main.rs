//! jflash - flash, erase and talk RTT to targets behind SEGGER J-Link
//! probes
//!
//! All hardware protocol work (SWD, flash algorithms, the RTT ring
//! buffer protocol) is done by the vendor's JLinkARM library. jflash
//! sequences it: probe selection, MCU auto-detection, firmware container
//! parsing, session lifecycle with guaranteed cleanup, and the bounded
//! RTT write retry policy.

mod cli;
mod commands;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Map -v/-vv onto the log filter unless RUST_LOG overrides it.
    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .init();

    match cli.command {
        Commands::Flash {
            firmware,
            probe,
            no_reset,
        } => commands::run_flash(&probe, &firmware, !no_reset),

        Commands::Erase { probe } => commands::run_erase(&probe),

        Commands::Rtt {
            probe,
            timeout,
            msg,
            msg_timeout,
            msg_retries,
            reset: _,
            no_reset,
            control_block,
        } => {
            let opts = commands::RttOptions {
                timeout,
                msg,
                msg_timeout,
                msg_retries,
                reset: !no_reset,
                control_block,
            };
            commands::run_rtt(&probe, &opts)
        }

        Commands::Probe { programmer } => commands::run_probe(&programmer),
    }
}
