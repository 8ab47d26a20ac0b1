//! CLI argument parsing

use crate::programmers;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Probe backend to use [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "jflash")]
#[command(author, version, about = "SEGGER J-Link flasher and RTT client", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Probe selection options shared across commands
#[derive(Args, Debug, Clone, Default)]
pub struct ProbeArgs {
    /// Probe serial number (first enumerated probe is used if neither
    /// --serial nor --ip is given)
    #[arg(short, long)]
    pub serial: Option<u32>,

    /// Probe IP endpoint (host:port)
    #[arg(long, conflicts_with = "serial")]
    pub ip: Option<String>,

    /// Target MCU name (e.g. STM32F765ZG); auto-detected when omitted
    #[arg(short, long)]
    pub mcu: Option<String>,

    #[arg(short, long, default_value = "jlink", help = programmer_help())]
    pub programmer: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flash a firmware image (.hex, .ihex or .bin)
    Flash {
        /// Path to the firmware image
        firmware: PathBuf,

        #[command(flatten)]
        probe: ProbeArgs,

        /// Do not reset the target after flashing
        #[arg(long)]
        no_reset: bool,
    },

    /// Erase the target's flash
    Erase {
        #[command(flatten)]
        probe: ProbeArgs,
    },

    /// Connect RTT and stream target output to stdout
    Rtt {
        #[command(flatten)]
        probe: ProbeArgs,

        /// Read timeout in seconds; 0 reads until interrupted
        #[arg(short = 't', long, default_value_t = 10.0)]
        timeout: f64,

        /// Message to send over RTT after connecting (supports \n, \t,
        /// \r, \0 and \xNN escapes)
        #[arg(long)]
        msg: Option<String>,

        /// Delay in seconds before sending --msg
        #[arg(long, default_value_t = 0.5)]
        msg_timeout: f64,

        /// Write attempts for --msg while the channel is not ready
        #[arg(long, default_value_t = 10)]
        msg_retries: u32,

        /// Reset the target after connecting (default)
        #[arg(long, overrides_with = "no_reset")]
        reset: bool,

        /// Do not reset the target after connecting
        #[arg(long, overrides_with = "reset")]
        no_reset: bool,

        /// RTT control block address (hex or decimal); auto-searched
        /// when omitted
        #[arg(long, value_parser = parse_hex_u32)]
        control_block: Option<u32>,
    },

    /// List attached probes
    Probe {
        #[arg(short, long, default_value = "jlink", help = programmer_help())]
        programmer: String,
    },
}
