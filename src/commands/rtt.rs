//! RTT streaming command implementation
//!
//! Connects to the target, optionally resets it, starts RTT, optionally
//! sends a message on the down channel, then streams up-channel bytes to
//! stdout until the timeout elapses (or forever with `-t 0`).

use std::io::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use jflash_core::{Programmer, DEFAULT_WRITE_RETRY_DELAY};
use signal_hook::consts::signal;

use crate::cli::ProbeArgs;

/// Bytes requested per RTT poll.
const READ_CHUNK: usize = 4096;
/// Sleep between polls when no data is pending, to avoid busy-waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Settle time after RTT start, letting target-side init finish.
const START_SETTLE: Duration = Duration::from_secs(1);
/// Settle time after a reset before starting RTT.
const RESET_SETTLE: Duration = Duration::from_millis(500);

pub struct RttOptions {
    /// Read window in seconds; 0 reads until interrupted.
    pub timeout: f64,
    /// Optional message for the down channel, with escapes undecoded.
    pub msg: Option<String>,
    /// Delay before sending the message, in seconds.
    pub msg_timeout: f64,
    /// Write attempts while the channel is not ready.
    pub msg_retries: u32,
    /// Reset the target after connecting.
    pub reset: bool,
    /// Explicit control block address override.
    pub control_block: Option<u32>,
}

pub fn run_rtt(probe: &ProbeArgs, opts: &RttOptions) -> Result<(), Box<dyn std::error::Error>> {
    // Decode the message up front so a bad escape fails before any
    // hardware is touched.
    let msg_bytes = opts.msg.as_deref().map(decode_escapes).transpose()?;

    let mut prog = super::open_programmer(probe)?;
    let result = stream(&mut prog, probe, opts, msg_bytes);
    prog.close();
    result
}

fn stream(
    prog: &mut Programmer,
    probe: &ProbeArgs,
    opts: &RttOptions,
    msg: Option<Vec<u8>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let target = prog.connect(probe.mcu.as_deref())?;
    log::debug!("Attached to {}", target.device);

    if opts.reset {
        prog.reset(false)?;
        // Give the firmware time to restart and set up its RTT control
        // block before searching for it.
        thread::sleep(RESET_SETTLE);
    }

    prog.start_rtt(START_SETTLE, opts.control_block)?;

    println!("RTT connected. Reading data...");
    if opts.timeout == 0.0 {
        println!("(Press Ctrl+C to stop)");
    } else {
        println!("(Reading for {} seconds)", opts.timeout);
    }

    if let Some(msg) = msg {
        if opts.msg_timeout > 0.0 {
            thread::sleep(Duration::from_secs_f64(opts.msg_timeout));
        }
        let outcome = prog.rtt_write(&msg, opts.msg_retries, DEFAULT_WRITE_RETRY_DELAY)?;
        log::info!(
            "Sent {} of {} bytes in {} attempt(s)",
            outcome.written,
            msg.len(),
            outcome.attempts
        );
    }

    // Ctrl-C must break the loop instead of killing the process, so the
    // RTT stop and probe close below still run.
    let exit = Arc::new(AtomicBool::new(false));
    let sig_id = signal_hook::flag::register(signal::SIGINT, exit.clone())?;

    let start = Instant::now();
    let stdout = std::io::stdout();
    loop {
        if exit.load(Ordering::Relaxed) {
            log::info!("Interrupted, stopping RTT");
            break;
        }
        if opts.timeout > 0.0 && start.elapsed() >= Duration::from_secs_f64(opts.timeout) {
            break;
        }

        let data = prog.rtt_read(READ_CHUNK)?;
        if data.is_empty() {
            thread::sleep(POLL_INTERVAL);
        } else {
            let mut out = stdout.lock();
            out.write_all(&data)?;
            out.flush()?;
        }
    }

    // Restore default handling so a second Ctrl-C during cleanup still
    // terminates.
    signal_hook::low_level::unregister(sig_id);
    signal_hook::flag::register_conditional_default(signal::SIGINT, exit)?;

    prog.stop_rtt()?;
    Ok(())
}

/// Decode `\n`, `\t`, `\r`, `\0`, `\\` and `\xNN` escapes into bytes.
/// Unknown escapes are passed through verbatim.
fn decode_escapes(s: &str) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    let mut utf8 = [0u8; 4];

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('x') => {
                let hi = chars
                    .next()
                    .ok_or_else(|| "truncated \\x escape".to_string())?;
                let lo = chars
                    .next()
                    .ok_or_else(|| "truncated \\x escape".to_string())?;
                let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16)
                    .map_err(|_| format!("invalid \\x escape: \\x{hi}{lo}"))?;
                out.push(byte);
            }
            Some(other) => {
                out.push(b'\\');
                out.extend_from_slice(other.encode_utf8(&mut utf8).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::decode_escapes;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(decode_escapes("hello").unwrap(), b"hello");
    }

    #[test]
    fn common_escapes() {
        assert_eq!(decode_escapes("a\\nb\\tc\\r\\0").unwrap(), b"a\nb\tc\r\0");
        assert_eq!(decode_escapes("\\\\n").unwrap(), b"\\n");
    }

    #[test]
    fn hex_escapes() {
        assert_eq!(decode_escapes("\\x41\\x00\\xff").unwrap(), b"A\x00\xff");
    }

    #[test]
    fn bad_hex_escape_rejected() {
        assert!(decode_escapes("\\xZZ").is_err());
        assert!(decode_escapes("\\x4").is_err());
    }

    #[test]
    fn unknown_escape_kept_verbatim() {
        assert_eq!(decode_escapes("\\q").unwrap(), b"\\q");
        assert_eq!(decode_escapes("end\\").unwrap(), b"end\\");
    }
}
