//! Probe backend registration and dispatch
//!
//! A centralized registry for the probe backends compiled into this
//! build, with dynamic help text generation and name-to-backend
//! dispatch.

use jflash_core::ProbeBackend;

/// Information about a probe backend
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "jlink")]
    programmers.push(ProgrammerInfo {
        name: "jlink",
        aliases: &["j-link", "segger"],
        description: "SEGGER J-Link via the vendor JLinkARM library",
    });

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory emulated probe for testing",
    });

    programmers
}

/// Comma-separated backend names for CLI help text
pub fn programmer_names_short() -> String {
    available_programmers()
        .iter()
        .map(|p| p.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Generate help text listing all available backends
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No probe backends available (recompile with backend features enabled)"
            .to_string();
    }

    let mut help = String::from("Available probe backends:\n");
    for p in &programmers {
        help.push_str(&format!("  {:8} - {}\n", p.name, p.description));
    }
    help
}

/// Open a backend by name.
#[allow(unused_variables)]
pub fn open_backend(name: &str) -> Result<Box<dyn ProbeBackend>, Box<dyn std::error::Error>> {
    match name {
        #[cfg(feature = "jlink")]
        "jlink" | "j-link" | "segger" => {
            log::debug!("Loading J-Link backend...");
            Ok(Box::new(jflash_jlink::JlinkBackend::load()?))
        }

        #[cfg(feature = "dummy")]
        "dummy" => Ok(Box::new(jflash_dummy::DummyProbe::demo())),

        _ => Err(unknown_programmer_error(name)),
    }
}

fn unknown_programmer_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown probe backend: {}\n\n", name);
    msg.push_str(&programmer_help());
    msg.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_text_lists_every_registered_backend() {
        let names = programmer_names_short();
        let help = programmer_help();
        for p in available_programmers() {
            assert!(names.contains(p.name));
            assert!(help.contains(p.name));
        }
    }

    #[test]
    fn unknown_backend_is_rejected_with_help() {
        let err = open_backend("nonexistent").err().unwrap();
        assert!(err.to_string().contains("Unknown probe backend"));
    }
}
