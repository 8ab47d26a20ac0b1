//! Programmer lifecycle, detection and RTT policy tests, driven through
//! the in-memory dummy probe.

use std::path::Path;
use std::time::Duration;

use jflash_core::{
    Error, FirmwareImage, ProbeBackend, ProbeIdentity, Programmer, RttState, CORE_PRIORITY,
};
use jflash_dummy::DummyProbe;

const SERIAL: u32 = 600100000;

fn programmer_for(probe: &DummyProbe) -> Programmer {
    Programmer::new(Box::new(probe.clone()), ProbeIdentity::Usb(SERIAL))
}

/// A probe that attaches to anything and carries an STM32F765 IDCODE.
fn f765_probe() -> DummyProbe {
    let probe = DummyProbe::new(SERIAL);
    probe.set_memory(0xE004_2000, 0x1001_0451);
    probe
}

#[test]
fn close_on_unopened_session_is_a_no_op() {
    let probe = DummyProbe::new(SERIAL);
    let mut prog = programmer_for(&probe);

    prog.close();
    prog.close();
    prog.close();

    assert!(!prog.is_open());
    assert_eq!(probe.open_count(), 0);
    assert_eq!(probe.close_calls(), 0, "native close must never run on an unopened handle");
}

#[test]
fn close_after_connect_is_idempotent() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);

    prog.connect(Some("STM32F765ZG")).unwrap();
    assert!(prog.is_open());

    prog.close();
    prog.close();
    prog.close();

    assert!(!prog.is_open());
    assert_eq!(probe.open_count(), 1);
    assert_eq!(probe.close_calls(), 1, "native close must run exactly once");
}

#[test]
fn drop_closes_the_session() {
    let probe = f765_probe();
    {
        let mut prog = programmer_for(&probe);
        prog.connect(None).unwrap();
        assert!(prog.is_open());
    }
    assert!(!probe.is_open());
    assert_eq!(probe.close_calls(), 1);
}

#[test]
fn detection_stops_at_first_attachable_core() {
    let probe = DummyProbe::new(SERIAL);
    probe.attach_only_on(&["Cortex-M3"]);
    probe.set_memory(0xE004_2000, 0x1001_0451);

    let mut prog = programmer_for(&probe);
    let target = prog.connect(None).unwrap().clone();

    // M7 and M4 were tried and refused, M3 attached, M0 never attempted.
    assert_eq!(
        probe.connect_attempts(),
        vec!["Cortex-M7", "Cortex-M4", "Cortex-M3"]
    );
    assert_eq!(target.core.as_deref(), Some("Cortex-M3"));
    assert_eq!(target.device, "STM32F765ZG");
    assert_eq!(target.idcode, Some(0x1001_0451));
    // The concrete part was re-declared for flash algorithm selection.
    assert_eq!(probe.set_device_calls(), vec!["STM32F765ZG"]);
}

#[test]
fn detection_exhausts_all_cores_once_each() {
    let probe = DummyProbe::new(SERIAL);
    probe.attach_nothing();

    let mut prog = programmer_for(&probe);
    let err = prog.connect(None).unwrap_err();

    assert!(matches!(err, Error::Detection { .. }));
    let attempts = probe.connect_attempts();
    assert_eq!(attempts.len(), CORE_PRIORITY.len());
    for (attempt, core) in attempts.iter().zip(CORE_PRIORITY) {
        assert_eq!(attempt, core);
    }
    // The failed connect must not leak the open handle.
    assert!(!probe.is_open());
    assert_eq!(probe.close_calls(), 1);
}

#[test]
fn detection_without_idcode_falls_back_to_core_name() {
    let probe = DummyProbe::new(SERIAL);
    probe.attach_only_on(&["Cortex-M0"]);

    let mut prog = programmer_for(&probe);
    let target = prog.connect(None).unwrap().clone();

    assert_eq!(target.device, "Cortex-M0");
    assert_eq!(target.idcode, None);
}

#[test]
fn explicit_mcu_skips_detection() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);

    let target = prog.connect(Some("STM32F103RE")).unwrap().clone();

    assert_eq!(target.device, "STM32F103RE");
    assert_eq!(target.core, None);
    assert_eq!(probe.connect_attempts(), vec!["STM32F103RE"]);
}

#[test]
fn flash_writes_segments_and_closes_once() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);

    let image = FirmwareImage::from_raw(vec![0xAB; 6], 0x0800_0000);
    let written = prog.flash(&image, Some("STM32F765ZG"), true).unwrap();

    assert_eq!(written, 6);
    assert_eq!(probe.downloads(), vec![(0x0800_0000, vec![0xAB; 6])]);
    assert_eq!(probe.reset_count(), 1);
    assert!(!prog.is_open(), "flash must close the session it opened");
    assert_eq!(probe.close_calls(), 1);
}

#[test]
fn flash_without_reset_leaves_core_alone() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);

    let image = FirmwareImage::from_raw(vec![1, 2, 3], 0x0800_0000);
    prog.flash(&image, Some("STM32F765ZG"), false).unwrap();

    assert_eq!(probe.reset_count(), 0);
}

#[test]
fn flash_failure_still_closes_exactly_once() {
    let probe = f765_probe();
    probe.fail_downloads(-1);
    let mut prog = programmer_for(&probe);

    let image = FirmwareImage::from_raw(vec![0u8; 16], 0x0800_0000);
    let err = prog.flash(&image, Some("STM32F765ZG"), true).unwrap_err();

    assert!(matches!(err, Error::FlashWrite { code: -1, .. }));
    assert!(!prog.is_open());
    assert_eq!(probe.close_calls(), 1);
    assert_eq!(probe.reset_count(), 0, "no reset after a failed write");
}

#[test]
fn flash_rejects_segment_wrapping_the_address_space() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);

    // 32 KiB starting 16 KiB below the top of the address space: the
    // second chunk would wrap past 0xFFFFFFFF.
    let image = FirmwareImage::from_raw(vec![0u8; 32 * 1024], 0xFFFF_C000);
    let err = prog.flash(&image, Some("STM32F765ZG"), false).unwrap_err();

    assert!(matches!(err, Error::ImageFormat(_)));
    assert!(!prog.is_open());
    assert_eq!(probe.close_calls(), 1);
}

#[test]
fn unrecognized_image_fails_before_any_native_call() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);

    let err = prog
        .flash_file(Path::new("firmware.elf"), None, true)
        .unwrap_err();

    assert!(matches!(err, Error::ImageFormat(_)));
    assert_eq!(probe.open_count(), 0, "a bad container must not touch the probe");
    assert_eq!(probe.connect_attempts().len(), 0);
    assert_eq!(probe.downloads().len(), 0);
}

#[test]
fn erase_closes_once_on_success_and_failure() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);
    prog.erase(Some("STM32F765ZG")).unwrap();
    assert_eq!(probe.erase_count(), 1);
    assert_eq!(probe.close_calls(), 1);

    let failing = f765_probe();
    failing.fail_erase(-5);
    let mut prog = programmer_for(&failing);
    let err = prog.erase(Some("STM32F765ZG")).unwrap_err();
    assert!(matches!(err, Error::Erase { code: -5 }));
    assert_eq!(failing.close_calls(), 1);
}

#[test]
fn reset_requires_an_attached_session() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);

    assert!(prog.reset(false).is_err());

    prog.connect(None).unwrap();
    prog.reset(false).unwrap();
    assert_eq!(probe.reset_count(), 1);
    prog.close();
}

#[test]
fn rtt_requires_start() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);
    prog.connect(None).unwrap();

    assert!(matches!(prog.rtt_read(64), Err(Error::RttNotStarted)));
    assert!(matches!(
        prog.rtt_write(b"x", 3, Duration::ZERO),
        Err(Error::RttNotStarted)
    ));
}

#[test]
fn rtt_start_requires_attachment() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);
    assert!(prog.start_rtt(Duration::ZERO, None).is_err());
}

#[test]
fn rtt_read_is_non_blocking() {
    let probe = f765_probe();
    probe.push_rtt_up(b"telemetry");
    let mut prog = programmer_for(&probe);
    prog.connect(None).unwrap();
    prog.start_rtt(Duration::ZERO, None).unwrap();

    assert_eq!(prog.rtt_read(4).unwrap(), b"tele");
    assert_eq!(prog.rtt_read(64).unwrap(), b"metry");
    // Empty buffer: returns empty immediately, no error.
    assert_eq!(prog.rtt_read(64).unwrap(), b"");
}

#[test]
fn rtt_write_retries_until_accepted() {
    let probe = f765_probe();
    probe.script_rtt_writes(&[0, 0, 4]);
    let mut prog = programmer_for(&probe);
    prog.connect(None).unwrap();
    prog.start_rtt(Duration::ZERO, None).unwrap();

    let outcome = prog.rtt_write(b"ping", 10, Duration::ZERO).unwrap();

    assert_eq!(outcome.written, 4);
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.delivered());
    assert_eq!(probe.rtt_write_attempts(), 3);
    assert_eq!(probe.rtt_down(), b"ping");
}

#[test]
fn rtt_write_gives_up_after_configured_retries() {
    let probe = f765_probe();
    probe.script_rtt_writes(&[0, 0, 0, 0, 0, 0]);
    let mut prog = programmer_for(&probe);
    prog.connect(None).unwrap();
    prog.start_rtt(Duration::ZERO, None).unwrap();

    let outcome = prog.rtt_write(b"ping", 4, Duration::ZERO).unwrap();

    assert_eq!(outcome.written, 0);
    assert_eq!(outcome.attempts, 4);
    assert!(!outcome.delivered());
    assert_eq!(probe.rtt_write_attempts(), 4, "exactly `retries` attempts");
}

#[test]
fn rtt_write_always_attempts_at_least_once() {
    let probe = f765_probe();
    probe.script_rtt_writes(&[0]);
    let mut prog = programmer_for(&probe);
    prog.connect(None).unwrap();
    prog.start_rtt(Duration::ZERO, None).unwrap();

    // retries below 1 is clamped to a single attempt.
    let outcome = prog.rtt_write(b"x", 0, Duration::ZERO).unwrap();

    assert_eq!(outcome.written, 0);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(probe.rtt_write_attempts(), 1);
}

#[test]
fn rtt_control_block_override_reaches_backend() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);
    prog.connect(None).unwrap();
    prog.start_rtt(Duration::ZERO, Some(0x2000_0400)).unwrap();
    assert_eq!(probe.rtt_control_block(), Some(0x2000_0400));
}

#[test]
fn stop_rtt_is_idempotent_and_close_stops_rtt() {
    let probe = f765_probe();
    let mut prog = programmer_for(&probe);
    prog.connect(None).unwrap();

    prog.stop_rtt().unwrap();
    assert_eq!(prog.rtt_state(), RttState::Stopped);

    prog.start_rtt(Duration::ZERO, None).unwrap();
    assert_eq!(prog.rtt_state(), RttState::Started);
    prog.stop_rtt().unwrap();
    prog.stop_rtt().unwrap();

    prog.start_rtt(Duration::ZERO, None).unwrap();
    prog.close();
    assert_eq!(prog.rtt_state(), RttState::Stopped);
}

#[test]
fn from_options_enforces_exclusive_identity() {
    let probe = DummyProbe::new(SERIAL);
    assert!(Programmer::from_options(Box::new(probe.clone()), Some(SERIAL), None).is_ok());
    assert!(Programmer::from_options(Box::new(probe.clone()), None, Some("host:19020")).is_ok());
    assert!(matches!(
        Programmer::from_options(Box::new(probe.clone()), Some(SERIAL), Some("host:19020")),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        Programmer::from_options(Box::new(probe), None, None),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn probe_enumeration_lists_serials() {
    let probe = DummyProbe::new(SERIAL);
    let mut prog = programmer_for(&probe);
    let probes = prog.probe().unwrap();
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].serial, SERIAL);
}
