//! Orchestrator tests with stubbed programmer and scanner

use std::path::PathBuf;
use std::time::Duration;

use fwflash::errors::AgentError;
use fwflash::firmware::inspect::fingerprint;
use fwflash::flash::orchestrator::{FlashOrchestrator, FlashTarget};
use fwflash::hardware::serial::SerialDevice;
use fwflash::storage::settings::DetectionSettings;

use crate::common::{orchestrator, programmer_settings, StubBehavior, StubProgrammer, StubScanner};

fn write_firmware(dir: &tempfile::TempDir, contents: &[u8]) -> PathBuf {
    let path = dir.path().join("blink.hex");
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn test_explicit_port_skips_scan() {
    let scanner = StubScanner::empty();
    let orch = orchestrator(StubProgrammer::exiting(0, ""), scanner.clone());

    let target = orch.resolve_target(Some("COM7")).await.unwrap();
    assert_eq!(
        target,
        FlashTarget {
            port: "COM7".to_string(),
            chip: "atmega328p".to_string(),
        }
    );
    assert_eq!(scanner.calls(), 0);
}

#[tokio::test]
async fn test_blank_port_triggers_detection() {
    let scanner = StubScanner::with_arduino("/dev/ttyACM0");
    let orch = orchestrator(StubProgrammer::exiting(0, ""), scanner.clone());

    let target = orch.resolve_target(Some("   ")).await.unwrap();
    assert_eq!(target.port, "/dev/ttyACM0");
    assert_eq!(scanner.calls(), 1);
}

#[tokio::test]
async fn test_detection_picks_first_match() {
    let scanner = StubScanner::new(vec![
        SerialDevice::new("/dev/ttyS0", "n/a"),
        SerialDevice::new("/dev/ttyUSB0", "USB2.0-Serial CH340"),
        SerialDevice::new("/dev/ttyACM0", "Arduino Mega 2560"),
    ]);
    let orch = orchestrator(StubProgrammer::exiting(0, ""), scanner);

    let target = orch.resolve_target(None).await.unwrap();
    assert_eq!(target.port, "/dev/ttyUSB0");
    assert_eq!(target.chip, "atmega328p");
}

#[tokio::test]
async fn test_no_device_does_not_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let firmware = write_firmware(&dir, b":00000001FF\n");
    let programmer = StubProgrammer::exiting(0, "");
    let orch = orchestrator(
        programmer.clone(),
        StubScanner::new(vec![SerialDevice::new("/dev/ttyS0", "PCI serial port")]),
    );

    let result = orch.flash(&firmware, None).await;
    assert!(matches!(result, Err(AgentError::DeviceNotFound(_))));
    assert_eq!(programmer.calls(), 0);
}

#[tokio::test]
async fn test_auto_detect_disabled_requires_port() {
    let dir = tempfile::tempdir().unwrap();
    let firmware = write_firmware(&dir, b"data");
    let programmer = StubProgrammer::exiting(0, "");
    let scanner = StubScanner::with_arduino("/dev/ttyACM0");
    let orch = FlashOrchestrator::new(
        programmer_settings(),
        DetectionSettings {
            auto_detect: false,
            ..Default::default()
        },
        programmer.clone(),
        scanner.clone(),
    );

    let result = orch.flash(&firmware, None).await;
    assert!(matches!(result, Err(AgentError::ValidationError(_))));
    assert_eq!(programmer.calls(), 0);
    assert_eq!(scanner.calls(), 0);
}

#[tokio::test]
async fn test_success_summary() {
    let dir = tempfile::tempdir().unwrap();
    let contents = b":100000000C945C000C946E000C946E000C946E00CA\n";
    let firmware = write_firmware(&dir, contents);
    let programmer = StubProgrammer::exiting(0, "avrdude done.  Thank you.");
    let orch = orchestrator(programmer.clone(), StubScanner::with_arduino("/dev/ttyACM0"));

    let summary = orch.flash(&firmware, None).await.unwrap();
    assert_eq!(summary.port, "/dev/ttyACM0");
    assert_eq!(summary.fingerprint, fingerprint(contents));
    assert!(chrono::NaiveDate::parse_from_str(&summary.date, "%Y-%m-%d").is_ok());
    assert!(chrono::NaiveTime::parse_from_str(&summary.time, "%H:%M:%S").is_ok());
    assert_eq!(programmer.calls(), 1);

    let invocation = programmer.last_invocation().unwrap();
    assert_eq!(invocation.port, "/dev/ttyACM0");
    assert_eq!(invocation.chip, "atmega328p");
    assert_eq!(invocation.protocol, "arduino");
    assert_eq!(invocation.baud_rate, 115200);
    assert_eq!(invocation.firmware_path, firmware);
    assert_eq!(invocation.timeout, Duration::from_secs(120));
}

#[tokio::test]
async fn test_nonzero_exit_relays_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let firmware = write_firmware(&dir, b"data");
    let stderr = "avrdude: stk500_recv(): programmer is not responding\n";
    let programmer = StubProgrammer::exiting(1, stderr);
    let orch = orchestrator(programmer.clone(), StubScanner::empty());

    match orch.flash(&firmware, Some("/dev/ttyUSB3")).await {
        Err(AgentError::ExternalToolFailure(detail)) => assert_eq!(detail, stderr),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(programmer.calls(), 1);
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let firmware = write_firmware(&dir, b"data");
    let orch = orchestrator(
        StubProgrammer::new(StubBehavior::TimeOut),
        StubScanner::empty(),
    );

    let result = orch.flash(&firmware, Some("COM3")).await;
    match result {
        Err(AgentError::ToolTimeout(limit)) => assert_eq!(limit, Duration::from_secs(120)),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_firmware_is_internal() {
    let dir = tempfile::tempdir().unwrap();
    let programmer = StubProgrammer::exiting(0, "");
    let orch = orchestrator(programmer.clone(), StubScanner::empty());

    let result = orch.flash(&dir.path().join("gone.hex"), Some("COM3")).await;
    assert!(matches!(result, Err(AgentError::IoError(_))));
    assert_eq!(programmer.calls(), 0);
}
