//! Real subprocess tests.
//!
//! `/bin/sh -C <script> ...` treats `-C` as its noclobber flag and runs the
//! "config file" as a script with the remaining avrdude arguments as `$@`,
//! so a shell script can stand in for avrdude without being made executable.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tower::ServiceExt;

use fwflash::errors::AgentError;
use fwflash::firmware::inspect::fingerprint;
use fwflash::flash::orchestrator::FlashOrchestrator;
use fwflash::flash::programmer::{Avrdude, FlashInvocation, Programmer};
use fwflash::storage::settings::{DetectionSettings, ProgrammerSettings};

use crate::common::{body_json, multipart_request, test_app, Part, StubScanner};

fn fake_avrdude(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("avrdude.conf");
    std::fs::write(&path, script).unwrap();
    path
}

fn invocation(config_path: PathBuf, timeout: Duration) -> FlashInvocation {
    FlashInvocation {
        tool_path: PathBuf::from("/bin/sh"),
        config_path,
        chip: "atmega2560".to_string(),
        protocol: "arduino".to_string(),
        port: "/dev/ttyUSB9".to_string(),
        baud_rate: 115200,
        firmware_path: PathBuf::from("/tmp/fw.hex"),
        timeout,
    }
}

#[tokio::test]
async fn test_captures_exit_code_and_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let conf = fake_avrdude(
        dir.path(),
        "printf '%s ' \"$@\"\nprintf 'avrdude: ser_open(): cannot open device' >&2\nexit 1\n",
    );

    let output = Avrdude
        .run(&invocation(conf, Duration::from_secs(10)))
        .await
        .unwrap();

    assert_eq!(output.exit_code, Some(1));
    assert!(!output.success());
    assert_eq!(output.stderr, "avrdude: ser_open(): cannot open device");
    assert_eq!(
        output.stdout.trim(),
        "-v -p atmega2560 -c arduino -P /dev/ttyUSB9 -b 115200 -D -U flash:w:/tmp/fw.hex:i"
    );
}

#[tokio::test]
async fn test_timeout_kills_programmer() {
    let dir = tempfile::tempdir().unwrap();
    let conf = fake_avrdude(dir.path(), "exec sleep 30\n");

    let started = Instant::now();
    let result = Avrdude
        .run(&invocation(conf, Duration::from_millis(300)))
        .await;

    match result {
        Err(err @ AgentError::ToolTimeout(_)) => {
            assert_eq!(err.to_string(), "Programmer timed out after 300ms");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_flash_endpoint_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let conf = fake_avrdude(dir.path(), "echo 'avrdude done.  Thank you.' >&2\nexit 0\n");

    let orchestrator = FlashOrchestrator::new(
        ProgrammerSettings {
            tool_path: PathBuf::from("/bin/sh"),
            config_path: conf,
            timeout_secs: 10,
            ..Default::default()
        },
        DetectionSettings::default(),
        Arc::new(Avrdude),
        StubScanner::with_arduino("/dev/ttyACM1"),
    );
    let (app, _) = test_app(dir.path(), orchestrator).await;

    let firmware = b":00000001FF\n";
    let response = app
        .oneshot(multipart_request(
            "/flash",
            &[Part::File {
                name: "firmware",
                file_name: "blink.hex",
                bytes: firmware,
            }],
        ))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["flash_summary"]["device"], "/dev/ttyACM1");
    assert_eq!(json["flash_summary"]["version"], fingerprint(firmware));
}
