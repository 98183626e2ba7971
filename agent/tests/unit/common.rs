//! Shared fixtures: stub programmer and port scanner, multipart bodies

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;

use fwflash::errors::AgentError;
use fwflash::flash::orchestrator::FlashOrchestrator;
use fwflash::flash::programmer::{FlashInvocation, Programmer, ToolOutput};
use fwflash::hardware::serial::{PortScanner, SerialDevice};
use fwflash::server::serve::router;
use fwflash::server::state::ServerState;
use fwflash::storage::settings::{DetectionSettings, ProgrammerSettings};
use fwflash::storage::uploads::UploadStore;

/// What the stub programmer does when run
#[derive(Debug, Clone)]
pub enum StubBehavior {
    Exit { code: i32, stderr: String },
    TimeOut,
}

/// Programmer that records invocations instead of spawning anything
pub struct StubProgrammer {
    behavior: StubBehavior,
    calls: AtomicUsize,
    last: Mutex<Option<FlashInvocation>>,
}

impl StubProgrammer {
    pub fn new(behavior: StubBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    pub fn exiting(code: i32, stderr: &str) -> Arc<Self> {
        Self::new(StubBehavior::Exit {
            code,
            stderr: stderr.to_string(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_invocation(&self) -> Option<FlashInvocation> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl Programmer for StubProgrammer {
    async fn run(&self, invocation: &FlashInvocation) -> Result<ToolOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(invocation.clone());

        match &self.behavior {
            StubBehavior::Exit { code, stderr } => Ok(ToolOutput {
                exit_code: Some(*code),
                stdout: String::new(),
                stderr: stderr.clone(),
            }),
            StubBehavior::TimeOut => Err(AgentError::ToolTimeout(invocation.timeout)),
        }
    }
}

/// Scanner returning a fixed device list
pub struct StubScanner {
    devices: Vec<SerialDevice>,
    calls: AtomicUsize,
}

impl StubScanner {
    pub fn new(devices: Vec<SerialDevice>) -> Arc<Self> {
        Arc::new(Self {
            devices,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn with_arduino(port: &str) -> Arc<Self> {
        Self::new(vec![
            SerialDevice::new("/dev/ttyS0", "n/a"),
            SerialDevice::new(port, "Arduino Uno"),
        ])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortScanner for StubScanner {
    async fn list_ports(&self) -> Result<Vec<SerialDevice>, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.clone())
    }
}

pub fn programmer_settings() -> ProgrammerSettings {
    ProgrammerSettings {
        tool_path: "/usr/bin/avrdude".into(),
        config_path: "/etc/avrdude.conf".into(),
        ..Default::default()
    }
}

pub fn orchestrator(
    programmer: Arc<dyn Programmer>,
    scanner: Arc<dyn PortScanner>,
) -> FlashOrchestrator {
    FlashOrchestrator::new(
        programmer_settings(),
        DetectionSettings::default(),
        programmer,
        scanner,
    )
}

/// Router over a fresh upload directory inside `dir`
pub async fn test_app(dir: &Path, orchestrator: FlashOrchestrator) -> (Router, UploadStore) {
    let uploads = UploadStore::open(dir.join("uploads")).await.unwrap();
    let state = Arc::new(ServerState::new(uploads.clone(), Arc::new(orchestrator)));
    (router(state, true), uploads)
}

/// A multipart form part
pub enum Part<'a> {
    File {
        name: &'a str,
        file_name: &'a str,
        bytes: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

const BOUNDARY: &str = "----fwflash-test-boundary";

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                file_name,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
