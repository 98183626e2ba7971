//! avrdude process runner

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::AgentError;

/// Everything needed for one programmer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashInvocation {
    pub tool_path: PathBuf,
    pub config_path: PathBuf,
    pub chip: String,
    pub protocol: String,
    pub port: String,
    pub baud_rate: u32,
    pub firmware_path: PathBuf,
    pub timeout: Duration,
}

impl FlashInvocation {
    /// `-U` operand writing `path` to flash as Intel HEX
    pub fn write_instruction(path: &Path) -> OsString {
        let mut op = OsString::from("flash:w:");
        op.push(path.as_os_str());
        op.push(":i");
        op
    }

    /// Command-line arguments, without the program itself.
    ///
    /// `-D` disables the chip erase avrdude would otherwise perform; the
    /// Arduino bootloader erases pages as it writes them.
    pub fn args(&self) -> Vec<OsString> {
        vec![
            "-C".into(),
            self.config_path.clone().into_os_string(),
            "-v".into(),
            "-p".into(),
            self.chip.clone().into(),
            "-c".into(),
            self.protocol.clone().into(),
            "-P".into(),
            self.port.clone().into(),
            "-b".into(),
            self.baud_rate.to_string().into(),
            "-D".into(),
            "-U".into(),
            Self::write_instruction(&self.firmware_path),
        ]
    }
}

/// Captured result of a programmer process that ran to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Writes firmware to a device
#[async_trait]
pub trait Programmer: Send + Sync {
    /// Run once and wait for completion or `invocation.timeout`.
    ///
    /// A nonzero exit is reported through [`ToolOutput`], not as an error.
    /// Errors are reserved for spawn failures and timeouts.
    async fn run(&self, invocation: &FlashInvocation) -> Result<ToolOutput, AgentError>;
}

/// Runs the avrdude executable named in the invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct Avrdude;

#[async_trait]
impl Programmer for Avrdude {
    async fn run(&self, invocation: &FlashInvocation) -> Result<ToolOutput, AgentError> {
        let args = invocation.args();
        info!(
            "Running {} {}",
            invocation.tool_path.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let child = Command::new(&invocation.tool_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::Internal(format!(
                    "Failed to start {}: {}",
                    invocation.tool_path.display(),
                    e
                ))
            })?;

        // Dropping the child on timeout kills it
        let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    "Programmer on {} exceeded {:?}, killed",
                    invocation.port, invocation.timeout
                );
                return Err(AgentError::ToolTimeout(invocation.timeout));
            }
        };

        let result = ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("avrdude stdout:\n{}", result.stdout);
        debug!("avrdude stderr:\n{}", result.stderr);

        Ok(result)
    }
}
