//! Flash orchestration
//!
//! Resolves the target port, runs the programmer exactly once and turns its
//! exit status into a [`FlashSummary`] or an [`AgentError`]. Nothing is kept
//! between calls.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::errors::AgentError;
use crate::firmware::inspect::fingerprint_file;
use crate::flash::programmer::{FlashInvocation, Programmer};
use crate::hardware::serial::{find_board, PortScanner};
use crate::storage::settings::{DetectionSettings, ProgrammerSettings};

/// Port and part number a flash will target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashTarget {
    pub port: String,
    pub chip: String,
}

/// Record of a successful flash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashSummary {
    /// Content fingerprint of the image written
    pub fingerprint: String,
    /// Port the image was written through
    pub port: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM:SS`
    pub time: String,
}

/// Drives a single flash per call
pub struct FlashOrchestrator {
    programmer_settings: ProgrammerSettings,
    detection: DetectionSettings,
    programmer: Arc<dyn Programmer>,
    scanner: Arc<dyn PortScanner>,
}

impl FlashOrchestrator {
    pub fn new(
        programmer_settings: ProgrammerSettings,
        detection: DetectionSettings,
        programmer: Arc<dyn Programmer>,
        scanner: Arc<dyn PortScanner>,
    ) -> Self {
        Self {
            programmer_settings,
            detection,
            programmer,
            scanner,
        }
    }

    pub fn scanner(&self) -> &Arc<dyn PortScanner> {
        &self.scanner
    }

    pub fn detection(&self) -> &DetectionSettings {
        &self.detection
    }

    /// Pick the port to flash through.
    ///
    /// A caller-supplied port is used as given, without checking that it
    /// exists. Otherwise the first attached device matching the detection
    /// keywords is chosen.
    pub async fn resolve_target(&self, requested: Option<&str>) -> Result<FlashTarget, AgentError> {
        let chip = self.programmer_settings.default_chip.clone();

        if let Some(port) = requested.map(str::trim).filter(|p| !p.is_empty()) {
            return Ok(FlashTarget {
                port: port.to_string(),
                chip,
            });
        }

        if !self.detection.auto_detect {
            return Err(AgentError::ValidationError("No COM port provided".to_string()));
        }

        let devices = self.scanner.list_ports().await?;
        match find_board(&devices, &self.detection.keywords) {
            Some(device) => {
                info!(
                    "Auto-detected board on {} ({})",
                    device.port_name, device.description
                );
                Ok(FlashTarget {
                    port: device.port_name.clone(),
                    chip,
                })
            }
            None => {
                warn!("No matching board among {} serial ports", devices.len());
                Err(AgentError::DeviceNotFound(
                    "No Arduino-compatible serial device detected".to_string(),
                ))
            }
        }
    }

    /// Build the programmer invocation for `firmware` on `target`
    pub fn invocation(&self, firmware: &Path, target: &FlashTarget) -> FlashInvocation {
        let settings = &self.programmer_settings;
        FlashInvocation {
            tool_path: settings.tool_path.clone(),
            config_path: settings.config_path.clone(),
            chip: target.chip.clone(),
            protocol: settings.protocol.clone(),
            port: target.port.clone(),
            baud_rate: settings.baud_rate,
            firmware_path: firmware.to_path_buf(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    /// Resolve the port, then flash a persisted image
    pub async fn flash(
        &self,
        firmware: &Path,
        requested_port: Option<&str>,
    ) -> Result<FlashSummary, AgentError> {
        let target = self.resolve_target(requested_port).await?;
        self.flash_to(firmware, target).await
    }

    /// Flash a persisted image through an already resolved target. No retries.
    ///
    /// A nonzero programmer exit becomes [`AgentError::ExternalToolFailure`]
    /// carrying its stderr unchanged. The device may be partially written in
    /// that case.
    pub async fn flash_to(
        &self,
        firmware: &Path,
        target: FlashTarget,
    ) -> Result<FlashSummary, AgentError> {
        let fingerprint = fingerprint_file(firmware).await?;

        info!(
            "Flashing {} ({}) to {} as {}",
            firmware.display(),
            fingerprint,
            target.port,
            target.chip
        );

        let invocation = self.invocation(firmware, &target);
        let output = self.programmer.run(&invocation).await?;

        if !output.success() {
            error!(
                "Flash on {} failed with exit code {:?}",
                target.port, output.exit_code
            );
            return Err(AgentError::ExternalToolFailure(output.stderr));
        }

        let now = Local::now();
        info!("Flash on {} succeeded", target.port);
        Ok(FlashSummary {
            fingerprint,
            port: target.port,
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M:%S").to_string(),
        })
    }
}
