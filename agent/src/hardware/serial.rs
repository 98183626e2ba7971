//! Serial port enumeration and board detection

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serialport::{SerialPortInfo, SerialPortType};
use tracing::debug;

use crate::errors::AgentError;

/// An attached serial device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialDevice {
    /// OS identifier, e.g. `/dev/ttyUSB0` or `COM3`
    pub port_name: String,

    /// Human-readable label advertised by the device
    pub description: String,
}

impl SerialDevice {
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
        }
    }

    /// Whether the description contains any of `keywords`, ignoring case
    pub fn matches_any(&self, keywords: &[String]) -> bool {
        let description = self.description.to_lowercase();
        keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .any(|k| description.contains(&k))
    }
}

impl From<SerialPortInfo> for SerialDevice {
    fn from(info: SerialPortInfo) -> Self {
        let description = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                let label = [usb.product, usb.manufacturer]
                    .into_iter()
                    .flatten()
                    .filter(|s| !s.trim().is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                if label.is_empty() {
                    format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid)
                } else {
                    label
                }
            }
            SerialPortType::PciPort => "PCI serial port".to_string(),
            SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
            SerialPortType::Unknown => "n/a".to_string(),
        };
        Self {
            port_name: info.port_name,
            description,
        }
    }
}

/// Source of the currently attached serial devices
#[async_trait]
pub trait PortScanner: Send + Sync {
    async fn list_ports(&self) -> Result<Vec<SerialDevice>, AgentError>;
}

/// Enumerates ports through the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortScanner;

#[async_trait]
impl PortScanner for SystemPortScanner {
    async fn list_ports(&self) -> Result<Vec<SerialDevice>, AgentError> {
        let ports = tokio::task::spawn_blocking(serialport::available_ports)
            .await
            .map_err(|e| AgentError::Internal(format!("port scan task failed: {}", e)))??;

        let devices: Vec<SerialDevice> = ports.into_iter().map(SerialDevice::from).collect();
        debug!("Found {} serial ports", devices.len());
        Ok(devices)
    }
}

/// First device whose description matches `keywords`, in enumeration order
pub fn find_board<'a>(devices: &'a [SerialDevice], keywords: &[String]) -> Option<&'a SerialDevice> {
    devices.iter().find(|d| d.matches_any(keywords))
}
