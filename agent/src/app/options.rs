//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::storage::settings::{DetectionSettings, ProgrammerSettings, Settings};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Server configuration
    pub server: ServerOptions,

    /// Programmer invocation
    pub programmer: ProgrammerSettings,

    /// Serial port auto-detection
    pub detection: DetectionSettings,

    /// Upload directory
    pub upload_dir: PathBuf,

    /// Maximum wait for in-flight requests on shutdown
    pub max_shutdown_delay: Duration,
}

impl From<&Settings> for AppOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
                enable_cors: settings.server.enable_cors,
            },
            programmer: settings.programmer.clone(),
            detection: settings.detection.clone(),
            upload_dir: settings.upload_dir.clone(),
            // A flash in progress may take the full programmer timeout
            max_shutdown_delay: Duration::from_secs(
                settings.programmer.timeout_secs.saturating_add(5),
            ),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Attach a permissive CORS layer
    pub enable_cors: bool,
}
