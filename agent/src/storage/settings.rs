//! Settings file management
//!
//! Settings come from an optional JSON file, then `FWFLASH_*` environment
//! variables override individual fields. [`Settings::validate`] runs once at
//! startup so a misconfigured programmer is caught before serving requests.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Environment variable naming the settings file
pub const CONFIG_ENV_VAR: &str = "FWFLASH_CONFIG";

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// External programmer configuration
    #[serde(default)]
    pub programmer: ProgrammerSettings,

    /// Serial port auto-detection
    #[serde(default)]
    pub detection: DetectionSettings,

    /// Where uploaded firmware images are written
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            programmer: ProgrammerSettings::default(),
            detection: DetectionSettings::default(),
            upload_dir: default_upload_dir(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allow cross-origin requests from the web frontend
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: true,
        }
    }
}

/// avrdude invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgrammerSettings {
    /// Path to the avrdude executable. A bare name is looked up on `PATH`.
    #[serde(default = "default_tool_path")]
    pub tool_path: PathBuf,

    /// Path to avrdude.conf, passed with `-C`
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Part number passed with `-p` when the port was auto-detected or
    /// supplied by the caller
    #[serde(default = "default_chip")]
    pub default_chip: String,

    /// Programmer protocol passed with `-c`
    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Upper bound on a single avrdude run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tool_path() -> PathBuf {
    PathBuf::from("avrdude")
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/avrdude.conf")
}

fn default_chip() -> String {
    "atmega328p".to_string()
}

fn default_protocol() -> String {
    "arduino".to_string()
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProgrammerSettings {
    fn default() -> Self {
        Self {
            tool_path: default_tool_path(),
            config_path: default_config_path(),
            default_chip: default_chip(),
            protocol: default_protocol(),
            baud_rate: default_baud_rate(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Serial port auto-detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Scan serial ports when the request carries no port
    #[serde(default = "default_true")]
    pub auto_detect: bool,

    /// Case-insensitive substrings matched against port descriptions
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

fn default_keywords() -> Vec<String> {
    vec![
        "arduino".to_string(),
        "usb serial".to_string(),
        "ch340".to_string(),
    ]
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            auto_detect: true,
            keywords: default_keywords(),
        }
    }
}

impl Settings {
    /// Load settings from `path` if given, falling back to defaults, then
    /// apply environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self, AgentError> {
        let mut settings = match path {
            Some(path) => {
                let file = File::new(path);
                if !file.exists().await {
                    return Err(AgentError::ConfigError(format!(
                        "settings file {} does not exist",
                        path.display()
                    )));
                }
                file.read_json::<Settings>().await?
            }
            None => Settings::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Override fields from environment-style lookups
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("FWFLASH_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("FWFLASH_PORT") {
            self.server.port = parse_env("FWFLASH_PORT", &port)?;
        }
        if let Some(level) = lookup("FWFLASH_LOG_LEVEL") {
            self.log_level = level.parse().map_err(AgentError::ConfigError)?;
        }
        if let Some(dir) = lookup("FWFLASH_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(tool) = lookup("FWFLASH_AVRDUDE_PATH") {
            self.programmer.tool_path = PathBuf::from(tool);
        }
        if let Some(conf) = lookup("FWFLASH_AVRDUDE_CONF") {
            self.programmer.config_path = PathBuf::from(conf);
        }
        if let Some(timeout) = lookup("FWFLASH_TIMEOUT_SECS") {
            self.programmer.timeout_secs = parse_env("FWFLASH_TIMEOUT_SECS", &timeout)?;
        }
        Ok(())
    }

    /// Check the settings can drive a flash. Resolves a bare tool name
    /// against `PATH` and stores the resolved location.
    pub fn validate(&mut self) -> Result<(), AgentError> {
        let programmer = &mut self.programmer;

        let tool = resolve_executable(&programmer.tool_path).ok_or_else(|| {
            AgentError::ConfigError(format!(
                "programmer executable {} not found",
                programmer.tool_path.display()
            ))
        })?;
        programmer.tool_path = tool;

        if !programmer.config_path.is_file() {
            return Err(AgentError::ConfigError(format!(
                "programmer config {} not found",
                programmer.config_path.display()
            )));
        }
        if programmer.baud_rate == 0 {
            return Err(AgentError::ConfigError("baud_rate must be positive".to_string()));
        }
        if programmer.timeout_secs == 0 {
            return Err(AgentError::ConfigError("timeout_secs must be positive".to_string()));
        }
        if self.detection.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(AgentError::ConfigError(
                "detection keywords must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AgentError> {
    value
        .trim()
        .parse()
        .map_err(|_| AgentError::ConfigError(format!("invalid value for {}: {}", key, value)))
}

/// Locate an executable. Paths with a directory component are checked
/// as-is, bare names are searched in `PATH`.
pub fn resolve_executable(tool: &Path) -> Option<PathBuf> {
    if tool.components().count() > 1 || tool.is_absolute() {
        return tool.is_file().then(|| tool.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(tool);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}
