//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::errors::AgentError;
use crate::firmware::inspect::inspect;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Liveness text served at `/`
pub const LIVENESS_TEXT: &str = "Firmware Flashing Backend Running";

/// Liveness handler
pub async fn home_handler() -> &'static str {
    LIVENESS_TEXT
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "fwflash".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// One attached serial port
#[derive(Debug, Serialize)]
pub struct PortInfo {
    pub port: String,
    pub description: String,
    /// Would be picked by auto-detection
    pub recognized: bool,
}

/// Serial ports response
#[derive(Debug, Serialize)]
pub struct PortsResponse {
    pub ports: Vec<PortInfo>,
    pub total: usize,
}

/// Serial ports handler
pub async fn ports_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, AgentError> {
    let orchestrator = &state.orchestrator;
    let keywords = &orchestrator.detection().keywords;

    let ports: Vec<PortInfo> = orchestrator
        .scanner()
        .list_ports()
        .await?
        .into_iter()
        .map(|device| PortInfo {
            recognized: device.matches_any(keywords),
            port: device.port_name,
            description: device.description,
        })
        .collect();
    let total = ports.len();

    Ok(Json(PortsResponse { ports, total }))
}

/// Uploaded file pulled out of a multipart body
struct Upload {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

/// Fields of a flash request
#[derive(Default)]
struct FlashForm {
    firmware: Option<Upload>,
    port: Option<String>,
}

async fn read_flash_form(mut multipart: Multipart) -> Result<FlashForm, AgentError> {
    let mut form = FlashForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AgentError::ValidationError(format!("Failed to read multipart field: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            // `firmware` wins over `file` when both are sent
            "firmware" | "file" => {
                let is_primary = field_name == "firmware";
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    AgentError::ValidationError(format!("Failed to read file data: {}", e))
                })?;
                if is_primary || form.firmware.is_none() {
                    form.firmware = Some(Upload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "port" => {
                let port = field.text().await.map_err(|e| {
                    AgentError::ValidationError(format!("Failed to read port: {}", e))
                })?;
                form.port = Some(port);
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn read_file_field(mut multipart: Multipart, name: &str) -> Result<Option<Upload>, AgentError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AgentError::ValidationError(format!("Failed to read multipart field: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name == name {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| {
                AgentError::ValidationError(format!("Failed to read file data: {}", e))
            })?;
            return Ok(Some(Upload {
                file_name,
                bytes: bytes.to_vec(),
            }));
        }
    }
    Ok(None)
}

fn multipart_or_reject(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Multipart, AgentError> {
    multipart.map_err(|e| AgentError::ValidationError(e.body_text()))
}

/// Successful flash response
#[derive(Debug, Serialize)]
pub struct FlashResponse {
    pub status: &'static str,
    pub flash_summary: FlashSummaryBody,
}

#[derive(Debug, Serialize)]
pub struct FlashSummaryBody {
    pub version: String,
    pub device: String,
    pub date: String,
    pub time: String,
    pub result: &'static str,
}

/// Flash handler: resolve the port, persist the upload, then write it to the board
pub async fn flash_handler(
    State(state): State<Arc<ServerState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AgentError> {
    let form = read_flash_form(multipart_or_reject(multipart)?).await?;
    let upload = form
        .firmware
        .ok_or_else(|| AgentError::ValidationError("No file uploaded".to_string()))?;

    // Rejected requests must not leave files in the upload dir
    let target = state
        .orchestrator
        .resolve_target(form.port.as_deref())
        .await?;

    let path = state
        .uploads
        .persist(upload.file_name.as_deref(), &upload.bytes)
        .await?;
    info!("Flash requested for {} (port: {})", path.display(), target.port);

    let summary = state.orchestrator.flash_to(&path, target).await?;

    Ok(Json(FlashResponse {
        status: "success",
        flash_summary: FlashSummaryBody {
            version: summary.fingerprint,
            device: summary.port,
            date: summary.date,
            time: summary.time,
            result: "Successful",
        },
    }))
}

/// Firmware info response
#[derive(Debug, Serialize)]
pub struct FirmwareInfoResponse {
    pub status: &'static str,
    pub details: FirmwareDetails,
}

#[derive(Debug, Serialize)]
pub struct FirmwareDetails {
    pub version: String,
    pub board: String,
    pub build_date: String,
}

/// Firmware info handler: persist the upload and report its metadata
pub async fn firmware_info_handler(
    State(state): State<Arc<ServerState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AgentError> {
    let upload = read_file_field(multipart_or_reject(multipart)?, "file")
        .await?
        .ok_or_else(|| AgentError::ValidationError("No file uploaded".to_string()))?;

    let path = state
        .uploads
        .persist(upload.file_name.as_deref(), &upload.bytes)
        .await?;
    let info = inspect(&path).await?;

    Ok(Json(FirmwareInfoResponse {
        status: "success",
        details: FirmwareDetails {
            version: info.fingerprint,
            board: info.board,
            build_date: info.inspected_on,
        },
    }))
}
