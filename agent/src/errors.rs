//! Error types for the flashing agent

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Main error type for the flashing agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The programmer ran but exited nonzero. Carries its stderr verbatim.
    #[error("{0}")]
    ExternalToolFailure(String),

    #[error("Programmer timed out after {0:?}")]
    ToolTimeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Whether the error was caused by the caller rather than the agent
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AgentError::ValidationError(_) | AgentError::DeviceNotFound(_)
        )
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}

/// JSON body for error responses
#[derive(Debug, serde::Serialize)]
struct ErrorBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl AgentError {
    /// HTTP status for this error's tier
    pub fn status_code(&self) -> StatusCode {
        match self {
            AgentError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AgentError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            AgentError::ExternalToolFailure(_) | AgentError::ToolTimeout(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match self {
            AgentError::ExternalToolFailure(stderr) => {
                tracing::error!(status = %status, "programmer reported failure");
                ErrorBody {
                    status: "failed",
                    message: None,
                    error: Some(stderr),
                }
            }
            ref err @ AgentError::ToolTimeout(_) => {
                tracing::error!(status = %status, error = %err, "programmer timed out");
                ErrorBody {
                    status: "failed",
                    message: None,
                    error: Some(err.to_string()),
                }
            }
            ref err if err.is_client_error() => {
                tracing::warn!(status = %status, error = %err, "request rejected");
                ErrorBody {
                    status: "error",
                    message: Some(client_message(err)),
                    error: None,
                }
            }
            err => {
                tracing::error!(status = %status, error = %err, "request failed");
                ErrorBody {
                    status: "error",
                    message: Some(err.to_string()),
                    error: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Caller-facing message without the variant prefix
fn client_message(err: &AgentError) -> String {
    match err {
        AgentError::ValidationError(msg) | AgentError::DeviceNotFound(msg) => msg.clone(),
        other => other.to_string(),
    }
}
