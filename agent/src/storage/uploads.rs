//! Upload directory management
//!
//! Every submitted firmware image is written once under a fresh name and
//! never touched again. Nothing is cleaned up.

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::Utc;
use tracing::debug;

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::utils::sanitize_file_name;

/// Name used when the client sends no usable file name
pub const FALLBACK_FILE_NAME: &str = "firmware.bin";

/// Gives up after this many same-name collisions in a row
const MAX_NAME_ATTEMPTS: u32 = 64;

/// Append-only store for uploaded firmware images
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: Dir,
}

impl UploadStore {
    /// Create the upload directory if needed and resolve it to an absolute
    /// path.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let dir = Dir::new(dir);
        dir.create().await?;
        let dir = dir.canonicalize().await?;
        Ok(Self { dir })
    }

    /// Get the upload directory
    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    /// Persist `contents` and return the absolute path of the new file.
    ///
    /// The name is `<timestamp>_<original>` where the timestamp has
    /// nanosecond resolution. Files are created exclusively, so a collision
    /// moves on to a suffixed name rather than overwriting.
    pub async fn persist(
        &self,
        original_name: Option<&str>,
        contents: &[u8],
    ) -> Result<PathBuf, AgentError> {
        let name = original_name
            .and_then(sanitize_file_name)
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
        let stamp = Utc::now().format("%Y%m%d%H%M%S%9f").to_string();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 0 {
                format!("{}_{}", stamp, name)
            } else {
                format!("{}-{}_{}", stamp, attempt, name)
            };
            let file = self.dir.file(&file_name);

            match file.write_new(contents).await {
                Ok(()) => {
                    debug!(
                        "Stored upload {} ({} bytes)",
                        file.path().display(),
                        contents.len()
                    );
                    return Ok(file.path().to_path_buf());
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(AgentError::Internal(format!(
            "could not find a free name for upload {}",
            name
        )))
    }
}
