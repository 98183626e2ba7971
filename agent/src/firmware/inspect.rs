//! Firmware image inspection
//!
//! Board inference is a substring heuristic over the file read as text: the
//! AVR device signatures `1E95` and `1E98` are looked for anywhere in the
//! upper-cased contents. It is not an Intel HEX or ELF parser. Binary images
//! that are not valid UTF-8 come back as [`BOARD_UNKNOWN`], and any chip
//! outside the two known families reads as [`BOARD_UNKNOWN_AVR`].

use std::path::Path;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::utils::sha256_hex;

/// Length of the hex fingerprint reported as the firmware version
pub const FINGERPRINT_LEN: usize = 12;

pub const BOARD_UNO_NANO: &str = "ATmega328P (Arduino UNO/Nano)";
pub const BOARD_MEGA: &str = "ATmega2560 (Arduino Mega)";
pub const BOARD_UNKNOWN_AVR: &str = "AVR (Unknown HEX MCU)";
pub const BOARD_UNKNOWN: &str = "Unknown";

const SIGNATURE_ATMEGA328P: &str = "1E95";
const SIGNATURE_ATMEGA2560: &str = "1E98";

/// Metadata derived from a firmware image without flashing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub fingerprint: String,
    pub board: String,
    /// Date of inspection, `YYYY-MM-DD`
    pub inspected_on: String,
}

/// First [`FINGERPRINT_LEN`] hex characters of the SHA-256 of `data`
pub fn fingerprint(data: &[u8]) -> String {
    let mut digest = sha256_hex(data);
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Fingerprint of a file on disk
pub async fn fingerprint_file(path: &Path) -> Result<String, AgentError> {
    let bytes = File::new(path).read_bytes().await?;
    Ok(fingerprint(&bytes))
}

/// Guess the board from firmware text
pub fn infer_board_from_text(text: &str) -> &'static str {
    let upper = text.to_uppercase();
    if upper.contains(SIGNATURE_ATMEGA328P) {
        BOARD_UNO_NANO
    } else if upper.contains(SIGNATURE_ATMEGA2560) {
        BOARD_MEGA
    } else {
        BOARD_UNKNOWN_AVR
    }
}

/// Guess the board from a file on disk. Read or decode failures yield
/// [`BOARD_UNKNOWN`].
pub async fn infer_board(path: &Path) -> &'static str {
    match File::new(path).read_string().await {
        Ok(text) => infer_board_from_text(&text),
        Err(_) => BOARD_UNKNOWN,
    }
}

/// Today's local date as `YYYY-MM-DD`
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Inspect a persisted firmware image
pub async fn inspect(path: &Path) -> Result<FirmwareInfo, AgentError> {
    let fingerprint = fingerprint_file(path).await?;
    let board = infer_board(path).await;
    Ok(FirmwareInfo {
        fingerprint,
        board: board.to_string(),
        inspected_on: today(),
    })
}
