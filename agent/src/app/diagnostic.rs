//! `--diagnostic` report

use anyhow::Context;

use crate::hardware::serial::{PortScanner, SystemPortScanner};
use crate::storage::settings::{resolve_executable, Settings};
use crate::utils::version_info;

/// Print settings validation and attached serial ports to stdout
pub async fn run_diagnostic(settings: Settings) -> anyhow::Result<()> {
    let version = version_info();
    println!("fwflash {} ({}, built {})", version.version, version.git_hash, version.build_time);
    println!();

    let programmer = &settings.programmer;
    match resolve_executable(&programmer.tool_path) {
        Some(path) => println!("[OK]   programmer: {}", path.display()),
        None => println!("[FAIL] programmer not found: {}", programmer.tool_path.display()),
    }
    if programmer.config_path.is_file() {
        println!("[OK]   config: {}", programmer.config_path.display());
    } else {
        println!("[FAIL] config not found: {}", programmer.config_path.display());
    }

    let mut validated = settings.clone();
    match validated.validate() {
        Ok(()) => println!("[OK]   settings valid"),
        Err(e) => println!("[FAIL] {}", e),
    }
    println!();

    let devices = SystemPortScanner
        .list_ports()
        .await
        .context("listing serial ports")?;
    println!("Serial ports ({}):", devices.len());
    for device in &devices {
        let marker = if device.matches_any(&settings.detection.keywords) {
            "*"
        } else {
            " "
        };
        println!(" {} {:<20} {}", marker, device.port_name, device.description);
    }
    if devices.iter().any(|d| d.matches_any(&settings.detection.keywords)) {
        println!();
        println!("* = selected by auto-detection when no port is given (first match wins)");
    }

    Ok(())
}
