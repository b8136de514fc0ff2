//! Utility functions for worksync
//!
//! Small helpers shared across the engine: content hashing for tree
//! comparison, atomic file writing for the settings store, and
//! human-readable byte formatting for progress reporting.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

/// Hash a file's content using SHA-256
///
/// Reads the file in 8KB chunks so large files never need to be resident in
/// memory. Returns the hash as a 64-character hexadecimal string.
///
/// # Errors
///
/// Returns [`WorksyncError::Io`] if the file cannot be opened or read.
pub fn hash_file_content(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Atomic file write (write to temp file then rename)
///
/// Writes `content` to a sibling `.tmp` file and renames it over the target,
/// so readers never observe a partially written file. Used by the settings
/// store, where a torn write would lose the whole link mapping.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Format bytes in human-readable form
///
/// Uses binary units (1024-based). Values under 1 KB are shown as whole
/// numbers; larger values get two decimal places.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
