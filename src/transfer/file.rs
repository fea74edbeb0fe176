//! Atomic file operations for exports and backups.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file next to the target (`<name>.tmp`)
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidArgument(format!("not a file path: {}", path.display())))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Atomically write `content` as `file_name` inside `dir`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the write fails.
pub fn write_into(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    atomic_write(&path, content)?;
    Ok(path)
}

/// Read a file for import.
///
/// # Errors
///
/// Returns `Error::InvalidImportFile` if the file is missing or not UTF-8.
pub fn read_import_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        Error::InvalidImportFile(format!("Failed to read {}: {e}", path.display()))
    })
}
