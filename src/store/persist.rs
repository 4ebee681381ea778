//! JSON document persistence for the aggregate record

use chrono::Utc;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::record::AggregateRecord;
use super::StoreError;

/// Read the persisted record, creating a zero-valued one if none exists.
///
/// A corrupt document is logged and left on disk; the caller gets a fresh
/// record and the next successful save replaces the bad file.
pub fn load(path: &Path) -> AggregateRecord {
    if !path.exists() {
        let record = AggregateRecord::new(Utc::now());
        match save(path, &record) {
            Ok(()) => info!("Created empty stats store at {}", path.display()),
            Err(e) => warn!("Failed to create stats store at {}: {}", path.display(), e),
        }
        return record;
    }

    match read(path) {
        Ok(record) => record,
        Err(e) => {
            error!("Failed to read stats store {}: {}", path.display(), e);
            AggregateRecord::new(Utc::now())
        }
    }
}

fn read(path: &Path) -> Result<AggregateRecord, StoreError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// Serialize and write `record` atomically
pub fn save(path: &Path, record: &AggregateRecord) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(record)?;
    write_atomic(path, &data)
}

/// Write to a sibling temp file, fsync, then rename over the target
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_path(path);
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }

    // Atomic rename
    fs::rename(&temp_path, path)?;
    sync_parent(path)?;
    Ok(())
}

/// Flush the directory entry so the rename itself survives a crash
#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
