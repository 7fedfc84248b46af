//! Batch directory scanner
//!
//! The root directory holds one subdirectory per batch, each containing CAR
//! files named `<content id>.car`. Files still carrying a hyphen are in a
//! non-final naming state and are left alone.
//!
//! Results come back oldest first: batches are visited by mtime and the
//! flattened list is then stable-sorted by file mtime, so batch order breaks
//! ties.

use carcopy_ids::ContentId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, warn};

use crate::error::{CopyError, Result};

pub const CAR_EXTENSION: &str = "car";

/// One discovered CAR file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarFileInfo {
    /// File base name, e.g. `bafk....car`
    pub name: String,
    pub path: PathBuf,
    pub content_id: ContentId,
    /// Modification time at scan time; only used for ordering.
    pub mod_time: SystemTime,
}

/// Return the identifier part of `name` if it looks like a finished CAR file.
pub fn candidate_stem(name: &str) -> Option<&str> {
    let stem = name.strip_suffix(CAR_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() || stem.contains('-') {
        return None;
    }
    Some(stem)
}

/// Scan `root` and return every eligible CAR file, oldest first.
///
/// Failing to read the root or a batch directory aborts the scan. A bad file
/// name or a file that vanishes mid-scan only drops that file.
pub fn scan_car_files(root: &Path) -> Result<Vec<CarFileInfo>> {
    let batches = list_batches(root)?;

    let mut car_files = Vec::new();
    for batch_dir in &batches {
        debug!(batch = %batch_dir.display(), "Scanning batch");
        scan_batch(batch_dir, &mut car_files)?;
    }

    car_files.sort_by_key(|f| f.mod_time);
    Ok(car_files)
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let read_err = |source| CopyError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir)
        .map_err(read_err)?
        .collect::<io::Result<Vec<_>>>()
        .map_err(read_err)?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

fn list_batches(root: &Path) -> Result<Vec<PathBuf>> {
    let mut batches = Vec::new();
    for entry in read_dir_sorted(root)? {
        let path = entry.path();
        let metadata = entry.metadata().map_err(|source| CopyError::ReadDir {
            path: path.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            continue;
        }
        let modified = metadata.modified().map_err(|source| CopyError::ReadDir {
            path: path.clone(),
            source,
        })?;
        batches.push((path, modified));
    }

    batches.sort_by_key(|(_, modified)| *modified);
    Ok(batches.into_iter().map(|(path, _)| path).collect())
}

fn scan_batch(batch_dir: &Path, car_files: &mut Vec<CarFileInfo>) -> Result<()> {
    for entry in read_dir_sorted(batch_dir)? {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                debug!(batch = %batch_dir.display(), name = ?raw, "Skipping non UTF-8 file name");
                continue;
            }
        };
        if candidate_stem(&name).is_none() {
            continue;
        }
        if let Some(info) = car_file_info(entry.path(), name, entry.metadata()) {
            car_files.push(info);
        }
    }
    Ok(())
}

/// Build the entry for one candidate file, or `None` if it must be skipped.
///
/// `metadata` is the file-info lookup for `path`; a failed lookup (the file
/// vanished between listing and stat) only skips this file.
fn car_file_info(
    path: PathBuf,
    name: String,
    metadata: io::Result<fs::Metadata>,
) -> Option<CarFileInfo> {
    let stem = candidate_stem(&name)?;

    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "Failed to get file info, skipping");
            return None;
        }
    };
    if metadata.is_dir() {
        return None;
    }

    let content_id = match ContentId::parse(stem) {
        Ok(id) => id,
        Err(err) => {
            error!(file = %path.display(), error = %err, "File name is not a valid content ID");
            return None;
        }
    };

    let mod_time = match metadata.modified() {
        Ok(t) => t,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "Failed to read mtime, skipping");
            return None;
        }
    };

    Some(CarFileInfo {
        path,
        name,
        content_id,
        mod_time,
    })
}
