//! Extraction of the `all.zip` result archive.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::NodeOdmError;

/// Extract `zip_path` into `dest`, returning the number of files written.
///
/// Entries whose path would land outside `dest` abort the extraction.
/// Blocking; call from `spawn_blocking` in async code.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<usize, NodeOdmError> {
    let file = File::open(zip_path).map_err(|e| NodeOdmError::io(zip_path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| NodeOdmError::Archive(e.to_string()))?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| NodeOdmError::Archive(e.to_string()))?;

        let relative: PathBuf = entry.enclosed_name().ok_or_else(|| {
            NodeOdmError::Archive(format!("entry '{}' escapes the output directory", entry.name()))
        })?;
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| NodeOdmError::io(&target, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| NodeOdmError::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| NodeOdmError::io(&target, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| NodeOdmError::io(&target, e))?;
        written += 1;
    }

    Ok(written)
}
