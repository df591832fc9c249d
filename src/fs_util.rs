use std::fs::File;

use camino::{Utf8Path, Utf8PathBuf};
use zip::ZipArchive;

use crate::error::IngestError;

/// Unpacks a zipped deposit into `target_dir` and returns its root: the
/// directory holding `marker`, either `target_dir` itself or exactly one
/// top-level directory of the archive.
pub fn unpack_deposit(
    zip_path: &Utf8Path,
    target_dir: &Utf8Path,
    marker: &str,
) -> Result<Utf8PathBuf, IngestError> {
    let invalid = |reason: String| IngestError::InvalidDeposit {
        path: zip_path.as_std_path().to_path_buf(),
        reason,
    };

    let file = File::open(zip_path)
        .map_err(|err| IngestError::Filesystem(format!("open {zip_path}: {err}")))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| invalid(format!("unreadable zip: {err}")))?;
    // Entries whose names leave target_dir abort the whole extraction.
    archive
        .extract(target_dir)
        .map_err(|err| invalid(format!("cannot unpack: {err}")))?;
    tracing::debug!(zip = %zip_path, entries = archive.len(), "deposit.unpacked");

    if target_dir.join(marker).is_file() {
        return Ok(target_dir.to_owned());
    }
    let mut roots = subdirectories(target_dir)?
        .into_iter()
        .filter(|dir| dir.join(marker).is_file());
    match (roots.next(), roots.next()) {
        (Some(root), None) => Ok(root),
        (None, _) => Err(invalid(format!("zip does not contain {marker}"))),
        (Some(_), Some(_)) => Err(invalid(format!("zip contains more than one {marker}"))),
    }
}

/// Directories directly below `dir`, sorted by name.
pub fn subdirectories(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, IngestError> {
    let entries = dir
        .read_dir_utf8()
        .map_err(|err| IngestError::Filesystem(format!("read {dir}: {err}")))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| IngestError::Filesystem(format!("read {dir}: {err}")))?;
        if entry.path().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
