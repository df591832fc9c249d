use std::fs;
use std::path::Path;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tempfile::TempDir;

use crate::domain::{DepositId, Doi};
use crate::error::IngestError;
use crate::files::FileManifest;
use crate::fs_util;
use crate::metadata::DepositMetadata;

pub const DEPOSIT_PROPERTIES: &str = "deposit.json";
pub const METADATA_DOCUMENT: &str = "metadata/dataset.json";
pub const FILE_MANIFEST: &str = "metadata/files.json";

/// One ingest unit: a bag plus the identifiers assigned to it. Documents
/// inside the bag are read on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    id: DepositId,
    bag_dir: Utf8PathBuf,
    doi: Option<Doi>,
}

impl Deposit {
    pub fn new(id: DepositId, bag_dir: Utf8PathBuf, doi: Option<Doi>) -> Self {
        Self { id, bag_dir, doi }
    }

    pub fn id(&self) -> &DepositId {
        &self.id
    }

    pub fn bag_dir(&self) -> &Utf8Path {
        &self.bag_dir
    }

    /// DOI reserved for this deposit before ingest, if any.
    pub fn doi(&self) -> Option<&Doi> {
        self.doi.as_ref()
    }

    pub fn metadata_path(&self) -> Utf8PathBuf {
        self.bag_dir.join(METADATA_DOCUMENT)
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.bag_dir.join(FILE_MANIFEST)
    }

    pub fn load_metadata(&self) -> Result<DepositMetadata, IngestError> {
        read_json(&self.metadata_path()).map_err(IngestError::MetadataRead)
    }

    pub fn load_manifest(&self) -> Result<FileManifest, IngestError> {
        read_json(&self.manifest_path()).map_err(IngestError::ManifestRead)
    }
}

fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, String> {
    let content = fs::read_to_string(path.as_std_path()).map_err(|err| format!("{path}: {err}"))?;
    serde_json::from_str(&content).map_err(|err| format!("{path}: {err}"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositProperties {
    deposit_id: String,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    bag: Option<String>,
}

/// A deposit read from disk. Zipped deposits are unpacked into a temporary
/// directory that is removed when this value is dropped.
#[derive(Debug)]
pub struct LoadedDeposit {
    deposit: Deposit,
    _workdir: Option<TempDir>,
}

impl LoadedDeposit {
    pub fn deposit(&self) -> &Deposit {
        &self.deposit
    }
}

pub struct DepositLoader;

impl DepositLoader {
    pub fn open(path: &Path) -> Result<LoadedDeposit, IngestError> {
        let is_zip = path.is_file()
            && path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("zip"))
                .unwrap_or(false);
        if !is_zip {
            let deposit = Self::load_dir(path)?;
            return Ok(LoadedDeposit {
                deposit,
                _workdir: None,
            });
        }

        let zip_path = utf8(path)?;
        let workdir = tempfile::Builder::new()
            .prefix("dd-ingest-deposit")
            .tempdir()
            .map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let root = fs_util::unpack_deposit(zip_path, utf8(workdir.path())?, DEPOSIT_PROPERTIES)?;
        let deposit = Self::load_dir(root.as_std_path())?;
        Ok(LoadedDeposit {
            deposit,
            _workdir: Some(workdir),
        })
    }

    pub fn load_dir(dir: &Path) -> Result<Deposit, IngestError> {
        let invalid = |reason: String| IngestError::InvalidDeposit {
            path: dir.to_path_buf(),
            reason,
        };
        let root = utf8(dir)?;

        let properties_path = root.join(DEPOSIT_PROPERTIES);
        let content = fs::read_to_string(&properties_path)
            .map_err(|err| invalid(format!("cannot read {DEPOSIT_PROPERTIES}: {err}")))?;
        let properties: DepositProperties = serde_json::from_str(&content)
            .map_err(|err| invalid(format!("cannot parse {DEPOSIT_PROPERTIES}: {err}")))?;

        let id: DepositId = properties.deposit_id.parse()?;
        let doi = properties
            .doi
            .filter(|value| !value.trim().is_empty())
            .map(|value| value.parse::<Doi>())
            .transpose()?;

        let bag_dir = match properties.bag {
            Some(name) => {
                // The bag must be a direct child of the deposit directory.
                let mut components = Utf8Path::new(&name).components();
                let child = match (components.next(), components.next()) {
                    (Some(Utf8Component::Normal(child)), None) => child,
                    _ => return Err(invalid(format!("bag {name} is not a directory name"))),
                };
                let bag_dir = root.join(child);
                if !bag_dir.is_dir() {
                    return Err(invalid(format!("bag directory {name} not found")));
                }
                bag_dir
            }
            None => match fs_util::subdirectories(root)?.as_slice() {
                [single] => single.clone(),
                [] => return Err(invalid("no bag directory".to_string())),
                _ => return Err(invalid("more than one bag directory".to_string())),
            },
        };

        Ok(Deposit::new(id, bag_dir, doi))
    }
}

fn utf8(path: &Path) -> Result<&Utf8Path, IngestError> {
    Utf8Path::from_path(path)
        .ok_or_else(|| IngestError::Filesystem(format!("non-utf8 path {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_paths_live_in_bag() {
        let deposit = Deposit::new(
            "dep-1".parse().unwrap(),
            Utf8PathBuf::from("/deposits/dep-1/bag"),
            None,
        );
        assert_eq!(
            deposit.metadata_path(),
            Utf8PathBuf::from("/deposits/dep-1/bag/metadata/dataset.json")
        );
        assert_eq!(
            deposit.manifest_path(),
            Utf8PathBuf::from("/deposits/dep-1/bag/metadata/files.json")
        );
    }
}
