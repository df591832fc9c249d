use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

const PAYLOAD_DIR: &str = "data";

/// `metadata/files.json` of a deposit bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileManifest {
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(default)]
    pub filepath: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub accessible_to_rights: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Per-file metadata sent along with the file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub restrict: bool,
}

/// One payload file to attach. `content` is relative to the bag root and is
/// never read by the mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub content: Utf8PathBuf,
    /// Media type from the manifest, sent with the file content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub metadata: FileMeta,
}

pub trait FilesMapper: Send + Sync {
    fn map(
        &self,
        manifest: &FileManifest,
        default_restrict: bool,
    ) -> Result<Vec<FileEntry>, IngestError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestMapper;

impl FilesMapper for ManifestMapper {
    fn map(
        &self,
        manifest: &FileManifest,
        default_restrict: bool,
    ) -> Result<Vec<FileEntry>, IngestError> {
        manifest
            .files
            .iter()
            .enumerate()
            .map(|(index, entry)| map_entry(index, entry, default_restrict))
            .collect()
    }
}

fn map_entry(
    index: usize,
    entry: &ManifestEntry,
    default_restrict: bool,
) -> Result<FileEntry, IngestError> {
    let invalid = |reason: String| IngestError::ManifestEntry { index, reason };

    let filepath = entry
        .filepath
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| invalid("missing filepath".to_string()))?;
    let path = Utf8Path::new(filepath);

    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Utf8Component::Normal(part) => components.push(part),
            Utf8Component::CurDir => {}
            _ => return Err(invalid(format!("unsupported path {filepath}"))),
        }
    }
    if components.first() != Some(&PAYLOAD_DIR) {
        return Err(invalid(format!("{filepath} is outside {PAYLOAD_DIR}/")));
    }
    let Some((label, directories)) = components[1..].split_last() else {
        return Err(invalid(format!("{filepath} has no file name")));
    };

    let restrict = match entry.accessible_to_rights.as_deref().map(str::trim) {
        None | Some("") => default_restrict,
        Some(rights) => restrict_for_rights(rights).ok_or_else(|| {
            invalid(format!("unknown accessibleToRights value {rights}"))
        })?,
    };

    let content_type = match entry.format.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(format) if is_media_type(format) => Some(format.to_string()),
        Some(format) => return Err(invalid(format!("format {format} is not a media type"))),
    };

    Ok(FileEntry {
        content: components.iter().collect(),
        content_type,
        metadata: FileMeta {
            label: label.to_string(),
            directory_label: (!directories.is_empty()).then(|| directories.join("/")),
            description: entry
                .description
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            restrict,
        },
    })
}

fn is_media_type(value: &str) -> bool {
    let Some((kind, subtype)) = value.split_once('/') else {
        return false;
    };
    let token = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || "!#$&-^_.+".contains(ch))
    };
    let subtype = subtype.split(';').next().unwrap_or_default().trim();
    token(kind) && token(subtype)
}

fn restrict_for_rights(rights: &str) -> Option<bool> {
    match rights {
        "ANONYMOUS" => Some(false),
        "KNOWN" | "RESTRICTED_REQUEST" | "NONE" => Some(true),
        _ => None,
    }
}
