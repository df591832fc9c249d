use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::domain::DatasetIdentifier;
use crate::validator::RuleViolation;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid deposit id: {0}")]
    InvalidDepositId(String),

    #[error("invalid dataset identifier: {0}")]
    InvalidDatasetIdentifier(String),

    #[error("invalid deposit at {path}: {reason}")]
    InvalidDeposit { path: PathBuf, reason: String },

    #[error("no config found: pass --config, or create dd-ingest.json or <config dir>/dd-ingest/config.json")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    ConfigValue(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("bag validator request failed: {0}")]
    ValidatorHttp(String),

    #[error("bag validator returned status {status}: {message}")]
    ValidatorStatus { status: u16, message: String },

    #[error("Dataverse request failed: {0}")]
    DataverseHttp(String),

    #[error("Dataverse returned status {status}: {message}")]
    DataverseStatus { status: u16, message: String },

    #[error("malformed Dataverse response: {0}")]
    MalformedResponse(String),

    #[error("Dataverse response (status {status}) has no persistentId")]
    MissingPersistentId { status: u16 },

    #[error("failed to read metadata document: {0}")]
    MetadataRead(String),

    #[error("metadata is missing mandatory field: {0}")]
    MissingField(&'static str),

    #[error("unrecognized {vocabulary} value: {value}")]
    UnknownTerm {
        vocabulary: &'static str,
        value: String,
    },

    #[error("invalid {field} date: {value}")]
    InvalidDate { field: &'static str, value: String },

    #[error("failed to read file manifest: {0}")]
    ManifestRead(String),

    #[error("file manifest entry {index} is invalid: {reason}")]
    ManifestEntry { index: usize, reason: String },

    #[error("failed to encode request payload: {0}")]
    Encode(String),
}

impl IngestError {
    /// True when the remote side never processed the request or reported a
    /// transient condition.
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::ValidatorHttp(_) | IngestError::DataverseHttp(_) => true,
            IngestError::ValidatorStatus { status, .. }
            | IngestError::DataverseStatus { status, .. } => {
                *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

/// Pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Validate,
    MapMetadata,
    Submit,
    UploadFiles,
    Publish,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Validate => "validate",
            IngestStage::MapMetadata => "map-metadata",
            IngestStage::Submit => "submit",
            IngestStage::UploadFiles => "upload-files",
            IngestStage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// What happened to a draft dataset left incomplete by a failed ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum DraftDisposition {
    Kept,
    Deleted,
    DeleteFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileUploadError {
    pub file: String,
    pub message: String,
}

/// Terminal failure of one ingest attempt.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestFailure {
    #[error(
        "Bag was not valid according to Profile Version {profile_version}. Violations:\n{}",
        format_violations(.violations)
    )]
    #[diagnostic(help("fix the deposit and submit it again"))]
    RejectedDeposit {
        profile_version: String,
        violations: Vec<RuleViolation>,
    },

    #[error("bag validation could not be performed")]
    ValidationInfrastructure(#[source] IngestError),

    #[error("metadata could not be mapped to a dataset")]
    Mapping(#[source] IngestError),

    #[error("file manifest could not be mapped for dataset {dataset}")]
    FileMapping {
        dataset: DatasetIdentifier,
        draft: DraftDisposition,
        #[source]
        source: IngestError,
    },

    #[error("dataset could not be created")]
    Submission(#[source] IngestError),

    #[error(
        "files could not be added to dataset {dataset}:\n{}",
        format_upload_failures(.failures)
    )]
    FileUpload {
        dataset: DatasetIdentifier,
        draft: DraftDisposition,
        failures: Vec<FileUploadError>,
    },

    #[error("dataset {dataset} could not be published")]
    #[diagnostic(help("the draft is complete; re-issue the publish request"))]
    Publish {
        dataset: DatasetIdentifier,
        #[source]
        source: IngestError,
    },
}

impl IngestFailure {
    pub fn stage(&self) -> IngestStage {
        match self {
            IngestFailure::RejectedDeposit { .. } | IngestFailure::ValidationInfrastructure(_) => {
                IngestStage::Validate
            }
            IngestFailure::Mapping(_) => IngestStage::MapMetadata,
            IngestFailure::Submission(_) => IngestStage::Submit,
            IngestFailure::FileMapping { .. } | IngestFailure::FileUpload { .. } => {
                IngestStage::UploadFiles
            }
            IngestFailure::Publish { .. } => IngestStage::Publish,
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            IngestFailure::RejectedDeposit { .. }
            | IngestFailure::Mapping(_)
            | IngestFailure::FileMapping { .. } => false,
            IngestFailure::ValidationInfrastructure(_)
            | IngestFailure::FileUpload { .. }
            | IngestFailure::Publish { .. } => true,
            IngestFailure::Submission(source) => source.is_transient(),
        }
    }

    /// Dataset that exists on the remote side despite the failure.
    pub fn dataset(&self) -> Option<&DatasetIdentifier> {
        match self {
            IngestFailure::FileMapping { dataset, draft, .. }
            | IngestFailure::FileUpload { dataset, draft, .. } => {
                (*draft != DraftDisposition::Deleted).then_some(dataset)
            }
            IngestFailure::Publish { dataset, .. } => Some(dataset),
            _ => None,
        }
    }
}

pub fn format_violations(violations: &[RuleViolation]) -> String {
    violations
        .iter()
        .map(|violation| format!(" - [{}] {}", violation.rule, violation.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_upload_failures(failures: &[FileUploadError]) -> String {
    failures
        .iter()
        .map(|failure| format!(" - {}: {}", failure.file, failure.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(rule: &str, message: &str) -> RuleViolation {
        RuleViolation {
            rule: rule.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn rejected_deposit_lists_every_violation() {
        let failure = IngestFailure::RejectedDeposit {
            profile_version: "1.0.0".to_string(),
            violations: vec![
                violation("1.2.1", "bag-info.txt is missing"),
                violation("3.1.2", "dataset.json has no title"),
            ],
        };

        assert_eq!(
            failure.to_string(),
            "Bag was not valid according to Profile Version 1.0.0. Violations:\n - [1.2.1] bag-info.txt is missing\n - [3.1.2] dataset.json has no title"
        );
        assert!(!failure.retryable());
        assert_eq!(failure.stage(), IngestStage::Validate);
    }

    #[test]
    fn submission_retryable_depends_on_cause() {
        let transient = IngestFailure::Submission(IngestError::DataverseStatus {
            status: 503,
            message: "maintenance".to_string(),
        });
        let schema = IngestFailure::Submission(IngestError::DataverseStatus {
            status: 400,
            message: "invalid field".to_string(),
        });
        let missing_id = IngestFailure::Submission(IngestError::MissingPersistentId { status: 201 });

        assert!(transient.retryable());
        assert!(!schema.retryable());
        assert!(!missing_id.retryable());
    }

    #[test]
    fn deleted_draft_is_not_reported_as_left_behind() {
        let dataset: DatasetIdentifier = "doi:10.5072/FK2/ABC".parse().unwrap();
        let kept = IngestFailure::FileUpload {
            dataset: dataset.clone(),
            draft: DraftDisposition::Kept,
            failures: Vec::new(),
        };
        let deleted = IngestFailure::FileUpload {
            dataset,
            draft: DraftDisposition::Deleted,
            failures: Vec::new(),
        };

        assert!(kept.dataset().is_some());
        assert!(deleted.dataset().is_none());
    }
}
