use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dataverse::{RepositoryClient, RepositoryResponse};
use crate::deposit::Deposit;
use crate::domain::{DatasetIdentifier, VersionBump};
use crate::error::{DraftDisposition, FileUploadError, IngestError, IngestFailure};
use crate::files::{FileEntry, FilesMapper, ManifestMapper};
use crate::metadata::{CitationMapper, DatasetDescription, DepositMetadata, MetadataMapper};
use crate::validator::{BagValidator, ValidationVerdict};

pub type IngestOutcome = Result<IngestReceipt, IngestFailure>;

/// What to do with a dataset that was created but could not be completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftPolicy {
    #[default]
    Keep,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub publish: bool,
    pub draft_policy: DraftPolicy,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            publish: true,
            draft_policy: DraftPolicy::Keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetState {
    Draft,
    Published,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub deposit_id: String,
    pub dataset: DatasetIdentifier,
    pub imported: bool,
    pub files_added: usize,
    pub state: DatasetState,
    pub finished_at: String,
}

/// Serializes request payloads for the repository.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl JsonEncoder {
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, IngestError> {
        serde_json::to_string(value).map_err(|err| IngestError::Encode(err.to_string()))
    }
}

enum UploadError {
    Mapping(IngestError),
    Upload(Vec<FileUploadError>),
}

pub struct IngestTask<V, R, M = CitationMapper, F = ManifestMapper> {
    validator: V,
    repository: R,
    metadata_mapper: M,
    files_mapper: F,
    encoder: JsonEncoder,
    options: IngestOptions,
}

impl<V: BagValidator, R: RepositoryClient> IngestTask<V, R> {
    pub fn new(validator: V, repository: R, options: IngestOptions) -> Self {
        Self::with_mappers(
            validator,
            repository,
            CitationMapper::default(),
            ManifestMapper,
            options,
        )
    }
}

impl<V, R, M, F> IngestTask<V, R, M, F>
where
    V: BagValidator,
    R: RepositoryClient,
    M: MetadataMapper,
    F: FilesMapper,
{
    pub fn with_mappers(
        validator: V,
        repository: R,
        metadata_mapper: M,
        files_mapper: F,
        options: IngestOptions,
    ) -> Self {
        Self {
            validator,
            repository,
            metadata_mapper,
            files_mapper,
            encoder: JsonEncoder,
            options,
        }
    }

    pub fn validator(&self) -> &V {
        &self.validator
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn run(&self, deposit: &Deposit) -> IngestOutcome {
        self.run_with_progress(deposit, |_| {})
    }

    pub fn run_with_progress<P>(&self, deposit: &Deposit, mut progress: P) -> IngestOutcome
    where
        P: FnMut(&str),
    {
        let span = tracing::info_span!("ingest", deposit = %deposit.id());
        let _guard = span.enter();
        let start = Instant::now();

        progress(&format!("phase=Validate; bag {}", deposit.bag_dir()));
        let verdict = self.validate(deposit)?;
        info!(profile_version = %verdict.profile_version, "bag.compliant");

        progress("phase=Map; mapping dataset metadata");
        let metadata = deposit.load_metadata().map_err(IngestFailure::Mapping)?;
        let description = self
            .metadata_mapper
            .map(&metadata)
            .map_err(IngestFailure::Mapping)?;

        progress("phase=Submit; creating dataset");
        let dataset = self.submit(deposit, &description)?;
        info!(dataset = %dataset, "dataset.created");

        progress("phase=Upload; adding files");
        let files_added = match self.upload_files(deposit, &metadata, &dataset, &mut progress) {
            Ok(count) => count,
            Err(err) => return Err(self.abandon(dataset, err)),
        };

        let state = if self.options.publish {
            progress("phase=Publish; publishing major version");
            self.repository
                .publish(&dataset, VersionBump::Major)
                .map_err(|source| {
                    warn!(dataset = %dataset, error = %source, "dataset.publish_failed");
                    IngestFailure::Publish {
                        dataset: dataset.clone(),
                        source,
                    }
                })?;
            DatasetState::Published
        } else {
            DatasetState::Draft
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        progress(&format!("phase=Done; elapsed_ms={elapsed_ms}"));
        info!(dataset = %dataset, files_added, ?state, elapsed_ms, "ingest.done");

        Ok(IngestReceipt {
            deposit_id: deposit.id().to_string(),
            dataset,
            imported: deposit.doi().is_some(),
            files_added,
            state,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn validate(&self, deposit: &Deposit) -> Result<ValidationVerdict, IngestFailure> {
        let verdict = self
            .validator
            .validate(deposit.bag_dir())
            .map_err(IngestFailure::ValidationInfrastructure)?;
        if !verdict.compliant {
            warn!(
                profile_version = %verdict.profile_version,
                violations = verdict.violations.len(),
                "bag.rejected"
            );
            return Err(IngestFailure::RejectedDeposit {
                profile_version: verdict.profile_version,
                violations: verdict.violations,
            });
        }
        Ok(verdict)
    }

    fn submit(
        &self,
        deposit: &Deposit,
        description: &DatasetDescription,
    ) -> Result<DatasetIdentifier, IngestFailure> {
        let dataset_json = self
            .encoder
            .encode(description)
            .map_err(IngestFailure::Submission)?;
        let response = match deposit.doi() {
            Some(doi) => {
                let pid = doi.to_pid();
                info!(%pid, "dataset.import");
                // Imported versions stay draft; publishing is decided at the end.
                self.repository.import_dataset(&dataset_json, &pid, true)
            }
            None => {
                info!("dataset.create");
                self.repository.create_dataset(&dataset_json)
            }
        }
        .map_err(IngestFailure::Submission)?;
        extract_persistent_id(&response).map_err(IngestFailure::Submission)
    }

    fn upload_files<P>(
        &self,
        deposit: &Deposit,
        metadata: &DepositMetadata,
        dataset: &DatasetIdentifier,
        progress: &mut P,
    ) -> Result<usize, UploadError>
    where
        P: FnMut(&str),
    {
        let manifest = deposit.load_manifest().map_err(UploadError::Mapping)?;
        let default_restrict = metadata
            .access_rights()
            .map_err(UploadError::Mapping)?
            .restricts_files();
        let entries = self
            .files_mapper
            .map(&manifest, default_restrict)
            .map_err(UploadError::Mapping)?;

        let total = entries.len();
        let mut failures = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            progress(&format!(
                "phase=Upload; file {}/{} {}",
                index + 1,
                total,
                entry.content
            ));
            if let Err(err) = self.add_file(deposit, dataset, entry) {
                warn!(file = %entry.content, error = %err, "file.add_failed");
                failures.push(FileUploadError {
                    file: entry.content.to_string(),
                    message: err.to_string(),
                });
            }
        }

        if !failures.is_empty() {
            return Err(UploadError::Upload(failures));
        }
        Ok(total)
    }

    fn add_file(
        &self,
        deposit: &Deposit,
        dataset: &DatasetIdentifier,
        entry: &FileEntry,
    ) -> Result<RepositoryResponse, IngestError> {
        let metadata_json = self.encoder.encode(&entry.metadata)?;
        let content = deposit.bag_dir().join(&entry.content);
        let response = self.repository.add_file(
            dataset,
            &content,
            entry.content_type.as_deref(),
            &metadata_json,
        )?;
        debug!(file = %entry.content, restrict = entry.metadata.restrict, "file.added");
        Ok(response)
    }

    fn abandon(&self, dataset: DatasetIdentifier, err: UploadError) -> IngestFailure {
        let draft = match self.options.draft_policy {
            DraftPolicy::Keep => {
                warn!(dataset = %dataset, "dataset.left_incomplete");
                DraftDisposition::Kept
            }
            DraftPolicy::Delete => match self.repository.delete_draft(&dataset) {
                Ok(_) => {
                    info!(dataset = %dataset, "dataset.draft_deleted");
                    DraftDisposition::Deleted
                }
                Err(delete_err) => {
                    warn!(dataset = %dataset, error = %delete_err, "dataset.draft_delete_failed");
                    DraftDisposition::DeleteFailed(delete_err.to_string())
                }
            },
        };
        match err {
            UploadError::Mapping(source) => IngestFailure::FileMapping {
                dataset,
                draft,
                source,
            },
            UploadError::Upload(failures) => IngestFailure::FileUpload {
                dataset,
                draft,
                failures,
            },
        }
    }
}

/// Offline view of what an ingest would send: the dataset payload and the
/// ordered file entries.
#[derive(Debug, Clone, Serialize)]
pub struct MappedDeposit {
    pub dataset: DatasetDescription,
    pub files: Vec<FileEntry>,
}

pub fn preview<M, F>(
    deposit: &Deposit,
    metadata_mapper: &M,
    files_mapper: &F,
) -> Result<MappedDeposit, IngestError>
where
    M: MetadataMapper,
    F: FilesMapper,
{
    let metadata = deposit.load_metadata()?;
    let dataset = metadata_mapper.map(&metadata)?;
    let manifest = deposit.load_manifest()?;
    let files = files_mapper.map(&manifest, metadata.access_rights()?.restricts_files())?;
    Ok(MappedDeposit { dataset, files })
}

/// Finds `persistentId` anywhere in the response body.
pub fn extract_persistent_id(
    response: &RepositoryResponse,
) -> Result<DatasetIdentifier, IngestError> {
    let body = response.json()?;
    let missing = || IngestError::MissingPersistentId {
        status: response.status,
    };
    let value = find_field(&body, "persistentId").ok_or_else(missing)?;
    let text = value.as_str().ok_or_else(|| {
        IngestError::MalformedResponse(format!("persistentId is not a string: {value}"))
    })?;
    text.parse().map_err(|_| missing())
}

fn find_field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(name)
            .or_else(|| map.values().find_map(|child| find_field(child, name))),
        Value::Array(items) => items.iter().find_map(|child| find_field(child, name)),
        _ => None,
    }
}
