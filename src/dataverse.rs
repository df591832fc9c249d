use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::{DatasetIdentifier, VersionBump};
use crate::error::IngestError;

const API_KEY_HEADER: &str = "X-Dataverse-key";

/// Raw answer of a successful (2xx) repository call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryResponse {
    pub status: u16,
    pub body: String,
}

impl RepositoryResponse {
    pub fn json(&self) -> Result<Value, IngestError> {
        serde_json::from_str(&self.body).map_err(|err| {
            IngestError::MalformedResponse(format!("status {}: {err}", self.status))
        })
    }
}

/// Remote dataset operations used by the ingest pipeline. Non-2xx answers are
/// returned as `IngestError::DataverseStatus`.
pub trait RepositoryClient: Send + Sync {
    fn create_dataset(&self, dataset_json: &str) -> Result<RepositoryResponse, IngestError>;

    /// Import under an existing persistent identifier, e.g. `doi:10.17026/abc`.
    fn import_dataset(
        &self,
        dataset_json: &str,
        pid: &str,
        keep_draft: bool,
    ) -> Result<RepositoryResponse, IngestError>;

    /// `content_type` overrides the media type the repository would detect.
    fn add_file(
        &self,
        dataset: &DatasetIdentifier,
        content: &Utf8Path,
        content_type: Option<&str>,
        metadata_json: &str,
    ) -> Result<RepositoryResponse, IngestError>;

    fn publish(
        &self,
        dataset: &DatasetIdentifier,
        bump: VersionBump,
    ) -> Result<RepositoryResponse, IngestError>;

    fn delete_draft(&self, dataset: &DatasetIdentifier) -> Result<RepositoryResponse, IngestError>;
}

#[derive(Clone)]
pub struct DataverseClient {
    client: Client,
    base_url: String,
    collection: String,
}

impl DataverseClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("dd-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::DataverseHttp(err.to_string()))?,
        );
        let mut key = HeaderValue::from_str(api_key.trim())
            .map_err(|err| IngestError::ConfigValue(format!("dataverse.apiKey: {err}")))?;
        key.set_sensitive(true);
        headers.insert(API_KEY_HEADER, key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| IngestError::DataverseHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/api/dataverses/{}/datasets{}",
            self.base_url, self.collection, suffix
        )
    }

    fn dataset_url(&self, path: &str) -> String {
        format!("{}/api/datasets/:persistentId{}", self.base_url, path)
    }

    fn handle_status(response: Response) -> Result<RepositoryResponse, IngestError> {
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "Dataverse request failed".to_string());
            return Err(IngestError::DataverseStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| IngestError::DataverseHttp(err.to_string()))?;
        Ok(RepositoryResponse { status, body })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, IngestError>
    where
        F: FnMut() -> Result<RequestBuilder, IngestError>,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req()?.send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(status, attempt, "dataverse.retry");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(error = %err, attempt, "dataverse.retry");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(IngestError::DataverseHttp(err.to_string()));
                }
            }
        }
    }

    fn post_json(&self, url: &str, body: &str) -> Result<RepositoryResponse, IngestError> {
        let response = self.send_with_retries(|| {
            Ok(self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string()))
        })?;
        Self::handle_status(response)
    }
}

impl RepositoryClient for DataverseClient {
    fn create_dataset(&self, dataset_json: &str) -> Result<RepositoryResponse, IngestError> {
        self.post_json(&self.collection_url(""), dataset_json)
    }

    fn import_dataset(
        &self,
        dataset_json: &str,
        pid: &str,
        keep_draft: bool,
    ) -> Result<RepositoryResponse, IngestError> {
        let release = if keep_draft { "no" } else { "yes" };
        let url = self.collection_url("/:import");
        let response = self.send_with_retries(|| {
            Ok(self
                .client
                .post(&url)
                .query(&[("pid", pid), ("release", release)])
                .header(CONTENT_TYPE, "application/json")
                .body(dataset_json.to_string()))
        })?;
        Self::handle_status(response)
    }

    fn add_file(
        &self,
        dataset: &DatasetIdentifier,
        content: &Utf8Path,
        content_type: Option<&str>,
        metadata_json: &str,
    ) -> Result<RepositoryResponse, IngestError> {
        let url = self.dataset_url("/add");
        let response = self.send_with_retries(|| {
            let mut file = Part::file(content.as_std_path()).map_err(|err| {
                IngestError::Filesystem(format!("open {content}: {err}"))
            })?;
            if let Some(mime) = content_type {
                file = file
                    .mime_str(mime)
                    .map_err(|err| IngestError::Encode(format!("{content}: {err}")))?;
            }
            let form = Form::new()
                .part("file", file)
                .text("jsonData", metadata_json.to_string());
            Ok(self
                .client
                .post(&url)
                .query(&[("persistentId", dataset.as_str())])
                .multipart(form))
        })?;
        Self::handle_status(response)
    }

    fn publish(
        &self,
        dataset: &DatasetIdentifier,
        bump: VersionBump,
    ) -> Result<RepositoryResponse, IngestError> {
        let url = self.dataset_url("/actions/:publish");
        let response = self.send_with_retries(|| {
            Ok(self
                .client
                .post(&url)
                .query(&[("persistentId", dataset.as_str()), ("type", bump.as_str())]))
        })?;
        Self::handle_status(response)
    }

    fn delete_draft(&self, dataset: &DatasetIdentifier) -> Result<RepositoryResponse, IngestError> {
        let url = self.dataset_url("/versions/:draft");
        let response = self.send_with_retries(|| {
            Ok(self
                .client
                .delete(&url)
                .query(&[("persistentId", dataset.as_str())]))
        })?;
        Self::handle_status(response)
    }
}

// Only answers that guarantee the request was not processed; the write
// endpoints are not idempotent.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 503)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect()
}
