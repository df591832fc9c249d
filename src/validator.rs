use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule: String,
    pub message: String,
}

/// Outcome of checking a bag against its packaging profile. A non-compliant
/// verdict is a successful validator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub compliant: bool,
    pub profile_version: String,
    pub violations: Vec<RuleViolation>,
}

pub trait BagValidator: Send + Sync {
    fn validate(&self, bag_dir: &Utf8Path) -> Result<ValidationVerdict, IngestError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateRequest {
    bag_location: String,
    package_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    is_compliant: bool,
    #[serde(default)]
    profile_version: Value,
    #[serde(default)]
    rule_violations: Vec<ValidatorViolation>,
}

#[derive(Debug, Deserialize)]
struct ValidatorViolation {
    rule: Value,
    violation: String,
}

impl From<ValidateResponse> for ValidationVerdict {
    fn from(value: ValidateResponse) -> Self {
        Self {
            compliant: value.is_compliant,
            profile_version: value_to_string(&value.profile_version),
            violations: value
                .rule_violations
                .into_iter()
                .map(|item| RuleViolation {
                    rule: value_to_string(&item.rule),
                    message: item.violation,
                })
                .collect(),
        }
    }
}

/// Client for a bag validation service exposing `POST /validate`.
#[derive(Clone)]
pub struct HttpBagValidator {
    client: Client,
    base_url: String,
}

impl HttpBagValidator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("dd-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::ValidatorHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| IngestError::ValidatorHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn validate_url(&self) -> String {
        format!("{}/validate", self.base_url)
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, IngestError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(IngestError::ValidatorHttp(err.to_string()));
                }
            }
        }
    }
}

impl BagValidator for HttpBagValidator {
    fn validate(&self, bag_dir: &Utf8Path) -> Result<ValidationVerdict, IngestError> {
        let request = ValidateRequest {
            bag_location: bag_location(bag_dir)?,
            package_type: "DEPOSIT",
        };
        let url = self.validate_url();
        tracing::debug!(%url, bag = %request.bag_location, "validator.request");
        let response = self.send_with_retries(|| self.client.post(&url).json(&request))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "bag validator request failed".to_string());
            return Err(IngestError::ValidatorStatus { status, message });
        }
        let payload: ValidateResponse = response
            .json()
            .map_err(|err| IngestError::ValidatorHttp(err.to_string()))?;
        Ok(payload.into())
    }
}

/// `file:` URI of the canonical bag directory, percent-encoded.
fn bag_location(bag_dir: &Utf8Path) -> Result<String, IngestError> {
    let absolute = bag_dir
        .canonicalize_utf8()
        .map_err(|err| IngestError::Filesystem(format!("resolve {bag_dir}: {err}")))?;
    let url = Url::from_file_path(absolute.as_std_path())
        .map_err(|_| IngestError::Filesystem(format!("{absolute} is not a valid file URI")))?;
    Ok(url.into())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// Read-only endpoint: every transient failure is retried.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_from_service_payload() {
        let payload: ValidateResponse = serde_json::from_str(
            r#"{
                "bagLocation": "file:///deposits/a/bag",
                "isCompliant": false,
                "profileVersion": 1,
                "ruleViolations": [
                    {"rule": "1.1.1", "violation": "bag-info.txt is missing"},
                    {"rule": "2.2", "violation": "metadata/dataset.json not found"}
                ]
            }"#,
        )
        .unwrap();

        let verdict = ValidationVerdict::from(payload);
        assert!(!verdict.compliant);
        assert_eq!(verdict.profile_version, "1");
        assert_eq!(verdict.violations.len(), 2);
        assert_eq!(verdict.violations[1].rule, "2.2");
        assert_eq!(verdict.violations[1].message, "metadata/dataset.json not found");
    }

    #[test]
    fn bag_location_is_percent_encoded() {
        let temp = tempfile::tempdir().unwrap();
        let bag_dir = temp.path().join("deposit #1 bag");
        std::fs::create_dir(&bag_dir).unwrap();
        let bag_dir = camino::Utf8PathBuf::from_path_buf(bag_dir).unwrap();

        let location = bag_location(&bag_dir).unwrap();

        assert!(location.starts_with("file:///"));
        assert!(location.ends_with("/deposit%20%231%20bag"), "{location}");
        let parsed = Url::parse(&location).unwrap();
        assert_eq!(parsed.fragment(), None);
        assert_eq!(
            parsed.to_file_path().unwrap(),
            bag_dir.canonicalize().unwrap()
        );
    }

    #[test]
    fn compliant_payload_without_violations() {
        let payload: ValidateResponse =
            serde_json::from_str(r#"{"isCompliant": true, "profileVersion": "1.0.0"}"#).unwrap();
        let verdict = ValidationVerdict::from(payload);
        assert!(verdict.compliant);
        assert_eq!(verdict.profile_version, "1.0.0");
        assert!(verdict.violations.is_empty());
    }
}
