use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::ingest::{DraftPolicy, IngestOptions};
use crate::metadata::Contact;

pub const CONFIG_FILE: &str = "dd-ingest.json";
pub const API_KEY_ENV: &str = "DATAVERSE_API_KEY";

const DEFAULT_COLLECTION: &str = "root";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub dataverse: Option<DataverseSection>,
    #[serde(default)]
    pub validator: Option<ValidatorSection>,
    #[serde(default)]
    pub ingest: IngestSection,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataverseSection {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorSection {
    pub base_url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSection {
    #[serde(default)]
    pub publish: Option<bool>,
    #[serde(default)]
    pub draft_policy: Option<DraftPolicy>,
    #[serde(default)]
    pub contact: Option<Contact>,
}

#[derive(Debug, Clone)]
pub struct DataverseSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub timeout: Duration,
}

impl DataverseSettings {
    pub fn api_key(&self) -> Result<&str, IngestError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                IngestError::ConfigValue(format!(
                    "dataverse.apiKey is not set (or export {API_KEY_ENV})"
                ))
            })
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub dataverse: Option<DataverseSettings>,
    pub validator: Option<ValidatorSettings>,
    pub ingest: IngestOptions,
    pub contact: Option<Contact>,
}

impl ResolvedConfig {
    pub fn dataverse(&self) -> Result<&DataverseSettings, IngestError> {
        self.dataverse
            .as_ref()
            .ok_or_else(|| IngestError::ConfigValue("dataverse section is missing".to_string()))
    }

    pub fn validator(&self) -> Result<&ValidatorSettings, IngestError> {
        self.validator
            .as_ref()
            .ok_or_else(|| IngestError::ConfigValue("validator section is missing".to_string()))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => Self::locate().ok_or(IngestError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path.display(), "config.loaded");

        Self::resolve_config(config, std::env::var(API_KEY_ENV).ok())
    }

    /// `./dd-ingest.json`, then `<config dir>/dd-ingest/config.json`.
    pub fn locate() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("dd-ingest").join("config.json"))
            .filter(|path| path.exists())
    }

    pub fn resolve_config(
        config: Config,
        api_key_override: Option<String>,
    ) -> Result<ResolvedConfig, IngestError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(IngestError::ConfigValue(format!(
                "unsupported schemaVersion {schema_version}"
            )));
        }

        let dataverse = config
            .dataverse
            .map(|section| {
                let api_key = api_key_override
                    .filter(|key| !key.trim().is_empty())
                    .or(section.api_key);
                Ok::<_, IngestError>(DataverseSettings {
                    base_url: checked_base_url("dataverse.baseUrl", &section.base_url)?,
                    api_key,
                    collection: section
                        .collection
                        .filter(|value| !value.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
                    timeout: timeout(section.timeout_secs),
                })
            })
            .transpose()?;

        let validator = config
            .validator
            .map(|section| {
                Ok::<_, IngestError>(ValidatorSettings {
                    base_url: checked_base_url("validator.baseUrl", &section.base_url)?,
                    timeout: timeout(section.timeout_secs),
                })
            })
            .transpose()?;

        let defaults = IngestOptions::default();
        Ok(ResolvedConfig {
            schema_version,
            dataverse,
            validator,
            ingest: IngestOptions {
                publish: config.ingest.publish.unwrap_or(defaults.publish),
                draft_policy: config.ingest.draft_policy.unwrap_or(defaults.draft_policy),
            },
            contact: config.ingest.contact,
        })
    }
}

fn checked_base_url(key: &str, value: &str) -> Result<String, IngestError> {
    let url = Url::parse(value.trim())
        .map_err(|err| IngestError::ConfigValue(format!("{key}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(IngestError::ConfigValue(format!(
            "{key}: unsupported scheme {}",
            url.scheme()
        )));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn timeout(secs: Option<u64>) -> Duration {
    Duration::from_secs(secs.filter(|secs| *secs > 0).unwrap_or(DEFAULT_TIMEOUT_SECS))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_fill_missing_values() {
        let config: Config = serde_json::from_str(
            r#"{"dataverse": {"baseUrl": "https://demo.dataverse.org/"}}"#,
        )
        .unwrap();

        let resolved = ConfigLoader::resolve_config(config, None).unwrap();
        let dataverse = resolved.dataverse().unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(dataverse.base_url, "https://demo.dataverse.org");
        assert_eq!(dataverse.collection, "root");
        assert_eq!(dataverse.timeout, Duration::from_secs(60));
        assert!(resolved.ingest.publish);
        assert_eq!(resolved.ingest.draft_policy, DraftPolicy::Keep);
        assert_matches!(dataverse.api_key(), Err(IngestError::ConfigValue(_)));
        assert_matches!(resolved.validator(), Err(IngestError::ConfigValue(_)));
    }

    #[test]
    fn env_key_overrides_file_key() {
        let config: Config = serde_json::from_str(
            r#"{"dataverse": {"baseUrl": "http://localhost:8080", "apiKey": "from-file"}}"#,
        )
        .unwrap();

        let resolved = ConfigLoader::resolve_config(config, Some("from-env".to_string())).unwrap();
        assert_eq!(resolved.dataverse().unwrap().api_key().unwrap(), "from-env");
    }

    #[test]
    fn rejects_bad_base_url() {
        let config: Config =
            serde_json::from_str(r#"{"validator": {"baseUrl": "ftp://validator"}}"#).unwrap();
        let err = ConfigLoader::resolve_config(config, None).unwrap_err();
        assert_matches!(err, IngestError::ConfigValue(_));
    }
}
