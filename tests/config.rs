use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use deposit_ingest::config::{Config, ConfigLoader};
use deposit_ingest::error::IngestError;
use deposit_ingest::ingest::DraftPolicy;

#[test]
fn resolves_full_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ingest.json");
    fs::write(
        &path,
        r#"{
            "schemaVersion": 1,
            "dataverse": {
                "baseUrl": "https://dataverse.example.org",
                "apiKey": "abc-123",
                "collection": "dans",
                "timeoutSecs": 120
            },
            "validator": {"baseUrl": "http://localhost:20180/"},
            "ingest": {
                "publish": false,
                "draftPolicy": "delete",
                "contact": {"name": "Support", "email": "support@example.org"}
            }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();

    let dataverse = resolved.dataverse().unwrap();
    assert_eq!(dataverse.base_url, "https://dataverse.example.org");
    assert_eq!(dataverse.collection, "dans");
    assert_eq!(dataverse.timeout, Duration::from_secs(120));
    assert_eq!(
        resolved.validator().unwrap().base_url,
        "http://localhost:20180"
    );
    assert!(!resolved.ingest.publish);
    assert_eq!(resolved.ingest.draft_policy, DraftPolicy::Delete);
    assert_eq!(
        resolved.contact.as_ref().map(|contact| contact.email.as_str()),
        Some("support@example.org")
    );
}

#[test]
fn explicit_path_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("absent.json");

    let err = ConfigLoader::resolve(missing.to_str()).unwrap_err();
    assert_matches!(err, IngestError::ConfigRead(_));
}

#[test]
fn malformed_json_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ingest.json");
    fs::write(&path, r#"{"dataverse": "#).unwrap();

    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, IngestError::ConfigParse(_));
}

#[test]
fn unknown_schema_version_is_rejected() {
    let config = Config {
        schema_version: Some(2),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config, None).unwrap_err();
    assert_matches!(err, IngestError::ConfigValue(_));
}
