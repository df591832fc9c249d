use std::fs;
use std::io::Write;
use std::path::Path;

use assert_matches::assert_matches;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use deposit_ingest::deposit::DepositLoader;
use deposit_ingest::error::IngestError;
use deposit_ingest::metadata::AccessRights;

const DATASET: &str = r#"{"titles": ["Survey"], "accessRights": "REQUEST_PERMISSION"}"#;
const FILES: &str = r#"{"files": [{"filepath": "data/survey.csv"}]}"#;

fn write_bag(bag: &Path) {
    fs::create_dir_all(bag.join("metadata")).unwrap();
    fs::create_dir_all(bag.join("data")).unwrap();
    fs::write(bag.join("metadata/dataset.json"), DATASET).unwrap();
    fs::write(bag.join("metadata/files.json"), FILES).unwrap();
    fs::write(bag.join("data/survey.csv"), "id,answer\n1,yes\n").unwrap();
}

#[test]
fn loads_directory_deposit_with_single_bag() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(
        temp.path().join("deposit.json"),
        r#"{"depositId": "dep-42", "doi": "doi:10.17026/DANS-XYZ-1"}"#,
    )
    .unwrap();
    write_bag(&temp.path().join("survey-bag"));

    let loaded = DepositLoader::open(temp.path()).unwrap();
    let deposit = loaded.deposit();

    assert_eq!(deposit.id().as_str(), "dep-42");
    assert_eq!(deposit.doi().map(|doi| doi.as_str()), Some("10.17026/DANS-XYZ-1"));
    assert!(deposit.bag_dir().ends_with("survey-bag"));

    let metadata = deposit.load_metadata().unwrap();
    assert_eq!(metadata.access_rights().unwrap(), AccessRights::RequestPermission);
    assert_eq!(deposit.load_manifest().unwrap().files.len(), 1);
}

#[test]
fn named_bag_is_picked_among_several() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(
        temp.path().join("deposit.json"),
        r#"{"depositId": "dep-43", "doi": "", "bag": "second"}"#,
    )
    .unwrap();
    write_bag(&temp.path().join("first"));
    write_bag(&temp.path().join("second"));

    let deposit = DepositLoader::load_dir(temp.path()).unwrap();

    assert!(deposit.bag_dir().ends_with("second"));
    assert!(deposit.doi().is_none());
}

#[test]
fn named_bag_must_be_a_direct_child() {
    let outer = tempfile::tempdir().unwrap();
    let deposit_dir = outer.path().join("deposit");
    write_bag(&outer.path().join("elsewhere"));
    write_bag(&deposit_dir.join("bag"));

    let escape = outer.path().join("elsewhere");
    for bag in ["../elsewhere", escape.to_str().unwrap(), "bag/data", "."] {
        fs::write(
            deposit_dir.join("deposit.json"),
            serde_json::json!({"depositId": "dep-48", "bag": bag}).to_string(),
        )
        .unwrap();
        let err = DepositLoader::load_dir(&deposit_dir).unwrap_err();
        assert_matches!(
            err,
            IngestError::InvalidDeposit { ref reason, .. } if reason.contains("not a directory name"),
            "{bag}"
        );
    }
}

#[test]
fn ambiguous_or_missing_bag_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("deposit.json"), r#"{"depositId": "dep-44"}"#).unwrap();

    let err = DepositLoader::load_dir(temp.path()).unwrap_err();
    assert_matches!(err, IngestError::InvalidDeposit { ref reason, .. } if reason.contains("no bag"));

    write_bag(&temp.path().join("one"));
    write_bag(&temp.path().join("two"));
    let err = DepositLoader::load_dir(temp.path()).unwrap_err();
    assert_matches!(err, IngestError::InvalidDeposit { ref reason, .. } if reason.contains("more than one"));
}

#[test]
fn invalid_properties_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    write_bag(&temp.path().join("bag"));

    let err = DepositLoader::load_dir(temp.path()).unwrap_err();
    assert_matches!(err, IngestError::InvalidDeposit { .. });

    fs::write(
        temp.path().join("deposit.json"),
        r#"{"depositId": "dep-45", "doi": "not-a-doi"}"#,
    )
    .unwrap();
    let err = DepositLoader::load_dir(temp.path()).unwrap_err();
    assert_matches!(err, IngestError::InvalidDoi(_));

    fs::write(temp.path().join("deposit.json"), r#"{"depositId": "dep 45"}"#).unwrap();
    let err = DepositLoader::load_dir(temp.path()).unwrap_err();
    assert_matches!(err, IngestError::InvalidDepositId(_));
}

#[test]
fn missing_documents_are_reported_on_load() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("deposit.json"), r#"{"depositId": "dep-46"}"#).unwrap();
    fs::create_dir_all(temp.path().join("bag/data")).unwrap();

    let deposit = DepositLoader::load_dir(temp.path()).unwrap();

    assert_matches!(deposit.load_metadata(), Err(IngestError::MetadataRead(_)));
    assert_matches!(deposit.load_manifest(), Err(IngestError::ManifestRead(_)));
}

#[test]
fn zipped_deposit_is_unpacked_for_the_lifetime_of_the_load() {
    let temp = tempfile::tempdir().unwrap();
    let zip_path = temp.path().join("dep-47.zip");
    let mut zip = ZipWriter::new(fs::File::create(&zip_path).unwrap());
    let options = SimpleFileOptions::default();
    for (name, content) in [
        ("dep-47/deposit.json", r#"{"depositId": "dep-47"}"#),
        ("dep-47/bag/metadata/dataset.json", DATASET),
        ("dep-47/bag/metadata/files.json", FILES),
        ("dep-47/bag/data/survey.csv", "id,answer\n"),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();

    let loaded = DepositLoader::open(&zip_path).unwrap();
    let bag_dir = loaded.deposit().bag_dir().to_owned();

    assert_eq!(loaded.deposit().id().as_str(), "dep-47");
    assert!(bag_dir.join("data/survey.csv").is_file());

    drop(loaded);
    assert!(!bag_dir.exists());
}
