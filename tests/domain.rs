use assert_matches::assert_matches;

use deposit_ingest::domain::{DatasetIdentifier, DepositId, Doi, VersionBump};
use deposit_ingest::error::IngestError;

#[test]
fn doi_forms_normalize_to_bare_doi() {
    for input in [
        "10.17026/dans-2xg-umq8",
        "doi:10.17026/dans-2xg-umq8",
        "DOI:10.17026/dans-2xg-umq8",
        "https://doi.org/10.17026/dans-2xg-umq8",
        "https://dx.doi.org/10.17026/dans-2xg-umq8",
    ] {
        let doi: Doi = input.parse().unwrap();
        assert_eq!(doi.as_str(), "10.17026/dans-2xg-umq8", "{input}");
        assert_eq!(doi.to_pid(), "doi:10.17026/dans-2xg-umq8");
    }
}

#[test]
fn doi_without_registrant_prefix_is_invalid() {
    for input in ["", "10.1/short", "11.17026/abc", "10.17026/", "doï:10.17026/x"] {
        let err = input.parse::<Doi>().unwrap_err();
        assert_matches!(err, IngestError::InvalidDoi(_), "{input}");
    }
}

#[test]
fn doi_deserializes_through_parsing() {
    let doi: Doi = serde_json::from_str(r#""doi:10.5072/FK2/ABC""#).unwrap();
    assert_eq!(doi.as_str(), "10.5072/FK2/ABC");
    assert!(serde_json::from_str::<Doi>(r#""nope""#).is_err());
}

#[test]
fn deposit_and_dataset_identifiers() {
    assert!("easy-dataset.17".parse::<DepositId>().is_ok());
    assert_matches!(
        "../escape".parse::<DepositId>(),
        Err(IngestError::InvalidDepositId(_))
    );

    let dataset: DatasetIdentifier = "doi:10.5072/FK2/ABC".parse().unwrap();
    assert_eq!(dataset.to_string(), "doi:10.5072/FK2/ABC");
    assert_matches!(
        "doi:10.5072/FK2 ABC".parse::<DatasetIdentifier>(),
        Err(IngestError::InvalidDatasetIdentifier(_))
    );
}

#[test]
fn version_bump_query_values() {
    assert_eq!(VersionBump::Major.as_str(), "major");
    assert_eq!(VersionBump::Minor.to_string(), "minor");
}
