use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

const DOI_SCHEME: &str = "doi:";
const DOI_RESOLVERS: [&str; 3] = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/"];

fn doi_regex() -> &'static Regex {
    static DOI_RE: OnceLock<Regex> = OnceLock::new();
    DOI_RE.get_or_init(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("static DOI pattern"))
}

/// A DOI without scheme or resolver prefix, e.g. `10.17026/dans-z6x-5ab9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Doi(String);

impl Doi {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier as Dataverse addresses it: `doi:<doi>`.
    pub fn to_pid(&self) -> String {
        format!("{DOI_SCHEME}{}", self.0)
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Doi {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut normalized = value.trim();
        for prefix in DOI_RESOLVERS {
            if let Some(rest) = normalized.strip_prefix(prefix) {
                normalized = rest;
            }
        }
        if normalized
            .get(..DOI_SCHEME.len())
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case(DOI_SCHEME))
        {
            normalized = &normalized[DOI_SCHEME.len()..];
        }
        if !doi_regex().is_match(normalized) {
            return Err(IngestError::InvalidDoi(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for Doi {
    type Error = IngestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Doi> for String {
    fn from(value: Doi) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepositId(String);

impl DepositId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DepositId {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
        if !is_valid {
            return Err(IngestError::InvalidDepositId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// Persistent identifier the repository assigned to a dataset, kept exactly as
/// returned (for Dataverse: `doi:10.5072/FK2/ABCDEF`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DatasetIdentifier(String);

impl DatasetIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetIdentifier {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return Err(IngestError::InvalidDatasetIdentifier(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionBump {
    Major,
    Minor,
}

impl VersionBump {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionBump::Major => "major",
            VersionBump::Minor => "minor",
        }
    }
}

impl fmt::Display for VersionBump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_doi_strips_scheme_and_resolver() {
        let plain: Doi = "10.17026/dans-z6x-5ab9".parse().unwrap();
        let scheme: Doi = "doi:10.17026/dans-z6x-5ab9".parse().unwrap();
        let resolver: Doi = "https://doi.org/10.17026/dans-z6x-5ab9".parse().unwrap();

        assert_eq!(plain.as_str(), "10.17026/dans-z6x-5ab9");
        assert_eq!(scheme, plain);
        assert_eq!(resolver, plain);
        assert_eq!(plain.to_pid(), "doi:10.17026/dans-z6x-5ab9");
    }

    #[test]
    fn parse_doi_invalid() {
        let err = "11.1234/abc".parse::<Doi>().unwrap_err();
        assert_matches!(err, IngestError::InvalidDoi(_));
        let err = "10.12/abc".parse::<Doi>().unwrap_err();
        assert_matches!(err, IngestError::InvalidDoi(_));
    }

    #[test]
    fn parse_deposit_id() {
        let id: DepositId = " 8f2e1c4a-0b7d-4e8f-9a1b-2c3d4e5f6a7b ".parse().unwrap();
        assert_eq!(id.as_str(), "8f2e1c4a-0b7d-4e8f-9a1b-2c3d4e5f6a7b");

        let err = "../escape".parse::<DepositId>().unwrap_err();
        assert_matches!(err, IngestError::InvalidDepositId(_));
    }

    #[test]
    fn dataset_identifier_rejects_blank() {
        let err = "   ".parse::<DatasetIdentifier>().unwrap_err();
        assert_matches!(err, IngestError::InvalidDatasetIdentifier(_));
    }
}
