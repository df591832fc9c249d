//! Deposit metadata document and its mapping onto the Dataverse citation block.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// `metadata/dataset.json` of a deposit bag. Every field is optional here;
/// the mapper decides what is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositMetadata {
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub alternative_titles: Vec<String>,
    #[serde(default)]
    pub descriptions: Vec<String>,
    #[serde(default)]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub audiences: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub available: Option<String>,
    #[serde(default)]
    pub access_rights: Option<String>,
    #[serde(default)]
    pub contact: Option<Contact>,
}

impl DepositMetadata {
    /// Access rights declared for the dataset as a whole.
    pub fn access_rights(&self) -> Result<AccessRights, IngestError> {
        self.access_rights
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or(IngestError::MissingField("accessRights"))?
            .parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Creator {
    pub name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRights {
    OpenAccess,
    OpenAccessForRegisteredUsers,
    RequestPermission,
    NoAccess,
}

impl AccessRights {
    /// Whether files without their own access setting start out restricted.
    pub fn restricts_files(&self) -> bool {
        !matches!(self, AccessRights::OpenAccess)
    }
}

impl fmt::Display for AccessRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            AccessRights::OpenAccess => "OPEN_ACCESS",
            AccessRights::OpenAccessForRegisteredUsers => "OPEN_ACCESS_FOR_REGISTERED_USERS",
            AccessRights::RequestPermission => "REQUEST_PERMISSION",
            AccessRights::NoAccess => "NO_ACCESS",
        };
        f.write_str(value)
    }
}

impl FromStr for AccessRights {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "OPEN_ACCESS" => Ok(AccessRights::OpenAccess),
            "OPEN_ACCESS_FOR_REGISTERED_USERS" => Ok(AccessRights::OpenAccessForRegisteredUsers),
            "REQUEST_PERMISSION" => Ok(AccessRights::RequestPermission),
            "NO_ACCESS" => Ok(AccessRights::NoAccess),
            other => Err(IngestError::UnknownTerm {
                vocabulary: "accessRights",
                value: other.to_string(),
            }),
        }
    }
}

/// Dataverse native JSON for a new dataset version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetDescription {
    #[serde(rename = "datasetVersion")]
    pub dataset_version: DatasetVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetVersion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_access: Option<String>,
    pub file_access_request: bool,
    pub metadata_blocks: MetadataBlocks,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataBlocks {
    pub citation: MetadataBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBlock {
    pub display_name: String,
    pub fields: Vec<MetadataField>,
}

impl MetadataBlock {
    pub fn field(&self, type_name: &str) -> Option<&MetadataField> {
        self.fields.iter().find(|field| field.type_name == type_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeClass {
    Primitive,
    ControlledVocabulary,
    Compound,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Single(String),
    Multiple(Vec<String>),
    Compound(Vec<BTreeMap<String, MetadataField>>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataField {
    pub type_name: String,
    pub multiple: bool,
    pub type_class: TypeClass,
    pub value: FieldValue,
}

impl MetadataField {
    pub fn primitive(type_name: &str, value: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            multiple: false,
            type_class: TypeClass::Primitive,
            value: FieldValue::Single(value.to_string()),
        }
    }

    pub fn primitives(type_name: &str, values: Vec<String>) -> Self {
        Self {
            type_name: type_name.to_string(),
            multiple: true,
            type_class: TypeClass::Primitive,
            value: FieldValue::Multiple(values),
        }
    }

    pub fn vocabulary(type_name: &str, values: Vec<String>) -> Self {
        Self {
            type_name: type_name.to_string(),
            multiple: true,
            type_class: TypeClass::ControlledVocabulary,
            value: FieldValue::Multiple(values),
        }
    }

    pub fn compound(type_name: &str, entries: Vec<Vec<MetadataField>>) -> Self {
        let value = entries
            .into_iter()
            .map(|entry| {
                entry
                    .into_iter()
                    .map(|field| (field.type_name.clone(), field))
                    .collect()
            })
            .collect();
        Self {
            type_name: type_name.to_string(),
            multiple: true,
            type_class: TypeClass::Compound,
            value: FieldValue::Compound(value),
        }
    }
}

pub trait MetadataMapper: Send + Sync {
    fn map(&self, metadata: &DepositMetadata) -> Result<DatasetDescription, IngestError>;
}

/// Maps deposit metadata onto the Dataverse citation metadata block.
#[derive(Debug, Clone, Default)]
pub struct CitationMapper {
    fallback_contact: Option<Contact>,
}

impl CitationMapper {
    pub fn new(fallback_contact: Option<Contact>) -> Self {
        Self { fallback_contact }
    }

    fn contact<'a>(&'a self, metadata: &'a DepositMetadata) -> Result<&'a Contact, IngestError> {
        metadata
            .contact
            .as_ref()
            .or(self.fallback_contact.as_ref())
            .ok_or(IngestError::MissingField("contact"))
    }
}

impl MetadataMapper for CitationMapper {
    fn map(&self, metadata: &DepositMetadata) -> Result<DatasetDescription, IngestError> {
        let title = first_non_blank(&metadata.titles).ok_or(IngestError::MissingField("title"))?;
        let descriptions = non_blank(&metadata.descriptions);
        if descriptions.is_empty() {
            return Err(IngestError::MissingField("description"));
        }
        if metadata.creators.iter().all(|creator| creator.name.trim().is_empty()) {
            return Err(IngestError::MissingField("creator"));
        }
        if metadata.audiences.is_empty() {
            return Err(IngestError::MissingField("audience"));
        }
        let created = metadata
            .created
            .as_deref()
            .ok_or(IngestError::MissingField("created"))?;
        let access_rights = metadata.access_rights()?;
        let contact = self.contact(metadata)?;

        let mut fields = vec![MetadataField::primitive("title", title)];

        // Extra titles from the deposit count as alternative titles.
        let alternatives = non_blank(&metadata.titles)
            .into_iter()
            .skip(1)
            .chain(non_blank(&metadata.alternative_titles))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !alternatives.is_empty() {
            fields.push(MetadataField::primitives("alternativeTitle", alternatives));
        }

        fields.push(MetadataField::compound(
            "author",
            metadata
                .creators
                .iter()
                .filter(|creator| !creator.name.trim().is_empty())
                .map(author_entry)
                .collect(),
        ));

        fields.push(MetadataField::compound(
            "datasetContact",
            vec![vec![
                MetadataField::primitive("datasetContactName", &contact.name),
                MetadataField::primitive("datasetContactEmail", &contact.email),
            ]],
        ));

        fields.push(MetadataField::compound(
            "dsDescription",
            descriptions
                .iter()
                .map(|text| vec![MetadataField::primitive("dsDescriptionValue", text)])
                .collect(),
        ));

        let subjects = subjects_for(&metadata.audiences)?;
        fields.push(MetadataField::vocabulary("subject", subjects));

        let keywords = non_blank(&metadata.keywords);
        if !keywords.is_empty() {
            fields.push(MetadataField::compound(
                "keyword",
                keywords
                    .iter()
                    .map(|keyword| vec![MetadataField::primitive("keywordValue", keyword)])
                    .collect(),
            ));
        }

        fields.push(MetadataField::primitive(
            "productionDate",
            &normalize_date("created", created)?,
        ));
        if let Some(available) = metadata.available.as_deref() {
            fields.push(MetadataField::primitive(
                "distributionDate",
                &normalize_date("available", available)?,
            ));
        }

        let restricted = access_rights.restricts_files();
        Ok(DatasetDescription {
            dataset_version: DatasetVersion {
                terms_of_access: restricted.then(|| terms_of_access(access_rights)),
                file_access_request: restricted && access_rights != AccessRights::NoAccess,
                metadata_blocks: MetadataBlocks {
                    citation: MetadataBlock {
                        display_name: "Citation Metadata".to_string(),
                        fields,
                    },
                },
            },
        })
    }
}

fn author_entry(creator: &Creator) -> Vec<MetadataField> {
    let mut entry = vec![MetadataField::primitive("authorName", creator.name.trim())];
    if let Some(affiliation) = creator.affiliation.as_deref().filter(|v| !v.trim().is_empty()) {
        entry.push(MetadataField::primitive("authorAffiliation", affiliation.trim()));
    }
    if let Some(orcid) = creator.orcid.as_deref().filter(|v| !v.trim().is_empty()) {
        entry.push(MetadataField {
            type_name: "authorIdentifierScheme".to_string(),
            multiple: false,
            type_class: TypeClass::ControlledVocabulary,
            value: FieldValue::Single("ORCID".to_string()),
        });
        entry.push(MetadataField::primitive("authorIdentifier", orcid.trim()));
    }
    entry
}

fn terms_of_access(access_rights: AccessRights) -> String {
    match access_rights {
        AccessRights::OpenAccess => String::new(),
        AccessRights::OpenAccessForRegisteredUsers => {
            "Files are available to registered users of the repository.".to_string()
        }
        AccessRights::RequestPermission => {
            "Files are available after permission of the depositor.".to_string()
        }
        AccessRights::NoAccess => "Files are not available.".to_string(),
    }
}

// NARCIS discipline prefixes to Dataverse subjects; longest prefix wins.
const AUDIENCE_SUBJECTS: &[(&str, &str)] = &[
    ("D11", "Mathematical Sciences"),
    ("D12", "Physics"),
    ("D13", "Chemistry"),
    ("D14", "Engineering"),
    ("D15", "Earth and Environmental Sciences"),
    ("D16", "Computer and Information Science"),
    ("D17", "Astronomy and Astrophysics"),
    ("D18", "Agricultural Sciences"),
    ("D2", "Medicine, Health and Life Sciences"),
    ("D3", "Arts and Humanities"),
    ("D4", "Law"),
    ("D5", "Social Sciences"),
    ("D6", "Social Sciences"),
    ("D7", "Business and Management"),
    ("E1", "Earth and Environmental Sciences"),
];

pub fn subject_for_audience(code: &str) -> Result<&'static str, IngestError> {
    let code = code.trim();
    let well_formed = code.len() == 6
        && code.starts_with(['D', 'E'])
        && code[1..].chars().all(|ch| ch.is_ascii_digit());
    let subject = well_formed
        .then(|| {
            AUDIENCE_SUBJECTS
                .iter()
                .filter(|(prefix, _)| code.starts_with(prefix))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, subject)| *subject)
        })
        .flatten();
    subject.ok_or_else(|| IngestError::UnknownTerm {
        vocabulary: "audience",
        value: code.to_string(),
    })
}

fn subjects_for(audiences: &[String]) -> Result<Vec<String>, IngestError> {
    let mut subjects: Vec<String> = Vec::new();
    for audience in audiences {
        let subject = subject_for_audience(audience)?;
        if !subjects.iter().any(|existing| existing == subject) {
            subjects.push(subject.to_string());
        }
    }
    Ok(subjects)
}

fn normalize_date(field: &'static str, value: &str) -> Result<String, IngestError> {
    let trimmed = value.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|_| IngestError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

fn first_non_blank(values: &[String]) -> Option<&str> {
    values
        .iter()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}

fn non_blank(values: &[String]) -> Vec<&str> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect()
}
