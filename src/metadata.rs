// Metadata types for the deposition API. The shapes mirror what the service
// accepts on its deposit endpoints, so serialization skips anything unset
// rather than sending explicit nulls.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Today's date as `YYYY-MM-DD`, the service's convention for version
/// strings and publication dates.
pub(crate) fn today() -> String {
    OffsetDateTime::now_utc()
        .date()
        .format(DATE_FORMAT)
        .expect("static date format")
}

/// A creator of a deposition. `name` follows the service's
/// "Family name, given names" convention; `validate` on the containing
/// metadata checks this.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
    /// German National Library identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gnd: Option<String>,
}

impl Creator {
    pub fn new(name: impl Into<String>) -> Self {
        Creator {
            name: name.into(),
            affiliation: None,
            orcid: None,
            gnd: None,
        }
    }

    /// The ORCID identifier as a URL, if one is set.
    pub fn orcid_url(&self) -> Option<String> {
        self.orcid
            .as_ref()
            .map(|orcid| format!("https://orcid.org/{orcid}"))
    }

    /// The GND identifier as a URL, if one is set.
    pub fn gnd_url(&self) -> Option<String> {
        self.gnd
            .as_ref()
            .map(|gnd| format!("https://d-nb.info/gnd/{gnd}"))
    }
}

/// Resource type of an upload.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    Publication,
    Poster,
    Presentation,
    Dataset,
    Image,
    Video,
    Software,
    Lesson,
    PhysicalObject,
    Other,
}

/// Refinement of [`UploadType::Publication`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublicationType {
    AnnotationCollection,
    Book,
    Section,
    ConferencePaper,
    DataManagementPlan,
    Article,
    Patent,
    Preprint,
    Deliverable,
    Milestone,
    Proposal,
    Report,
    SoftwareDocumentation,
    TaxonomicTreatment,
    TechnicalNote,
    Thesis,
    WorkingPaper,
    Other,
}

/// Refinement of [`UploadType::Image`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Figure,
    Plot,
    Drawing,
    Diagram,
    Photo,
    Other,
}

/// Access level of a published deposition.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessRight {
    #[default]
    Open,
    Embargoed,
    Restricted,
    Closed,
}

/// A community a deposition belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Community {
    pub identifier: String,
}

/// Metadata sent when creating or updating a deposition. On the wire the
/// body is wrapped as `{"metadata": {...}}`; the client does the wrapping.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Metadata {
    pub title: String,
    pub upload_type: UploadType,
    pub description: String,
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub access_right: AccessRight,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_type: Option<PublicationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_type: Option<ImageType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub communities: Vec<Community>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embargo_date: Option<String>,
}

impl Metadata {
    /// Metadata with the service's defaults: open access, English, CC0
    /// license, and today's date as the version.
    pub fn new(
        title: impl Into<String>,
        upload_type: UploadType,
        description: impl Into<String>,
        creators: Vec<Creator>,
    ) -> Self {
        Metadata {
            title: title.into(),
            upload_type,
            description: description.into(),
            creators,
            access_right: AccessRight::Open,
            language: Some("eng".to_string()),
            version: Some(today()),
            license: Some("CC0-1.0".to_string()),
            publication_type: None,
            image_type: None,
            publication_date: None,
            communities: Vec::new(),
            keywords: Vec::new(),
            notes: None,
            embargo_date: None,
        }
    }

    /// Check the cross-field rules the service enforces server-side, so a
    /// bad payload fails before any request is made.
    pub fn validate(&self) -> Result<()> {
        for creator in &self.creators {
            if !creator.name.contains(',') {
                bail!(
                    "creator name {:?} should be in the format \"Family name, given names\"",
                    creator.name
                );
            }
        }
        if self.upload_type == UploadType::Publication && self.publication_type.is_none() {
            bail!("missing publication_type for upload_type \"publication\"");
        }
        if self.publication_type.is_some() && self.upload_type != UploadType::Publication {
            bail!("publication_type requires upload_type \"publication\"");
        }
        if self.upload_type == UploadType::Image && self.image_type.is_none() {
            bail!("missing image_type for upload_type \"image\"");
        }
        if matches!(self.access_right, AccessRight::Open | AccessRight::Embargoed)
            && self.license.is_none()
        {
            bail!("a license is required for open or embargoed access");
        }
        if self.access_right == AccessRight::Embargoed && self.embargo_date.is_none() {
            bail!("missing embargo_date for embargoed access");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Metadata {
        Metadata::new(
            "Test Upload",
            UploadType::Dataset,
            "test description",
            vec![Creator {
                name: "Hoyt, Charles Tapley".to_string(),
                affiliation: Some("Harvard Medical School".to_string()),
                orcid: Some("0000-0003-4423-4370".to_string()),
                gnd: None,
            }],
        )
    }

    #[test]
    fn defaults_are_open_cc0_english() {
        let metadata = sample();
        assert_eq!(metadata.access_right, AccessRight::Open);
        assert_eq!(metadata.license.as_deref(), Some("CC0-1.0"));
        assert_eq!(metadata.language.as_deref(), Some("eng"));
        assert_eq!(metadata.version.as_deref(), Some(today().as_str()));
    }

    #[test]
    fn serializes_lowercase_and_skips_unset() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["upload_type"], json!("dataset"));
        assert_eq!(value["access_right"], json!("open"));
        let object = value.as_object().unwrap();
        assert!(!object.contains_key("publication_type"));
        assert!(!object.contains_key("keywords"));
        assert!(!object.contains_key("notes"));
        let creator = value["creators"][0].as_object().unwrap();
        assert!(!creator.contains_key("gnd"));
    }

    #[test]
    fn physicalobject_has_no_separator() {
        assert_eq!(
            serde_json::to_value(UploadType::PhysicalObject).unwrap(),
            json!("physicalobject")
        );
        assert_eq!(
            serde_json::to_value(PublicationType::AnnotationCollection).unwrap(),
            json!("annotationcollection")
        );
    }

    #[test]
    fn validate_requires_comma_in_name() {
        let mut metadata = sample();
        metadata.creators[0].name = "Charles".to_string();
        let err = metadata.validate().unwrap_err();
        assert!(err.to_string().contains("Family name"));
    }

    #[test]
    fn validate_publication_needs_publication_type() {
        let mut metadata = sample();
        metadata.upload_type = UploadType::Publication;
        assert!(metadata.validate().is_err());
        metadata.publication_type = Some(PublicationType::Article);
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn validate_rejects_publication_type_on_other_uploads() {
        let mut metadata = sample();
        metadata.publication_type = Some(PublicationType::Article);
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn validate_image_needs_image_type() {
        let mut metadata = sample();
        metadata.upload_type = UploadType::Image;
        assert!(metadata.validate().is_err());
        metadata.image_type = Some(ImageType::Figure);
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn validate_embargo_needs_date_and_license() {
        let mut metadata = sample();
        metadata.access_right = AccessRight::Embargoed;
        assert!(metadata.validate().is_err());
        metadata.embargo_date = Some("2030-01-01".to_string());
        assert!(metadata.validate().is_ok());
        metadata.license = None;
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn creator_identifier_urls() {
        let creator = sample().creators.remove(0);
        assert_eq!(
            creator.orcid_url().as_deref(),
            Some("https://orcid.org/0000-0003-4423-4370")
        );
        assert_eq!(creator.gnd_url(), None);
    }
}
