//! Core domain types for SchoolForge enrichment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// Sentinel string marking an enumerated or text field as unset.
///
/// Classification fields default to this value rather than null, so callers
/// must go through [`School::is_missing`] instead of null-checking.
pub const MISSING_SENTINEL: &str = "Unknown";

// ---------------------------------------------------------------------------
// SchoolId
// ---------------------------------------------------------------------------

/// Unique, immutable school identifier. Generated on creation if absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchoolId(pub String);

impl SchoolId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SchoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SchoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SchoolId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// The canonical schema fields, in schema-iteration order.
///
/// The identity field (`school_id`) and `target_school` are not listed:
/// identity is never "missing" and booleans have no sentinel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    SchoolName,
    Address,
    City,
    Zip,
    County,
    Phone,
    Latitude,
    Longitude,
    LeaId,
    UrbanAreaClassification,
    SchoolType,
    ReligiousOrientation,
    SchoolNetwork,
    CatholicDiocese,
    DaysInSchoolYear,
    TotalStudentEnrollment,
    DastPipelineStage,
    Source,
    EdlinkId,
    TwentyId,
    NcesId,
    StateId,
    SchoolAssociation,
    LcmsDistrict,
}

/// Coercion class for an extracted field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Trimmed text (or `content` attribute fallback).
    Text,
    /// Floating-point parse of the raw text (latitude/longitude).
    Geo,
    /// Integer parse after stripping non-digit characters.
    Count,
    /// Float parse after stripping non-digit/non-dot characters.
    Days,
    /// One sub-record per matching element.
    Associations,
}

impl Field {
    /// All schema fields in iteration order.
    pub const ALL: [Field; 24] = [
        Field::SchoolName,
        Field::Address,
        Field::City,
        Field::Zip,
        Field::County,
        Field::Phone,
        Field::Latitude,
        Field::Longitude,
        Field::LeaId,
        Field::UrbanAreaClassification,
        Field::SchoolType,
        Field::ReligiousOrientation,
        Field::SchoolNetwork,
        Field::CatholicDiocese,
        Field::DaysInSchoolYear,
        Field::TotalStudentEnrollment,
        Field::DastPipelineStage,
        Field::Source,
        Field::EdlinkId,
        Field::TwentyId,
        Field::NcesId,
        Field::StateId,
        Field::SchoolAssociation,
        Field::LcmsDistrict,
    ];

    /// Snake-case name, matching both the wire format and the DB column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::SchoolName => "school_name",
            Field::Address => "address",
            Field::City => "city",
            Field::Zip => "zip",
            Field::County => "county",
            Field::Phone => "phone",
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
            Field::LeaId => "lea_id",
            Field::UrbanAreaClassification => "urban_area_classification",
            Field::SchoolType => "school_type",
            Field::ReligiousOrientation => "religious_orientation",
            Field::SchoolNetwork => "school_network",
            Field::CatholicDiocese => "catholic_diocese",
            Field::DaysInSchoolYear => "days_in_school_year",
            Field::TotalStudentEnrollment => "total_student_enrollment",
            Field::DastPipelineStage => "dast_pipeline_stage",
            Field::Source => "source",
            Field::EdlinkId => "edlink_id",
            Field::TwentyId => "twenty_id",
            Field::NcesId => "nces_id",
            Field::StateId => "state_id",
            Field::SchoolAssociation => "school_association",
            Field::LcmsDistrict => "lcms_district",
        }
    }

    /// Coercion class applied by the extractor.
    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Latitude | Field::Longitude => FieldKind::Geo,
            Field::Zip | Field::TotalStudentEnrollment => FieldKind::Count,
            Field::DaysInSchoolYear => FieldKind::Days,
            Field::SchoolAssociation => FieldKind::Associations,
            _ => FieldKind::Text,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// An association sub-record, holding just a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub name: String,
}

/// A typed value produced by the extractor for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Int(u32),
    Float(f64),
    Associations(Vec<Association>),
}

/// Ordered field→value mapping (schema order via `Field`'s `Ord`).
pub type FieldValues = BTreeMap<Field, FieldValue>;

// ---------------------------------------------------------------------------
// School
// ---------------------------------------------------------------------------

/// The canonical record being enriched: a school profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    /// Unique identifier, generated on creation if absent.
    #[serde(default)]
    pub school_id: SchoolId,
    pub school_name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip: Option<u32>,
    pub county: Option<String>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub lea_id: Option<String>,
    /// Enumerated classification; defaults to the sentinel, never null.
    #[serde(default = "sentinel")]
    pub urban_area_classification: String,
    /// Enumerated classification; defaults to the sentinel, never null.
    #[serde(default = "sentinel")]
    pub school_type: String,
    pub religious_orientation: Option<String>,
    pub school_network: Option<String>,
    pub catholic_diocese: Option<String>,
    pub days_in_school_year: Option<f64>,
    pub total_student_enrollment: Option<u32>,
    pub dast_pipeline_stage: Option<String>,
    pub source: Option<String>,
    pub edlink_id: Option<String>,
    pub twenty_id: Option<String>,
    pub nces_id: Option<String>,
    pub state_id: Option<String>,
    pub school_association: Option<Vec<Association>>,
    #[serde(default)]
    pub target_school: bool,
    pub lcms_district: Option<String>,
}

fn sentinel() -> String {
    MISSING_SENTINEL.to_string()
}

impl Default for School {
    fn default() -> Self {
        Self {
            school_id: SchoolId::new(),
            school_name: None,
            address: None,
            city: None,
            zip: None,
            county: None,
            phone: None,
            latitude: None,
            longitude: None,
            lea_id: None,
            urban_area_classification: sentinel(),
            school_type: sentinel(),
            religious_orientation: None,
            school_network: None,
            catholic_diocese: None,
            days_in_school_year: None,
            total_student_enrollment: None,
            dast_pipeline_stage: None,
            source: None,
            edlink_id: None,
            twenty_id: None,
            nces_id: None,
            state_id: None,
            school_association: None,
            target_school: false,
            lcms_district: None,
        }
    }
}

/// Null/absent or sentinel-valued text is missing.
fn text_missing(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v == MISSING_SENTINEL)
}

impl School {
    /// Whether `field` is missing under the sentinel rule: null/absent, or
    /// equal to the literal [`MISSING_SENTINEL`].
    pub fn is_missing(&self, field: Field) -> bool {
        match field {
            Field::SchoolName => text_missing(&self.school_name),
            Field::Address => text_missing(&self.address),
            Field::City => text_missing(&self.city),
            Field::Zip => self.zip.is_none(),
            Field::County => text_missing(&self.county),
            Field::Phone => text_missing(&self.phone),
            Field::Latitude => self.latitude.is_none(),
            Field::Longitude => self.longitude.is_none(),
            Field::LeaId => text_missing(&self.lea_id),
            Field::UrbanAreaClassification => {
                self.urban_area_classification == MISSING_SENTINEL
            }
            Field::SchoolType => self.school_type == MISSING_SENTINEL,
            Field::ReligiousOrientation => text_missing(&self.religious_orientation),
            Field::SchoolNetwork => text_missing(&self.school_network),
            Field::CatholicDiocese => text_missing(&self.catholic_diocese),
            Field::DaysInSchoolYear => self.days_in_school_year.is_none(),
            Field::TotalStudentEnrollment => self.total_student_enrollment.is_none(),
            Field::DastPipelineStage => text_missing(&self.dast_pipeline_stage),
            Field::Source => text_missing(&self.source),
            Field::EdlinkId => text_missing(&self.edlink_id),
            Field::TwentyId => text_missing(&self.twenty_id),
            Field::NcesId => text_missing(&self.nces_id),
            Field::StateId => text_missing(&self.state_id),
            Field::SchoolAssociation => self.school_association.is_none(),
            Field::LcmsDistrict => text_missing(&self.lcms_district),
        }
    }

    /// Display name for batch payloads and logs.
    pub fn display_name(&self) -> &str {
        match self.school_name.as_deref() {
            Some(name) if name != MISSING_SENTINEL => name,
            _ => "Unknown School",
        }
    }

    /// Set `field` to an extracted value. Fails only on a kind mismatch,
    /// which indicates a malformed schema configuration.
    pub fn apply(&mut self, field: Field, value: &FieldValue) -> crate::Result<()> {
        use crate::SchoolForgeError;

        let mismatch = || SchoolForgeError::Reconciliation {
            message: format!("value kind does not match field '{field}'"),
        };

        match (field, value) {
            (Field::Zip, FieldValue::Int(n)) => self.zip = Some(*n),
            (Field::TotalStudentEnrollment, FieldValue::Int(n)) => {
                self.total_student_enrollment = Some(*n)
            }
            (Field::Latitude, FieldValue::Float(v)) => self.latitude = Some(*v),
            (Field::Longitude, FieldValue::Float(v)) => self.longitude = Some(*v),
            (Field::DaysInSchoolYear, FieldValue::Float(v)) => {
                self.days_in_school_year = Some(*v)
            }
            (Field::SchoolAssociation, FieldValue::Associations(list)) => {
                self.school_association = Some(list.clone())
            }
            (Field::UrbanAreaClassification, FieldValue::Text(s)) => {
                self.urban_area_classification = s.clone()
            }
            (Field::SchoolType, FieldValue::Text(s)) => self.school_type = s.clone(),
            (field, FieldValue::Text(s)) => {
                let slot = match field {
                    Field::SchoolName => &mut self.school_name,
                    Field::Address => &mut self.address,
                    Field::City => &mut self.city,
                    Field::County => &mut self.county,
                    Field::Phone => &mut self.phone,
                    Field::LeaId => &mut self.lea_id,
                    Field::ReligiousOrientation => &mut self.religious_orientation,
                    Field::SchoolNetwork => &mut self.school_network,
                    Field::CatholicDiocese => &mut self.catholic_diocese,
                    Field::DastPipelineStage => &mut self.dast_pipeline_stage,
                    Field::Source => &mut self.source,
                    Field::EdlinkId => &mut self.edlink_id,
                    Field::TwentyId => &mut self.twenty_id,
                    Field::NcesId => &mut self.nces_id,
                    Field::StateId => &mut self.state_id,
                    Field::LcmsDistrict => &mut self.lcms_district,
                    _ => return Err(mismatch()),
                };
                *slot = Some(s.clone());
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SourceConfig
// ---------------------------------------------------------------------------

/// Selector mapping and URL template for one external data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Registry lookup name.
    pub name: String,
    /// Base URL that search paths and result links resolve against.
    pub base_url: Url,
    /// Search path template, parameterized by `{query}`.
    pub search_path: String,
    /// Per-field selector overrides; unlisted fields fall back to the
    /// default cross-source mapping.
    pub selectors: BTreeMap<Field, String>,
}

/// Minimal source descriptor carried as batch context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub name: String,
    pub base_url: String,
}

impl From<&SourceConfig> for SourceSummary {
    fn from(config: &SourceConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.to_string(),
        }
    }
}
