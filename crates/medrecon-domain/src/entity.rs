//! Clinical entities and their category-specific attributes

use crate::category::{EntityCategory, VitalKind};
use crate::confidence::BASE_CONFIDENCE;
use crate::error::{DomainError, Result};
use crate::lexicon;
use crate::provenance::{SourceLocation, MISSING_PROVENANCE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Raw attribute map as delivered by the structuring collaborator
pub type RawAttributes = BTreeMap<String, String>;

/// Namespace for deterministic entity identifiers
const ENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x6d65_6472_6563_4f6e_8e6e_7469_7479_4964);

/// Deterministic entity identifier
///
/// UUIDv5 over `<visit id>/<category>/<ordinal>`, so the same input always
/// yields the same identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Derive the identifier of the `ordinal`-th entity ingested into a visit
    pub fn derive(visit_id: &str, category: EntityCategory, ordinal: usize) -> Self {
        let name = format!("{}/{}/{}", visit_id, category.as_str(), ordinal);
        EntityId(Uuid::new_v5(&ENTITY_NAMESPACE, name.as_bytes()))
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Medication attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicationAttributes {
    /// Drug name as written
    pub name: String,
    /// Dose, e.g. `500mg`
    #[serde(default)]
    pub dose: Option<String>,
    /// Frequency, e.g. `BID`
    #[serde(default)]
    pub frequency: Option<String>,
    /// Route, e.g. `PO`
    #[serde(default)]
    pub route: Option<String>,
    /// Start date as written
    #[serde(default)]
    pub start_date: Option<String>,
    /// End date as written
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Problem / diagnosis attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemAttributes {
    /// Problem text as written
    pub problem: String,
    /// Diagnostic code, only when present in the source
    #[serde(default)]
    pub icd10_code: Option<String>,
    /// Status, e.g. `active`
    #[serde(default)]
    pub status: Option<String>,
    /// Onset date as written
    #[serde(default)]
    pub onset_date: Option<String>,
}

/// Lab result attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabResultAttributes {
    /// Test name as written
    pub test_name: String,
    /// Result value as written
    pub value: String,
    /// Unit
    #[serde(default)]
    pub unit: Option<String>,
    /// Reference range
    #[serde(default)]
    pub reference_range: Option<String>,
    /// Abnormal flag, e.g. `H`
    #[serde(default)]
    pub abnormal_flag: Option<String>,
    /// Date of the test as written
    #[serde(default)]
    pub test_date: Option<String>,
}

/// Vital sign attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VitalAttributes {
    /// Normalized vital kind
    pub kind: VitalKind,
    /// Value as written, e.g. `120/80`
    pub value: String,
    /// Unit
    #[serde(default)]
    pub unit: Option<String>,
}

/// Plan item attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItemAttributes {
    /// Action text as written
    pub action: String,
    /// Plan category, e.g. `follow-up`
    #[serde(default)]
    pub category: Option<String>,
}

/// Category-specific attributes of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum EntityAttributes {
    /// Medication
    Medication(MedicationAttributes),
    /// Problem
    Problem(ProblemAttributes),
    /// Vital sign
    Vital(VitalAttributes),
    /// Lab result
    #[serde(rename = "result")]
    LabResult(LabResultAttributes),
    /// Plan item
    PlanItem(PlanItemAttributes),
}

fn lookup(raw: &RawAttributes, key: &str) -> Option<String> {
    raw.iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(raw: &RawAttributes, key: &str) -> Result<String> {
    lookup(raw, key).ok_or_else(|| DomainError::validation("missing_field", key))
}

impl EntityAttributes {
    /// Build typed attributes from a raw map, rejecting missing required fields
    ///
    /// Keys are matched case-insensitively; blank values count as absent.
    pub fn from_raw(category: EntityCategory, raw: &RawAttributes) -> Result<Self> {
        let attributes = match category {
            EntityCategory::Medication => EntityAttributes::Medication(MedicationAttributes {
                name: required(raw, "name")?,
                dose: lookup(raw, "dose"),
                frequency: lookup(raw, "frequency"),
                route: lookup(raw, "route"),
                start_date: lookup(raw, "start_date"),
                end_date: lookup(raw, "end_date"),
            }),
            EntityCategory::Problem => EntityAttributes::Problem(ProblemAttributes {
                problem: required(raw, "problem")?,
                icd10_code: lookup(raw, "icd10_code"),
                status: lookup(raw, "status"),
                onset_date: lookup(raw, "onset_date"),
            }),
            EntityCategory::Vital => {
                let raw_kind = required(raw, "kind")?;
                let kind = VitalKind::parse(&raw_kind).ok_or_else(|| {
                    DomainError::validation("invalid_field", format!("kind '{}'", raw_kind))
                })?;
                EntityAttributes::Vital(VitalAttributes {
                    kind,
                    value: required(raw, "value")?,
                    unit: lookup(raw, "unit"),
                })
            }
            EntityCategory::LabResult => EntityAttributes::LabResult(LabResultAttributes {
                test_name: required(raw, "test_name")?,
                value: required(raw, "value")?,
                unit: lookup(raw, "unit"),
                reference_range: lookup(raw, "reference_range"),
                abnormal_flag: lookup(raw, "abnormal_flag"),
                test_date: lookup(raw, "test_date"),
            }),
            EntityCategory::PlanItem => EntityAttributes::PlanItem(PlanItemAttributes {
                action: required(raw, "action")?,
                category: lookup(raw, "category"),
            }),
        };
        Ok(attributes)
    }

    /// Category these attributes belong to
    pub fn category(&self) -> EntityCategory {
        match self {
            EntityAttributes::Medication(_) => EntityCategory::Medication,
            EntityAttributes::Problem(_) => EntityCategory::Problem,
            EntityAttributes::Vital(_) => EntityCategory::Vital,
            EntityAttributes::LabResult(_) => EntityCategory::LabResult,
            EntityAttributes::PlanItem(_) => EntityCategory::PlanItem,
        }
    }

    /// The text mentions are matched on: name, problem, test name, vital kind or action
    pub fn primary_text(&self) -> &str {
        match self {
            EntityAttributes::Medication(a) => &a.name,
            EntityAttributes::Problem(a) => &a.problem,
            EntityAttributes::Vital(a) => a.kind.as_str(),
            EntityAttributes::LabResult(a) => &a.test_name,
            EntityAttributes::PlanItem(a) => &a.action,
        }
    }

    /// Measured value for results and vitals
    pub fn value_text(&self) -> Option<&str> {
        match self {
            EntityAttributes::Vital(a) => Some(&a.value),
            EntityAttributes::LabResult(a) => Some(&a.value),
            _ => None,
        }
    }

    /// Unit for results and vitals
    pub fn unit(&self) -> Option<&str> {
        match self {
            EntityAttributes::Vital(a) => a.unit.as_deref(),
            EntityAttributes::LabResult(a) => a.unit.as_deref(),
            _ => None,
        }
    }

    /// Optional fields as `(name, value)` pairs in declaration order
    pub fn optional_fields(&self) -> Vec<(&'static str, Option<&str>)> {
        match self {
            EntityAttributes::Medication(a) => vec![
                ("dose", a.dose.as_deref()),
                ("frequency", a.frequency.as_deref()),
                ("route", a.route.as_deref()),
                ("start_date", a.start_date.as_deref()),
                ("end_date", a.end_date.as_deref()),
            ],
            EntityAttributes::Problem(a) => vec![
                ("icd10_code", a.icd10_code.as_deref()),
                ("status", a.status.as_deref()),
                ("onset_date", a.onset_date.as_deref()),
            ],
            EntityAttributes::Vital(a) => vec![("unit", a.unit.as_deref())],
            EntityAttributes::LabResult(a) => vec![
                ("unit", a.unit.as_deref()),
                ("reference_range", a.reference_range.as_deref()),
                ("abnormal_flag", a.abnormal_flag.as_deref()),
                ("test_date", a.test_date.as_deref()),
            ],
            EntityAttributes::PlanItem(a) => vec![("category", a.category.as_deref())],
        }
    }

    fn optional_slot_mut(&mut self, field: &str) -> Option<&mut Option<String>> {
        let slot = match self {
            EntityAttributes::Medication(a) => match field {
                "dose" => &mut a.dose,
                "frequency" => &mut a.frequency,
                "route" => &mut a.route,
                "start_date" => &mut a.start_date,
                "end_date" => &mut a.end_date,
                _ => return None,
            },
            EntityAttributes::Problem(a) => match field {
                "icd10_code" => &mut a.icd10_code,
                "status" => &mut a.status,
                "onset_date" => &mut a.onset_date,
                _ => return None,
            },
            EntityAttributes::Vital(a) => match field {
                "unit" => &mut a.unit,
                _ => return None,
            },
            EntityAttributes::LabResult(a) => match field {
                "unit" => &mut a.unit,
                "reference_range" => &mut a.reference_range,
                "abnormal_flag" => &mut a.abnormal_flag,
                "test_date" => &mut a.test_date,
                _ => return None,
            },
            EntityAttributes::PlanItem(a) => match field {
                "category" => &mut a.category,
                _ => return None,
            },
        };
        Some(slot)
    }

    /// Number of populated fields, required ones included
    pub fn populated_count(&self) -> usize {
        let required = match self {
            EntityAttributes::Vital(_) | EntityAttributes::LabResult(_) => 2,
            _ => 1,
        };
        required + self.optional_fields().iter().filter(|(_, v)| v.is_some()).count()
    }

    /// Every populated raw text value
    pub fn texts(&self) -> Vec<&str> {
        let mut texts = vec![self.primary_text()];
        if let Some(value) = self.value_text() {
            texts.push(value);
        }
        texts.extend(self.optional_fields().into_iter().filter_map(|(_, v)| v));
        texts
    }
}

/// A value that disagreed with the canonical entity and was kept for review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingValue {
    /// Attribute name, or the vital kind for measurements
    pub field: String,
    /// Value as written
    pub value: String,
    /// Where the value was read
    pub source_location: SourceLocation,
}

/// A single extracted clinical fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    attributes: EntityAttributes,
    source_locations: Vec<SourceLocation>,
    confidence: f64,
    #[serde(default)]
    alternative_representations: Vec<String>,
    #[serde(default)]
    conflicting_values: Vec<ConflictingValue>,
    #[serde(default)]
    uncertain: bool,
}

impl Entity {
    /// Create an entity; at least one source location is required
    pub fn new(
        id: EntityId,
        attributes: EntityAttributes,
        source_locations: Vec<SourceLocation>,
    ) -> Result<Self> {
        if source_locations.is_empty() {
            return Err(DomainError::validation(MISSING_PROVENANCE, ""));
        }
        let uncertain = attributes.texts().iter().any(|t| lexicon::has_uncertainty_marker(t));
        Ok(Self {
            id,
            attributes,
            source_locations,
            confidence: BASE_CONFIDENCE,
            alternative_representations: Vec::new(),
            conflicting_values: Vec::new(),
            uncertain,
        })
    }

    /// Identifier
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Category
    pub fn category(&self) -> EntityCategory {
        self.attributes.category()
    }

    /// Typed attributes
    pub fn attributes(&self) -> &EntityAttributes {
        &self.attributes
    }

    /// Text the entity is matched on
    pub fn primary_text(&self) -> &str {
        self.attributes.primary_text()
    }

    /// Every source location, in the order they were attached
    pub fn source_locations(&self) -> &[SourceLocation] {
        &self.source_locations
    }

    /// The location the entity was ingested from
    pub fn first_location(&self) -> Option<&SourceLocation> {
        self.source_locations.first()
    }

    /// Distinct cited pages, ascending
    pub fn source_pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.source_locations.iter().map(SourceLocation::page).collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    /// Confidence in [0, 1]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Other spellings folded into this entity
    pub fn alternative_representations(&self) -> &[String] {
        &self.alternative_representations
    }

    /// Values kept because they disagreed with the canonical attributes
    pub fn conflicting_values(&self) -> &[ConflictingValue] {
        &self.conflicting_values
    }

    /// Whether any raw attribute carries an unresolved uncertainty marker
    pub fn is_uncertain(&self) -> bool {
        self.uncertain
    }

    /// Set the confidence; values outside [0, 1] are rejected
    pub fn set_confidence(&mut self, confidence: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DomainError::validation(
                "invalid_confidence",
                format!("{} is outside [0, 1]", confidence),
            ));
        }
        self.confidence = confidence;
        Ok(())
    }

    /// Append a source location unless an identical one is already present
    pub fn add_source_location(&mut self, location: SourceLocation) {
        if !self.source_locations.contains(&location) {
            self.source_locations.push(location);
        }
    }

    /// Order source locations by (page, line); equal keys keep their order
    pub fn sort_source_locations(&mut self) {
        self.source_locations.sort_by_key(SourceLocation::order_key);
    }

    /// Record an alternative spelling; duplicates and the primary text are skipped
    pub fn add_alternative(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text == self.primary_text() || self.alternative_representations.contains(&text) {
            return;
        }
        self.alternative_representations.push(text);
    }

    /// Record a conflicting value unless already recorded
    pub fn add_conflict(&mut self, conflict: ConflictingValue) {
        if !self.conflicting_values.contains(&conflict) {
            self.conflicting_values.push(conflict);
        }
    }

    /// Fill an empty optional attribute; returns whether the value was taken
    pub fn fill_missing(&mut self, field: &str, value: &str) -> bool {
        match self.attributes.optional_slot_mut(field) {
            Some(slot) if slot.is_none() => {
                *slot = Some(value.to_string());
                true
            }
            _ => false,
        }
    }

    /// Raise the uncertain flag when `uncertain` is true; never lowers it
    pub fn merge_uncertainty(&mut self, uncertain: bool) {
        self.uncertain |= uncertain;
    }
}
