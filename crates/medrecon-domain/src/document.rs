//! The canonical document: visits, demographics, and quality metadata

use crate::category::EntityCategory;
use crate::entity::RawAttributes;
use crate::error::{DomainError, Result};
use crate::provenance::{RawSourceLocation, MISSING_PROVENANCE};
use crate::schema::{self, SCHEMA_VERSION};
use crate::visit::{EntityHandle, Visit, VisitId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Demographic and document-level metadata, all optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Patient name as written
    #[serde(default)]
    pub patient_name: Option<String>,
    /// Patient / medical record number
    #[serde(default)]
    pub patient_id: Option<String>,
    /// Date of birth
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// Sex as written
    #[serde(default)]
    pub sex: Option<String>,
    /// Date the document was produced
    #[serde(default)]
    pub document_date: Option<NaiveDate>,
    /// Document type, e.g. `progress_note`
    #[serde(default)]
    pub document_type: Option<String>,
    /// Authoring clinician
    #[serde(default)]
    pub author: Option<String>,
    /// Issuing organization
    #[serde(default)]
    pub organization: Option<String>,
}

/// A section that could not be read with certainty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnclearSection {
    /// Where in the record, e.g. `visit_1.medications`
    pub section: String,
    /// Page, when known
    #[serde(default)]
    pub page: Option<u32>,
    /// Why it was flagged
    pub reason: String,
    /// The text as extracted, markers included
    #[serde(default)]
    pub original_text: Option<String>,
}

/// Document-level quality summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    /// Populated expected fields over expected fields, in [0, 1]
    #[serde(default)]
    pub completeness_score: f64,
    /// Document confidence, in [0, 1]
    #[serde(default)]
    pub confidence_score: f64,
    /// Sections flagged as unclear
    #[serde(default)]
    pub unclear_sections: Vec<UnclearSection>,
    /// `<visit_id>.<field>` entries for expected fields that are absent
    #[serde(default)]
    pub missing_critical_fields: Vec<String>,
    /// Informational notes (excluded pages, empty inputs)
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational only
    Info,
    /// Worth a reviewer's attention; never fatal
    Warning,
}

/// A non-fatal structural finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Stable code, e.g. `visit_without_date`
    pub code: String,
    /// Visit concerned, if any
    #[serde(default)]
    pub visit_id: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl Diagnostic {
    /// Informational diagnostic
    pub fn info(code: &str, visit_id: Option<&VisitId>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            code: code.to_string(),
            visit_id: visit_id.map(|v| v.to_string()),
            message: message.into(),
        }
    }

    /// Warning diagnostic
    pub fn warning(code: &str, visit_id: Option<&VisitId>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            visit_id: visit_id.map(|v| v.to_string()),
            message: message.into(),
        }
    }
}

/// The canonical clinical record
///
/// Built by a single owner, then frozen. Every mutator returns
/// [`DomainError::State`] once [`Document::freeze`] has been called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    schema_version: String,
    #[serde(default)]
    metadata: DocumentMetadata,
    #[serde(default)]
    visits: Vec<Visit>,
    #[serde(default)]
    data_quality: DataQuality,
    #[serde(default)]
    page_count: u32,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(skip)]
    frozen: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty, mutable document at the current schema version
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            metadata: DocumentMetadata::default(),
            visits: Vec::new(),
            data_quality: DataQuality::default(),
            page_count: 0,
            warnings: Vec::new(),
            frozen: false,
        }
    }

    fn ensure_mutable(&self, operation: &str) -> Result<()> {
        if self.frozen {
            return Err(DomainError::State(format!("document is frozen; cannot {}", operation)));
        }
        Ok(())
    }

    /// Schema version string
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Demographic metadata
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// Replace the demographic metadata
    pub fn set_metadata(&mut self, metadata: DocumentMetadata) -> Result<()> {
        self.ensure_mutable("set metadata")?;
        self.metadata = metadata;
        Ok(())
    }

    /// Number of pages in the source document
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Set the page count
    pub fn set_page_count(&mut self, page_count: u32) -> Result<()> {
        self.ensure_mutable("set page count")?;
        self.page_count = page_count;
        Ok(())
    }

    /// Processing warnings
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Append a processing warning
    pub fn add_warning(&mut self, warning: impl Into<String>) -> Result<()> {
        self.ensure_mutable("add warning")?;
        self.warnings.push(warning.into());
        Ok(())
    }

    /// Quality summary
    pub fn data_quality(&self) -> &DataQuality {
        &self.data_quality
    }

    /// Replace the quality summary
    pub fn set_data_quality(&mut self, data_quality: DataQuality) -> Result<()> {
        self.ensure_mutable("set data quality")?;
        self.data_quality = data_quality;
        Ok(())
    }

    /// Visits in ingestion order
    pub fn visits(&self) -> &[Visit] {
        &self.visits
    }

    /// Look up a visit
    pub fn visit(&self, id: &VisitId) -> Option<&Visit> {
        self.visits.iter().find(|v| v.id() == id)
    }

    /// Mutable access to one visit
    pub fn visit_mut(&mut self, id: &VisitId) -> Result<&mut Visit> {
        self.ensure_mutable("modify visit")?;
        self.visits
            .iter_mut()
            .find(|v| v.id() == id)
            .ok_or_else(|| DomainError::validation("unknown_visit", id.as_str()))
    }

    /// Mutable access to every visit, in order
    pub fn visits_mut(&mut self) -> Result<&mut [Visit]> {
        self.ensure_mutable("modify visits")?;
        Ok(&mut self.visits)
    }

    /// Append a visit with the next sequential `visit_<n>` identifier
    pub fn add_visit(&mut self, date: Option<NaiveDate>) -> Result<VisitId> {
        let id = VisitId::from_ordinal(self.visits.len() + 1);
        self.insert_visit(id, date)
    }

    /// Append a visit with an explicit identifier
    ///
    /// Rejects identifiers that are empty, do not start with `visit_`, or
    /// are already taken.
    pub fn add_visit_with_id(&mut self, id: &str, date: Option<NaiveDate>) -> Result<VisitId> {
        let id = VisitId::new(id)?;
        self.insert_visit(id, date)
    }

    fn insert_visit(&mut self, id: VisitId, date: Option<NaiveDate>) -> Result<VisitId> {
        self.ensure_mutable("add visit")?;
        if self.visit(&id).is_some() {
            return Err(DomainError::validation("duplicate_visit_id", id.as_str()));
        }
        self.visits.push(Visit::new(id.clone(), date));
        Ok(id)
    }

    /// Ingest one entity into a visit
    pub fn add_entity(
        &mut self,
        visit_id: &VisitId,
        category: EntityCategory,
        raw: &RawAttributes,
        source: Option<&RawSourceLocation>,
    ) -> Result<EntityHandle> {
        self.visit_mut(visit_id)?.add_entity(category, raw, source)
    }

    /// Ingest one entity citing several source locations
    pub fn add_entity_with_sources(
        &mut self,
        visit_id: &VisitId,
        category: EntityCategory,
        raw: &RawAttributes,
        sources: &[RawSourceLocation],
    ) -> Result<EntityHandle> {
        self.visit_mut(visit_id)?.add_entity_with_sources(category, raw, sources)
    }

    /// Make the document read-only
    pub fn freeze(&mut self) {
        if !self.frozen {
            tracing::debug!("Freezing document with {} visits", self.visits.len());
        }
        self.frozen = true;
    }

    /// Whether the document has been frozen
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Structural diagnostics; never fails
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if self.visits.is_empty() {
            diagnostics.push(Diagnostic::info("no_visits", None, "document contains no visits"));
        }

        for visit in &self.visits {
            let id = Some(visit.id());
            if visit.date.is_none() {
                diagnostics.push(Diagnostic::warning(
                    "visit_without_date",
                    id,
                    "visit has no date",
                ));
            }
            let narrative = [
                ("reason_for_visit", &visit.reason_for_visit),
                ("history_of_present_illness", &visit.history_of_present_illness),
                ("assessment", &visit.assessment),
            ];
            for (field, value) in narrative {
                if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                    diagnostics.push(Diagnostic::info(
                        "empty_narrative_field",
                        id,
                        format!("{} is empty", field),
                    ));
                }
            }
            if visit.entity_count() == 0 {
                diagnostics.push(Diagnostic::warning(
                    "visit_without_entities",
                    id,
                    "visit has no entities",
                ));
            }
            if visit.raw_source_pages.is_empty() {
                diagnostics.push(Diagnostic::warning(
                    "visit_without_pages",
                    id,
                    "visit cites no source pages",
                ));
            }
        }

        diagnostics
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a persisted document; the result is frozen
    ///
    /// Older 2.x records are migrated; other majors are rejected. Entities
    /// without provenance or with out-of-range confidence are rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let value = schema::migrate(value)?;
        let mut document: Document = serde_json::from_value(value)?;

        for visit in &document.visits {
            for entity in visit.all_entities() {
                if entity.source_locations().is_empty() {
                    return Err(DomainError::validation(
                        MISSING_PROVENANCE,
                        entity.id().to_string(),
                    ));
                }
                if !(0.0..=1.0).contains(&entity.confidence()) {
                    return Err(DomainError::validation(
                        "invalid_confidence",
                        entity.id().to_string(),
                    ));
                }
            }
        }

        document.frozen = true;
        Ok(document)
    }
}
