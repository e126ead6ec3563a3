//! Visits: one clinical encounter and the entities recorded for it

use crate::category::EntityCategory;
use crate::entity::{Entity, EntityAttributes, EntityId, RawAttributes};
use crate::error::{DomainError, Result};
use crate::provenance::{resolve_sources, RawSourceLocation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Required prefix of every visit identifier
pub const VISIT_ID_PREFIX: &str = "visit_";

/// Visit identifier following the `visit_<n>` convention
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VisitId(String);

impl VisitId {
    /// Validate an identifier
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::validation("missing_visit_id", ""));
        }
        if !id.starts_with(VISIT_ID_PREFIX) || id.len() == VISIT_ID_PREFIX.len() {
            return Err(DomainError::validation("invalid_visit_id", &id));
        }
        Ok(VisitId(id))
    }

    /// Identifier for the `n`-th visit (1-based) in ingestion order
    pub fn from_ordinal(n: usize) -> Self {
        VisitId(format!("{}{}", VISIT_ID_PREFIX, n))
    }

    /// String form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VisitId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        VisitId::new(value)
    }
}

impl From<VisitId> for String {
    fn from(id: VisitId) -> Self {
        id.0
    }
}

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle returned when an entity is ingested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityHandle {
    /// Owning visit
    pub visit_id: VisitId,
    /// Category list the entity was appended to
    pub category: EntityCategory,
    /// Deterministic identifier
    pub entity_id: EntityId,
}

/// A single clinical encounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    id: VisitId,
    /// Encounter date, when one was found
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Reason for visit / chief complaint
    #[serde(default)]
    pub reason_for_visit: Option<String>,
    /// History of present illness
    #[serde(default)]
    pub history_of_present_illness: Option<String>,
    /// Clinician assessment
    #[serde(default)]
    pub assessment: Option<String>,
    #[serde(default)]
    medications: Vec<Entity>,
    #[serde(default)]
    problems: Vec<Entity>,
    #[serde(default)]
    vitals: Vec<Entity>,
    #[serde(default)]
    results: Vec<Entity>,
    #[serde(default)]
    plan_items: Vec<Entity>,
    /// Pages this visit was read from, ascending
    #[serde(default)]
    pub raw_source_pages: Vec<u32>,
    /// Set by the review aggregator
    #[serde(default)]
    pub manual_review_required: bool,
    /// Deduplicated reasons, first occurrence order
    #[serde(default)]
    pub review_reasons: Vec<String>,
    #[serde(skip)]
    ingested: usize,
}

impl Visit {
    /// Create an empty visit
    pub fn new(id: VisitId, date: Option<NaiveDate>) -> Self {
        Self {
            id,
            date,
            reason_for_visit: None,
            history_of_present_illness: None,
            assessment: None,
            medications: Vec::new(),
            problems: Vec::new(),
            vitals: Vec::new(),
            results: Vec::new(),
            plan_items: Vec::new(),
            raw_source_pages: Vec::new(),
            manual_review_required: false,
            review_reasons: Vec::new(),
            ingested: 0,
        }
    }

    /// Identifier
    pub fn id(&self) -> &VisitId {
        &self.id
    }

    /// Ingest one entity with a single source location
    ///
    /// Fails with `missing_provenance` when `source` is `None`.
    pub fn add_entity(
        &mut self,
        category: EntityCategory,
        raw: &RawAttributes,
        source: Option<&RawSourceLocation>,
    ) -> Result<EntityHandle> {
        match source {
            Some(location) => {
                self.add_entity_with_sources(category, raw, std::slice::from_ref(location))
            }
            None => self.add_entity_with_sources(category, raw, &[]),
        }
    }

    /// Ingest one entity with any number (at least one) of source locations
    pub fn add_entity_with_sources(
        &mut self,
        category: EntityCategory,
        raw: &RawAttributes,
        sources: &[RawSourceLocation],
    ) -> Result<EntityHandle> {
        let locations = resolve_sources(sources)?;
        let attributes = EntityAttributes::from_raw(category, raw)?;

        let ordinal = self.ingested.max(self.entity_count());
        let entity_id = EntityId::derive(self.id.as_str(), category, ordinal);
        let entity = Entity::new(entity_id, attributes, locations)?;

        for page in entity.source_pages() {
            self.note_source_page(page);
        }
        self.list_mut(category).push(entity);
        self.ingested = ordinal + 1;

        Ok(EntityHandle {
            visit_id: self.id.clone(),
            category,
            entity_id,
        })
    }

    /// Record a page the visit was read from
    pub fn note_source_page(&mut self, page: u32) {
        if let Err(pos) = self.raw_source_pages.binary_search(&page) {
            self.raw_source_pages.insert(pos, page);
        }
    }

    /// Entities of one category, in list order
    pub fn entities(&self, category: EntityCategory) -> &[Entity] {
        match category {
            EntityCategory::Medication => &self.medications,
            EntityCategory::Problem => &self.problems,
            EntityCategory::Vital => &self.vitals,
            EntityCategory::LabResult => &self.results,
            EntityCategory::PlanItem => &self.plan_items,
        }
    }

    /// Mutable access to one category's entities (no insertion or removal)
    pub fn entities_mut(&mut self, category: EntityCategory) -> &mut [Entity] {
        self.list_mut(category)
    }

    /// Replace one category's entities with reconciled ones
    ///
    /// Every replacement entity must belong to `category` and carry provenance.
    pub fn replace_entities(
        &mut self,
        category: EntityCategory,
        entities: Vec<Entity>,
    ) -> Result<()> {
        if let Some(stray) = entities.iter().find(|e| e.category() != category) {
            return Err(DomainError::validation(
                "category_mismatch",
                format!("{} entity in {} list", stray.category(), category),
            ));
        }
        if entities.iter().any(|e| e.source_locations().is_empty()) {
            return Err(DomainError::validation(crate::provenance::MISSING_PROVENANCE, ""));
        }
        *self.list_mut(category) = entities;
        Ok(())
    }

    /// All entities, category by category
    pub fn all_entities(&self) -> impl Iterator<Item = &Entity> {
        EntityCategory::ALL.iter().flat_map(move |c| self.entities(*c).iter())
    }

    /// Total number of entities across categories
    pub fn entity_count(&self) -> usize {
        EntityCategory::ALL.iter().map(|c| self.entities(*c).len()).sum()
    }

    /// Add a review reason unless already present, raising the review flag
    pub fn add_review_reason(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        self.manual_review_required = true;
        if !self.review_reasons.contains(&reason) {
            self.review_reasons.push(reason);
        }
    }

    fn list_mut(&mut self, category: EntityCategory) -> &mut Vec<Entity> {
        match category {
            EntityCategory::Medication => &mut self.medications,
            EntityCategory::Problem => &mut self.problems,
            EntityCategory::Vital => &mut self.vitals,
            EntityCategory::LabResult => &mut self.results,
            EntityCategory::PlanItem => &mut self.plan_items,
        }
    }
}
