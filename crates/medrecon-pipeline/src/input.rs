//! Upstream extraction contract
//!
//! The extraction collaborator hands over per-page text with uncertainty
//! markers and per-visit candidate entities, each citing where it was read.

use crate::{PipelineError, Result};
use chrono::NaiveDate;
use medrecon_domain::{
    DocumentMetadata, PageSignals, PageStatus, RawAttributes, RawSourceLocation, UncertaintyMarkers,
};
use serde::{Deserialize, Serialize};

/// Everything extracted from one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionBundle {
    /// Demographics and document metadata
    #[serde(default)]
    pub metadata: DocumentMetadata,
    /// Pages in document order
    #[serde(default)]
    pub pages: Vec<PageInput>,
    /// Visits in document order
    #[serde(default)]
    pub visits: Vec<VisitCandidate>,
}

impl ExtractionBundle {
    /// Parse a bundle from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PipelineError::Json(e.to_string()))
    }

    /// Page scoring inputs in bundle order
    pub fn page_signals(&self) -> Vec<PageSignals> {
        self.pages.iter().map(PageInput::to_signals).collect()
    }

    /// Highest page number seen, or the page count when numbers are missing
    pub fn page_count(&self) -> u32 {
        let highest = self.pages.iter().map(|p| p.page).max().unwrap_or(0);
        highest.max(self.pages.len() as u32)
    }

    /// Number of candidate entities across visits
    pub fn entity_count(&self) -> usize {
        self.visits.iter().map(|v| v.entities.len()).sum()
    }
}

/// One page of extracted text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInput {
    /// 1-based page number
    pub page: u32,
    /// Extracted text, markers included
    #[serde(default)]
    pub text: String,
    /// Extraction status
    #[serde(default)]
    pub status: PageStatus,
    /// Markers reported outside the text
    #[serde(default)]
    pub markers: UncertaintyMarkers,
}

impl PageInput {
    /// Scoring input for this page
    pub fn to_signals(&self) -> PageSignals {
        PageSignals {
            page: self.page,
            text: self.text.clone(),
            status: self.status,
            markers: self.markers,
        }
    }
}

/// A visit as segmented by the extraction collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitCandidate {
    /// Explicit identifier (`visit_<n>`); assigned sequentially when absent
    #[serde(default)]
    pub visit_id: Option<String>,
    /// Encounter date
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
    /// Pages the visit spans
    #[serde(default)]
    pub pages: Vec<u32>,
    /// Candidate entities in extraction order
    #[serde(default)]
    pub entities: Vec<EntityCandidate>,
}

/// One candidate entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    /// Category name (`medication`, `problem`, `vital`, `result`, `plan_item` or a section alias)
    pub category: String,
    /// Raw attribute map as extracted
    #[serde(default)]
    pub attributes: RawAttributes,
    /// Where the entity was read; at least one is required
    #[serde(default)]
    pub source_locations: Vec<RawSourceLocation>,
}
