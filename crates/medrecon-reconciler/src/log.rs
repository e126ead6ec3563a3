//! Merge decision log

use medrecon_domain::{ConflictingValue, EntityCategory, EntityId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a merge decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeAction {
    /// Mentions merged without disagreement
    Merged,
    /// Mentions merged; disagreeing values kept for review
    ConflictRetained,
}

/// Tier that matched the mentions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Identical normalized keys
    Exact,
    /// Similarity at or above the threshold
    Fuzzy,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Exact => f.write_str("exact"),
            MatchType::Fuzzy => f.write_str("fuzzy"),
        }
    }
}

/// One merge decision; emitted for every class of two or more mentions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeLogEntry {
    /// Category the class belongs to
    pub category: EntityCategory,
    /// Merged or conflict retained
    pub action: MergeAction,
    /// Exact or fuzzy
    pub match_type: MatchType,
    /// Weakest pairwise similarity in the class; `None` for exact matches
    pub similarity_score: Option<f64>,
    /// Identifier kept by the canonical entity
    pub surviving_entity_id: EntityId,
    /// Identifiers folded into it, in ingestion order
    pub absorbed_entity_ids: Vec<EntityId>,
    /// Union of cited pages, ascending
    pub source_pages: Vec<u32>,
    /// Human-readable account of the decision
    pub explanation: String,
    /// Values kept because they disagreed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictingValue>,
}

impl MergeLogEntry {
    /// Whether the decision kept conflicting values
    pub fn is_conflict(&self) -> bool {
        self.action == MergeAction::ConflictRetained
    }

    /// Conflicting fields in first-appearance order
    pub fn conflict_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for conflict in &self.conflicts {
            if !fields.contains(&conflict.field.as_str()) {
                fields.push(&conflict.field);
            }
        }
        fields
    }
}
