//! Metrics collection for reconciliation runs

use crate::log::MatchType;
use crate::reconciler::CategoryOutcome;
use medrecon_domain::EntityCategory;
use std::collections::BTreeMap;

/// Counters collected while reconciling
///
/// Tracks mentions in, canonical entities out, and merge decisions per kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileMetrics {
    /// Mentions received
    pub mentions_in: usize,

    /// Canonical entities produced
    pub entities_out: usize,

    /// Classes formed by the exact tier
    pub exact_merges: usize,

    /// Classes formed by the fuzzy tier
    pub fuzzy_merges: usize,

    /// Merge decisions that kept conflicting values
    pub conflicts_retained: usize,

    /// Categories whose fuzzy tier hit the deadline
    pub fuzzy_aborts: usize,

    /// Mentions received per category
    pub mentions_by_category: BTreeMap<EntityCategory, usize>,
}

impl ReconcileMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one category's outcome
    pub fn record_outcome(&mut self, outcome: &CategoryOutcome) {
        self.mentions_in += outcome.mentions_in;
        self.entities_out += outcome.entities.len();
        *self.mentions_by_category.entry(outcome.category).or_insert(0) += outcome.mentions_in;
        for entry in &outcome.log {
            match entry.match_type {
                MatchType::Exact => self.exact_merges += 1,
                MatchType::Fuzzy => self.fuzzy_merges += 1,
            }
            if entry.is_conflict() {
                self.conflicts_retained += 1;
            }
        }
        if outcome.fuzzy_aborted {
            self.fuzzy_aborts += 1;
        }
    }

    /// Mentions absorbed into another entity
    pub fn mentions_absorbed(&self) -> usize {
        self.mentions_in.saturating_sub(self.entities_out)
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Reconciliation Metrics Summary".to_string(),
            "==============================".to_string(),
            format!("Mentions in: {}", self.mentions_in),
            format!("Entities out: {}", self.entities_out),
            format!("Absorbed: {}", self.mentions_absorbed()),
            format!("Exact merges: {}", self.exact_merges),
            format!("Fuzzy merges: {}", self.fuzzy_merges),
            format!("Conflicts retained: {}", self.conflicts_retained),
            format!("Fuzzy tiers aborted: {}", self.fuzzy_aborts),
        ];

        if !self.mentions_by_category.is_empty() {
            lines.push(String::new());
            lines.push("Mentions by category:".to_string());
            for (category, count) in &self.mentions_by_category {
                lines.push(format!("  {}: {}", category, count));
            }
        }

        lines.join("\n")
    }
}
