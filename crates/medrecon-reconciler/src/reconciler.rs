//! Core reconciliation engine

use crate::log::MergeLogEntry;
use crate::matcher::match_mentions;
use crate::merge::merge_class;
use crate::{ReconcileError, ReconcileMetrics, ReconcilerConfig, Result};
use medrecon_domain::{Diagnostic, Document, Entity, EntityCategory, Visit, VisitId};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Diagnostic code recorded when the fuzzy tier hits the deadline
pub const FUZZY_ABORTED: &str = "fuzzy_tier_aborted";

/// Reconciled entities and decisions for one category of one visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryOutcome {
    /// Category reconciled
    pub category: EntityCategory,
    /// Canonical entities, ordered by earliest source location
    pub entities: Vec<Entity>,
    /// One entry per class of two or more mentions
    pub log: Vec<MergeLogEntry>,
    /// Non-fatal notes (deadline aborts)
    pub diagnostics: Vec<String>,
    /// Whether the fuzzy tier was cut short
    pub fuzzy_aborted: bool,
    /// Mentions received
    pub mentions_in: usize,
}

/// Reconciliation of every category of one visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitReconciliation {
    /// Visit reconciled
    pub visit_id: VisitId,
    /// Outcomes in category order
    pub outcomes: Vec<CategoryOutcome>,
}

impl VisitReconciliation {
    /// Merge log entries across categories, in category order
    pub fn log(&self) -> impl Iterator<Item = &MergeLogEntry> {
        self.outcomes.iter().flat_map(|o| o.log.iter())
    }

    /// Diagnostics tagged with the visit
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.outcomes
            .iter()
            .flat_map(|o| o.diagnostics.iter())
            .map(|message| {
                Diagnostic::warning(FUZZY_ABORTED, Some(&self.visit_id), message.clone())
            })
            .collect()
    }
}

/// Reconciliation of a whole document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Per-visit results in visit order
    pub visits: Vec<VisitReconciliation>,
    /// Counters over every category processed
    #[serde(skip)]
    pub metrics: ReconcileMetrics,
}

impl ReconciliationReport {
    /// Every merge log entry in visit then category order
    pub fn log(&self) -> impl Iterator<Item = &MergeLogEntry> {
        self.visits.iter().flat_map(|v| v.log())
    }

    /// Log entries for one visit
    pub fn visit_log(&self, visit_id: &VisitId) -> Vec<&MergeLogEntry> {
        self.visits
            .iter()
            .filter(|v| &v.visit_id == visit_id)
            .flat_map(|v| v.log())
            .collect()
    }

    /// Merge log as pretty JSON
    pub fn log_json(&self) -> Result<String> {
        let entries: Vec<&MergeLogEntry> = self.log().collect();
        serde_json::to_string_pretty(&entries)
            .map_err(|e| ReconcileError::Inconsistent(e.to_string()))
    }
}

/// Reconciliation engine
///
/// Matches mentions within one category of one visit, merges each class
/// into a canonical entity and records the decision.
///
/// # Examples
///
/// ```
/// use medrecon_domain::{Document, EntityCategory, RawAttributes, RawSourceLocation};
/// use medrecon_reconciler::{Reconciler, ReconcilerConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut document = Document::new();
/// let visit = document.add_visit(None)?;
/// for (page, line, name) in [(1, 4, "Metformin 500mg"), (3, 2, "metformin 500mg")] {
///     let raw: RawAttributes = [("name".to_string(), name.to_string())].into();
///     let source = RawSourceLocation::new(page, line, name);
///     document.add_entity(&visit, EntityCategory::Medication, &raw, Some(&source))?;
/// }
///
/// let reconciler = Reconciler::new(ReconcilerConfig::default())?;
/// let report = reconciler.reconcile_document(&mut document)?;
/// assert_eq!(document.visits()[0].entities(EntityCategory::Medication).len(), 1);
/// assert_eq!(report.log().count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler; the configuration is validated first
    pub fn new(config: ReconcilerConfig) -> Result<Self> {
        config.validate().map_err(ReconcileError::Config)?;
        Ok(Self { config })
    }

    /// Create a reconciler with default configuration
    pub fn default_config() -> Self {
        Self {
            config: ReconcilerConfig::default(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Deadline for a visit starting now
    pub fn deadline_from_now(&self) -> Option<Instant> {
        self.config.deadline().map(|d| Instant::now() + d)
    }

    /// Reconcile one category's mentions with a fresh deadline
    pub fn reconcile_category(
        &self,
        category: EntityCategory,
        mentions: &[Entity],
    ) -> Result<CategoryOutcome> {
        self.reconcile_category_until(category, mentions, self.deadline_from_now())
    }

    /// Reconcile one category's mentions against an explicit deadline
    pub fn reconcile_category_until(
        &self,
        category: EntityCategory,
        mentions: &[Entity],
        deadline: Option<Instant>,
    ) -> Result<CategoryOutcome> {
        let cap = self.config.max_mentions_per_category;
        if mentions.len() > cap {
            tracing::warn!("{} {} mentions exceed cap of {}", mentions.len(), category, cap);
            return Err(ReconcileError::ResourceLimitExceeded {
                category,
                count: mentions.len(),
                cap,
            });
        }

        let fuzzy = self.config.enable_fuzzy
            && matches!(
                category,
                EntityCategory::Medication | EntityCategory::Problem | EntityCategory::PlanItem
            );
        let outcome = match_mentions(mentions, fuzzy, self.config.fuzzy_threshold, deadline);

        let mut seen = vec![0usize; mentions.len()];
        for class in &outcome.classes {
            for &member in &class.members {
                match seen.get_mut(member) {
                    Some(count) => *count += 1,
                    None => {
                        return Err(ReconcileError::Inconsistent(format!(
                            "{} class refers to mention {} of {}",
                            category,
                            member,
                            mentions.len()
                        )))
                    }
                }
            }
        }
        if let Some(index) = seen.iter().position(|&count| count != 1) {
            return Err(ReconcileError::Inconsistent(format!(
                "{} mention {} assigned to {} classes",
                category, index, seen[index]
            )));
        }

        let mut entities = Vec::with_capacity(outcome.classes.len());
        let mut log = Vec::new();
        for class in &outcome.classes {
            let members: Vec<&Entity> = class.members.iter().map(|&i| &mentions[i]).collect();
            let (entity, entry) =
                merge_class(category, &members, class, self.config.numeric_tolerance)
                    .ok_or_else(|| {
                        ReconcileError::Inconsistent(format!("empty {} class", category))
                    })?;
            entities.push(entity);
            log.extend(entry);
        }

        let mut diagnostics = Vec::new();
        if outcome.fuzzy_aborted {
            diagnostics.push(format!(
                "fuzzy matching of {} {} mentions stopped at the deadline; exact matches kept",
                mentions.len(),
                category
            ));
        }

        tracing::debug!(
            "Reconciled {} {} mentions into {} entities ({} merge decisions)",
            mentions.len(),
            category,
            entities.len(),
            log.len()
        );

        Ok(CategoryOutcome {
            category,
            entities,
            log,
            diagnostics,
            fuzzy_aborted: outcome.fuzzy_aborted,
            mentions_in: mentions.len(),
        })
    }

    /// Reconcile every category of a visit
    pub fn reconcile_visit(&self, visit: &Visit) -> Result<VisitReconciliation> {
        match self.reconcile_visit_partial(visit) {
            (reconciliation, None) => Ok(reconciliation),
            (_, Some(error)) => Err(error),
        }
    }

    /// Reconcile every category of a visit, keeping what finished before an error
    ///
    /// Categories are processed in [`EntityCategory::ALL`] order; on error the
    /// returned reconciliation holds the categories already done.
    pub fn reconcile_visit_partial(
        &self,
        visit: &Visit,
    ) -> (VisitReconciliation, Option<ReconcileError>) {
        let deadline = self.deadline_from_now();
        let mut reconciliation = VisitReconciliation {
            visit_id: visit.id().clone(),
            outcomes: Vec::new(),
        };
        for category in EntityCategory::ALL {
            match self.reconcile_category_until(category, visit.entities(category), deadline) {
                Ok(outcome) => reconciliation.outcomes.push(outcome),
                Err(error) => return (reconciliation, Some(error)),
            }
        }
        (reconciliation, None)
    }

    /// Replace a visit's entities with reconciled ones
    pub fn apply(visit: &mut Visit, reconciliation: &VisitReconciliation) -> Result<()> {
        if visit.id() != &reconciliation.visit_id {
            return Err(ReconcileError::Inconsistent(format!(
                "reconciliation for {} applied to {}",
                reconciliation.visit_id,
                visit.id()
            )));
        }
        for outcome in &reconciliation.outcomes {
            visit.replace_entities(outcome.category, outcome.entities.clone())?;
        }
        Ok(())
    }

    /// Reconcile and apply every visit of a document
    ///
    /// Every visit is reconciled before any is applied; on error the
    /// document is left untouched.
    pub fn reconcile_document(&self, document: &mut Document) -> Result<ReconciliationReport> {
        let reconciliations = document
            .visits()
            .iter()
            .map(|visit| self.reconcile_visit(visit))
            .collect::<Result<Vec<_>>>()?;

        let mut report = ReconciliationReport::default();
        for (visit, reconciliation) in document.visits_mut()?.iter_mut().zip(reconciliations) {
            Self::apply(visit, &reconciliation)?;
            for outcome in &reconciliation.outcomes {
                report.metrics.record_outcome(outcome);
            }
            report.visits.push(reconciliation);
        }
        tracing::info!(
            "Reconciled {} visits: {} mentions into {} entities",
            report.visits.len(),
            report.metrics.mentions_in,
            report.metrics.entities_out
        );
        Ok(report)
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{MatchType, MergeAction};
    use medrecon_domain::{EntityId, RawAttributes, SourceLocation};

    fn mention(
        category: EntityCategory,
        ordinal: usize,
        pairs: &[(&str, &str)],
        page: u32,
    ) -> Entity {
        let raw: RawAttributes =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let attributes = medrecon_domain::EntityAttributes::from_raw(category, &raw).unwrap();
        Entity::new(
            EntityId::derive("visit_1", category, ordinal),
            attributes,
            vec![SourceLocation::new(page, 1, "line").unwrap()],
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ReconcilerConfig {
            fuzzy_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(Reconciler::new(config), Err(ReconcileError::Config(_))));
    }

    #[test]
    fn test_resource_limit() {
        let config = ReconcilerConfig {
            max_mentions_per_category: 2,
            ..Default::default()
        };
        let reconciler = Reconciler::new(config).unwrap();
        let mentions: Vec<Entity> = (0..3)
            .map(|i| mention(EntityCategory::Problem, i, &[("problem", "Asthma")], 1))
            .collect();
        let err = reconciler.reconcile_category(EntityCategory::Problem, &mentions).unwrap_err();
        assert_eq!(
            err,
            ReconcileError::ResourceLimitExceeded {
                category: EntityCategory::Problem,
                count: 3,
                cap: 2
            }
        );
    }

    #[test]
    fn test_exact_merge_outcome() {
        let reconciler = Reconciler::default();
        let mentions = vec![
            mention(EntityCategory::Medication, 0, &[("name", "Metformin 500mg")], 1),
            mention(EntityCategory::Medication, 1, &[("name", "metformin 500mg")], 3),
        ];
        let outcome = reconciler.reconcile_category(EntityCategory::Medication, &mentions).unwrap();
        assert_eq!(outcome.entities.len(), 1);
        assert_eq!(outcome.entities[0].source_pages(), vec![1, 3]);
        assert_eq!(outcome.log.len(), 1);
        assert_eq!(outcome.log[0].match_type, MatchType::Exact);
        assert_eq!(outcome.log[0].action, MergeAction::Merged);
        assert_eq!(outcome.log[0].similarity_score, None);
        assert_eq!(outcome.mentions_in, 2);
    }

    #[test]
    fn test_results_never_fuzzy_matched() {
        let reconciler = Reconciler::default();
        let a1c = |ordinal, test_name, page| {
            let pairs = [("test_name", test_name), ("value", "7.1")];
            mention(EntityCategory::LabResult, ordinal, &pairs, page)
        };
        let mentions = vec![a1c(0, "Hemoglobin A1c", 1), a1c(1, "Hemoglobin A1", 2)];
        let outcome = reconciler.reconcile_category(EntityCategory::LabResult, &mentions).unwrap();
        assert_eq!(outcome.entities.len(), 2);
        assert!(outcome.log.is_empty());
    }

    #[test]
    fn test_expired_deadline_keeps_exact_results() {
        let reconciler = Reconciler::default();
        let mentions = vec![
            mention(EntityCategory::Problem, 0, &[("problem", "Hyperlipidemia")], 1),
            mention(EntityCategory::Problem, 1, &[("problem", "Hyperlipidaemia")], 2),
            mention(EntityCategory::Problem, 2, &[("problem", "hyperlipidemia")], 3),
        ];
        let outcome = reconciler
            .reconcile_category_until(EntityCategory::Problem, &mentions, Some(Instant::now()))
            .unwrap();
        assert!(outcome.fuzzy_aborted);
        assert_eq!(outcome.entities.len(), 2);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_empty_category() {
        let reconciler = Reconciler::default();
        let outcome = reconciler.reconcile_category(EntityCategory::Vital, &[]).unwrap();
        assert!(outcome.entities.is_empty());
        assert!(outcome.log.is_empty());
        assert!(!outcome.fuzzy_aborted);
    }
}
