//! Review flag aggregation and data quality

use crate::{ExpectedField, ReviewConfig, ReviewError};
use medrecon_domain::confidence::index_scores;
use medrecon_domain::lexicon::{
    ambiguous_meaning, find_ambiguous_abbreviations, has_uncertainty_marker,
};
use medrecon_domain::{
    ConflictingValue, DataQuality, Document, DocumentConfidence, Entity, EntityCategory, PageScore,
    UnclearSection, Visit, VisitId,
};
use medrecon_reconciler::{MergeLogEntry, ReconciliationReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a visit needs manual review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewReason {
    /// Document confidence below threshold
    LowDocumentConfidence {
        /// Document score
        score: f64,
        /// Configured threshold
        threshold: f64,
    },

    /// A page the visit cites scored below threshold
    LowPageConfidence {
        /// Page number
        page: u32,
        /// Page score
        score: f64,
        /// Configured threshold
        threshold: f64,
    },

    /// Reconciliation kept disagreeing values
    ConflictRetained {
        /// Category of the merged entity
        category: EntityCategory,
        /// Conflicting field, e.g. `blood_pressure` or `dose`
        field: String,
        /// Each distinct value with the page it came from
        values: Vec<(String, u32)>,
    },

    /// An entity still carries an `[UNCLEAR` / `[ILLEGIBLE` marker
    UncertainEntity {
        /// Category
        category: EntityCategory,
        /// Entity primary text
        text: String,
        /// Cited pages
        pages: Vec<u32>,
    },

    /// Entity text uses an abbreviation with more than one reading
    AmbiguousAbbreviation {
        /// The abbreviation as matched
        abbreviation: String,
        /// Its possible readings
        meaning: String,
        /// Category
        category: EntityCategory,
        /// Entity primary text
        text: String,
    },
}

fn join_pages(pages: &[u32]) -> String {
    pages.iter().map(u32::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewReason::LowDocumentConfidence { score, threshold } => {
                write!(f, "document confidence {:.2} is below {:.2}", score, threshold)
            }
            ReviewReason::LowPageConfidence { page, score, threshold } => {
                write!(f, "page {} confidence {:.2} is below {:.2}", page, score, threshold)
            }
            ReviewReason::ConflictRetained { category, field, values } => {
                let values: Vec<String> = values
                    .iter()
                    .map(|(value, page)| format!("'{}' (page {})", value, page))
                    .collect();
                write!(f, "conflicting {} {} values: {}", category, field, values.join(", "))
            }
            ReviewReason::UncertainEntity { category, text, pages } => {
                write!(
                    f,
                    "{} '{}' has an unresolved marker (pages {})",
                    category,
                    text,
                    join_pages(pages)
                )
            }
            ReviewReason::AmbiguousAbbreviation {
                abbreviation,
                meaning,
                category,
                text,
            } => write!(
                f,
                "ambiguous abbreviation '{}' ({}) in {} '{}'",
                abbreviation, meaning, category, text
            ),
        }
    }
}

/// Review findings for one visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitReview {
    /// Visit reviewed
    pub visit_id: VisitId,
    /// Findings in detection order, deduplicated
    pub reasons: Vec<ReviewReason>,
}

impl VisitReview {
    /// Whether the visit needs manual review
    pub fn review_required(&self) -> bool {
        !self.reasons.is_empty()
    }

    fn push(&mut self, reason: ReviewReason) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }
}

/// Review of a whole document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReport {
    /// Per-visit findings in visit order
    pub visits: Vec<VisitReview>,
    /// Document-level quality summary
    pub data_quality: DataQuality,
}

impl ReviewReport {
    /// Number of visits needing manual review
    pub fn flagged_visits(&self) -> usize {
        self.visits.iter().filter(|v| v.review_required()).count()
    }
}

/// Record section holding a category's entities
fn section_name(category: EntityCategory) -> &'static str {
    match category {
        EntityCategory::Medication => "medications",
        EntityCategory::Problem => "problems",
        EntityCategory::Vital => "vitals",
        EntityCategory::LabResult => "results",
        EntityCategory::PlanItem => "plan_items",
    }
}

fn populated(text: &Option<String>) -> bool {
    text.as_deref().is_some_and(|t| !t.trim().is_empty())
}

/// Whether a visit has a value for an expected field
pub fn has_expected_field(visit: &Visit, field: ExpectedField) -> bool {
    match field {
        ExpectedField::Date => visit.date.is_some(),
        ExpectedField::ReasonForVisit => populated(&visit.reason_for_visit),
        ExpectedField::HistoryOfPresentIllness => populated(&visit.history_of_present_illness),
        ExpectedField::Assessment => populated(&visit.assessment),
        ExpectedField::Medications => !visit.entities(EntityCategory::Medication).is_empty(),
        ExpectedField::Problems => !visit.entities(EntityCategory::Problem).is_empty(),
        ExpectedField::Vitals => !visit.entities(EntityCategory::Vital).is_empty(),
        ExpectedField::Results => !visit.entities(EntityCategory::LabResult).is_empty(),
        ExpectedField::Plan => !visit.entities(EntityCategory::PlanItem).is_empty(),
    }
}

/// Scans reconciled visits and sets their review flags
///
/// # Examples
///
/// ```
/// use medrecon_domain::{Document, DocumentConfidence};
/// use medrecon_reconciler::ReconciliationReport;
/// use medrecon_review::{ReviewAggregator, ReviewConfig};
///
/// let mut document = Document::new();
/// document.add_visit(None).unwrap();
///
/// let confidence = DocumentConfidence {
///     score: 0.70,
///     scored_pages: vec![1],
///     excluded_pages: Vec::new(),
///     notes: Vec::new(),
/// };
/// let aggregator = ReviewAggregator::new(ReviewConfig::default()).unwrap();
/// let report = aggregator
///     .apply(&mut document, &ReconciliationReport::default(), &[], &confidence)
///     .unwrap();
/// assert_eq!(report.flagged_visits(), 0);
/// assert_eq!(report.data_quality.completeness_score, 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct ReviewAggregator {
    config: ReviewConfig,
}

impl ReviewAggregator {
    /// Create an aggregator; the configuration is validated first
    pub fn new(config: ReviewConfig) -> Result<Self, ReviewError> {
        config.validate().map_err(ReviewError::Config)?;
        Ok(Self { config })
    }

    /// Create an aggregator with default configuration
    pub fn default_config() -> Self {
        Self {
            config: ReviewConfig::default(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    /// Collect review reasons for one visit
    ///
    /// `log` holds the visit's merge decisions; `page_index` maps scored
    /// pages to their confidence.
    pub fn review_visit(
        &self,
        visit: &Visit,
        log: &[&MergeLogEntry],
        page_index: &BTreeMap<u32, f64>,
        document: &DocumentConfidence,
    ) -> VisitReview {
        let threshold = self.config.confidence_threshold;
        let mut review = VisitReview {
            visit_id: visit.id().clone(),
            reasons: Vec::new(),
        };

        // 1. Document confidence
        if self.config.flag_low_document_confidence && document.score < threshold {
            review.push(ReviewReason::LowDocumentConfidence {
                score: document.score,
                threshold,
            });
        }

        // 2. Cited pages
        if self.config.flag_low_page_confidence {
            for page in &visit.raw_source_pages {
                if let Some(&score) = page_index.get(page) {
                    if score < threshold {
                        review.push(ReviewReason::LowPageConfidence {
                            page: *page,
                            score,
                            threshold,
                        });
                    }
                }
            }
        }

        // 3. Retained conflicts: those on the entities, plus log entries not applied to the visit
        if self.config.flag_conflicts {
            for entity in visit.all_entities() {
                for reason in conflict_reasons(entity.category(), entity.conflicting_values()) {
                    review.push(reason);
                }
            }
            let applied = |entry: &MergeLogEntry| {
                visit.all_entities().any(|e| {
                    e.id() == entry.surviving_entity_id
                        && entry.conflicts.iter().all(|c| e.conflicting_values().contains(c))
                })
            };
            for entry in log.iter().filter(|e| e.is_conflict() && !applied(**e)) {
                for reason in conflict_reasons(entry.category, &entry.conflicts) {
                    review.push(reason);
                }
            }
        }

        // 4. Unresolved markers
        if self.config.flag_uncertain_entities {
            for entity in visit.all_entities().filter(|e| e.is_uncertain()) {
                review.push(ReviewReason::UncertainEntity {
                    category: entity.category(),
                    text: entity.primary_text().to_string(),
                    pages: entity.source_pages(),
                });
            }
        }

        // 5. Ambiguous abbreviations
        if self.config.flag_ambiguous_abbreviations {
            for entity in visit.all_entities() {
                for abbreviation in entity_abbreviations(entity) {
                    review.push(ReviewReason::AmbiguousAbbreviation {
                        abbreviation: abbreviation.to_string(),
                        meaning: ambiguous_meaning(abbreviation).unwrap_or_default().to_string(),
                        category: entity.category(),
                        text: entity.primary_text().to_string(),
                    });
                }
            }
        }

        if review.review_required() {
            tracing::debug!("{} flagged for review: {} reasons", visit.id(), review.reasons.len());
        }
        review
    }

    /// Compute the document-level quality summary
    pub fn data_quality(
        &self,
        document: &Document,
        confidence: &DocumentConfidence,
    ) -> DataQuality {
        let visits = document.visits();
        let mut notes = confidence.notes.clone();
        let mut missing_critical_fields = Vec::new();
        let mut unclear_sections = Vec::new();

        let expected = self.config.expected_fields.len() * visits.len();
        let mut present = 0usize;
        for visit in visits {
            for field in &self.config.expected_fields {
                if has_expected_field(visit, *field) {
                    present += 1;
                } else {
                    missing_critical_fields.push(format!("{}.{}", visit.id(), field));
                }
            }
            for category in EntityCategory::ALL {
                for entity in visit.entities(category).iter().filter(|e| e.is_uncertain()) {
                    unclear_sections.push(UnclearSection {
                        section: format!("{}.{}", visit.id(), section_name(category)),
                        page: entity.first_location().map(|l| l.page()),
                        reason: "unresolved uncertainty marker".to_string(),
                        original_text: entity
                            .attributes()
                            .texts()
                            .into_iter()
                            .find(|t| has_uncertainty_marker(t))
                            .map(str::to_string),
                    });
                }
            }
        }

        let completeness_score = if expected == 0 {
            notes.push("no visits extracted; completeness set to 0".to_string());
            0.0
        } else {
            let ratio = present as f64 / expected as f64;
            (ratio * 10_000.0).round() / 10_000.0
        };

        DataQuality {
            completeness_score,
            confidence_score: confidence.score,
            unclear_sections,
            missing_critical_fields,
            notes,
        }
    }

    /// Review every visit, record the reasons on the document, and set its data quality
    ///
    /// Fails when the document is already frozen.
    pub fn apply(
        &self,
        document: &mut Document,
        reconciliation: &ReconciliationReport,
        page_scores: &[PageScore],
        confidence: &DocumentConfidence,
    ) -> Result<ReviewReport, ReviewError> {
        let page_index = index_scores(page_scores);
        let reviews: Vec<VisitReview> = document
            .visits()
            .iter()
            .map(|visit| {
                let log = reconciliation.visit_log(visit.id());
                self.review_visit(visit, &log, &page_index, confidence)
            })
            .collect();

        for (visit, review) in document.visits_mut()?.iter_mut().zip(&reviews) {
            for reason in &review.reasons {
                visit.add_review_reason(reason.to_string());
            }
        }

        let data_quality = self.data_quality(document, confidence);
        document.set_data_quality(data_quality.clone())?;

        let report = ReviewReport {
            visits: reviews,
            data_quality,
        };
        tracing::info!(
            "Review complete: {} of {} visits flagged, completeness {:.2}",
            report.flagged_visits(),
            report.visits.len(),
            report.data_quality.completeness_score
        );
        Ok(report)
    }
}

impl Default for ReviewAggregator {
    fn default() -> Self {
        Self::default_config()
    }
}

/// One reason per conflicting field, values in recorded order
fn conflict_reasons(category: EntityCategory, conflicts: &[ConflictingValue]) -> Vec<ReviewReason> {
    let mut fields: Vec<&str> = Vec::new();
    for conflict in conflicts {
        if !fields.contains(&conflict.field.as_str()) {
            fields.push(&conflict.field);
        }
    }
    fields
        .into_iter()
        .map(|field| {
            let mut values: Vec<(String, u32)> = Vec::new();
            for conflict in conflicts.iter().filter(|c| c.field == field) {
                let value = (conflict.value.clone(), conflict.source_location.page());
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            ReviewReason::ConflictRetained {
                category,
                field: field.to_string(),
                values,
            }
        })
        .collect()
}

/// Ambiguous abbreviations across an entity's texts, first-appearance order
fn entity_abbreviations(entity: &Entity) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = Vec::new();
    for text in entity.attributes().texts() {
        for abbreviation in find_ambiguous_abbreviations(text) {
            if !found.contains(&abbreviation) {
                found.push(abbreviation);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use medrecon_domain::{RawAttributes, RawSourceLocation};

    fn raw(pairs: &[(&str, &str)]) -> RawAttributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn confidence(score: f64) -> DocumentConfidence {
        DocumentConfidence {
            score,
            scored_pages: vec![1],
            excluded_pages: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn visit_with(category: EntityCategory, pairs: &[(&str, &str)], page: u32) -> Document {
        let mut doc = Document::new();
        let visit = doc.add_visit(None).unwrap();
        let source = RawSourceLocation::new(page, 1, "excerpt");
        doc.add_entity(&visit, category, &raw(pairs), Some(&source)).unwrap();
        doc
    }

    #[test]
    fn test_threshold_is_strict() {
        let doc = visit_with(EntityCategory::Problem, &[("problem", "Asthma")], 1);
        let aggregator = ReviewAggregator::default();
        let index: BTreeMap<u32, f64> = [(1, 0.70)].into();

        let review = aggregator.review_visit(&doc.visits()[0], &[], &index, &confidence(0.70));
        assert!(!review.review_required());

        let index: BTreeMap<u32, f64> = [(1, 0.65)].into();
        let review = aggregator.review_visit(&doc.visits()[0], &[], &index, &confidence(0.69));
        assert_eq!(review.reasons.len(), 2);
        assert!(matches!(review.reasons[0], ReviewReason::LowDocumentConfidence { .. }));
        assert!(matches!(review.reasons[1], ReviewReason::LowPageConfidence { page: 1, .. }));
    }

    #[test]
    fn test_uncertain_entity_flagged() {
        let doc = visit_with(
            EntityCategory::Medication,
            &[("name", "Lisinopril"), ("dose", "[UNCLEAR: 10 or 40] mg")],
            2,
        );
        let review = ReviewAggregator::default().review_visit(
            &doc.visits()[0],
            &[],
            &BTreeMap::new(),
            &confidence(0.7),
        );
        assert_eq!(review.reasons.len(), 1);
        assert_eq!(
            review.reasons[0].to_string(),
            "medication 'Lisinopril' has an unresolved marker (pages 2)"
        );

        let quality = ReviewAggregator::default().data_quality(&doc, &confidence(0.7));
        assert_eq!(quality.unclear_sections.len(), 1);
        assert_eq!(quality.unclear_sections[0].section, "visit_1.medications");
        assert_eq!(quality.unclear_sections[0].page, Some(2));
        assert_eq!(
            quality.unclear_sections[0].original_text.as_deref(),
            Some("[UNCLEAR: 10 or 40] mg")
        );
    }

    #[test]
    fn test_ambiguous_abbreviation_flagged() {
        let doc = visit_with(
            EntityCategory::Medication,
            &[("name", "Digoxin"), ("dose", "0.125 mg"), ("frequency", "QD")],
            1,
        );
        let review = ReviewAggregator::default().review_visit(
            &doc.visits()[0],
            &[],
            &BTreeMap::new(),
            &confidence(0.7),
        );
        assert_eq!(review.reasons.len(), 1);
        match &review.reasons[0] {
            ReviewReason::AmbiguousAbbreviation { abbreviation, text, .. } => {
                assert_eq!(abbreviation, "qd");
                assert_eq!(text, "Digoxin");
            }
            other => panic!("unexpected reason: {:?}", other),
        }

        let lenient = ReviewAggregator::new(ReviewConfig::lenient()).unwrap();
        assert!(!lenient
            .review_visit(&doc.visits()[0], &[], &BTreeMap::new(), &confidence(0.7))
            .review_required());
    }

    #[test]
    fn test_completeness_and_missing_fields() {
        let mut doc = visit_with(EntityCategory::Medication, &[("name", "Aspirin 81mg")], 1);
        {
            let visit = &mut doc.visits_mut().unwrap()[0];
            visit.reason_for_visit = Some("Follow-up".to_string());
            visit.history_of_present_illness = Some("   ".to_string());
        }
        let quality = ReviewAggregator::default().data_quality(&doc, &confidence(0.7));
        // reason for visit and medications out of eight
        assert_eq!(quality.completeness_score, 0.25);
        assert!(quality.missing_critical_fields.contains(&"visit_1.assessment".to_string()));
        assert!(quality
            .missing_critical_fields
            .contains(&"visit_1.history_of_present_illness".to_string()));
        assert!(!quality.missing_critical_fields.contains(&"visit_1.medications".to_string()));
    }

    #[test]
    fn test_zero_visits() {
        let doc = Document::new();
        let quality = ReviewAggregator::default().data_quality(&doc, &confidence(0.15));
        assert_eq!(quality.completeness_score, 0.0);
        assert_eq!(quality.confidence_score, 0.15);
        assert!(quality.notes.iter().any(|n| n.contains("no visits")));
    }

    #[test]
    fn test_frozen_document_rejected() {
        let mut doc = visit_with(EntityCategory::Problem, &[("problem", "Asthma")], 1);
        doc.freeze();
        let result = ReviewAggregator::default().apply(
            &mut doc,
            &ReconciliationReport::default(),
            &[],
            &confidence(0.7),
        );
        assert!(matches!(result, Err(ReviewError::Record(_))));
    }
}
