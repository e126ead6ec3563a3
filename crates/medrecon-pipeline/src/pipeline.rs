//! Document processing pipeline

use crate::input::ExtractionBundle;
use crate::{PipelineConfig, PipelineError, Result};
use medrecon_domain::confidence::{
    aggregate_document, confidence_for_pages, index_scores, score_page, score_pages,
};
use medrecon_domain::{
    Diagnostic, Document, DocumentConfidence, DomainError, EntityCategory, PageScore, PageSignals,
    Severity, Visit,
};
use medrecon_reconciler::{
    CategoryOutcome, ReconcileError, ReconciliationReport, Reconciler, VisitReconciliation,
};
use medrecon_review::{ReviewAggregator, ReviewReport};
use serde::Serialize;
use tokio::task::JoinSet;

/// The frozen record and everything computed on the way
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedDocument {
    /// Canonical record, frozen
    pub document: Document,
    /// Merge decisions and counters
    pub reconciliation: ReconciliationReport,
    /// Review findings and data quality
    pub review: ReviewReport,
    /// Per-page scores in input order
    pub page_scores: Vec<PageScore>,
    /// Document-level confidence
    pub document_confidence: DocumentConfidence,
    /// Structural findings and reconciliation notes
    pub diagnostics: Vec<Diagnostic>,
}

impl ProcessedDocument {
    /// The record as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(self.document.to_json()?)
    }

    /// The merge log as pretty JSON
    pub fn merge_log_json(&self) -> Result<String> {
        let entries: Vec<_> = self.reconciliation.log().collect();
        Ok(serde_json::to_string_pretty(&entries)?)
    }
}

/// Runs ingest, scoring, reconciliation and review over one document
///
/// # Examples
///
/// ```
/// use medrecon_pipeline::{ExtractionBundle, Pipeline};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bundle = ExtractionBundle::from_json(r#"{
///     "pages": [{ "page": 1, "text": "Metformin 500mg daily" }],
///     "visits": [{
///         "entities": [{
///             "category": "medication",
///             "attributes": { "name": "Metformin 500mg" },
///             "source_locations": [{ "page": 1, "line": 1, "excerpt": "Metformin 500mg daily" }]
///         }]
///     }]
/// }"#)?;
///
/// let processed = Pipeline::default().process(&bundle)?;
/// assert!(processed.document.is_frozen());
/// assert_eq!(processed.document_confidence.score, 0.70);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    reconciler: Reconciler,
    review: ReviewAggregator,
}

impl Pipeline {
    /// Create a pipeline; every stage's configuration is validated first
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate().map_err(PipelineError::Config)?;
        let reconciler = Reconciler::new(config.reconciler.clone())?;
        let review = ReviewAggregator::new(config.review.clone())?;
        Ok(Self {
            config,
            reconciler,
            review,
        })
    }

    /// Create a pipeline with default configuration
    pub fn default_config() -> Self {
        Self {
            config: PipelineConfig::default(),
            reconciler: Reconciler::default(),
            review: ReviewAggregator::default(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process a bundle on the calling thread
    pub fn process(&self, bundle: &ExtractionBundle) -> Result<ProcessedDocument> {
        let mut document = self.ingest(bundle)?;

        let page_scores = score_pages(&bundle.page_signals(), &self.config.confidence);
        let confidence = aggregate_document(&page_scores, &self.config.confidence);
        assign_confidence(&mut document, &page_scores, &confidence)?;

        let mut report = ReconciliationReport::default();
        for index in 0..document.visits().len() {
            let (reconciliation, error) =
                self.reconciler.reconcile_visit_partial(&document.visits()[index]);
            self.absorb(&mut document, index, reconciliation, error, &mut report)?;
        }

        self.finish(document, report, page_scores, confidence)
    }

    /// Process a bundle with page scoring and per-category reconciliation on worker tasks
    ///
    /// Results are joined in page and category order, so the output is
    /// identical to [`Pipeline::process`].
    pub async fn process_concurrent(&self, bundle: &ExtractionBundle) -> Result<ProcessedDocument> {
        let mut document = self.ingest(bundle)?;

        let page_scores = self.score_concurrent(bundle.page_signals()).await?;
        let confidence = aggregate_document(&page_scores, &self.config.confidence);
        assign_confidence(&mut document, &page_scores, &confidence)?;

        let mut report = ReconciliationReport::default();
        for index in 0..document.visits().len() {
            let (reconciliation, error) =
                self.reconcile_concurrent(&document.visits()[index]).await?;
            self.absorb(&mut document, index, reconciliation, error, &mut report)?;
        }

        self.finish(document, report, page_scores, confidence)
    }

    /// Build the record from the bundle; fails on the first invalid entity
    fn ingest(&self, bundle: &ExtractionBundle) -> Result<Document> {
        let mut document = Document::new();
        document.set_metadata(bundle.metadata.clone())?;
        document.set_page_count(bundle.page_count())?;

        for candidate in &bundle.visits {
            let visit_id = match &candidate.visit_id {
                Some(id) => document.add_visit_with_id(id, candidate.date)?,
                None => document.add_visit(candidate.date)?,
            };

            let visit = document.visit_mut(&visit_id)?;
            visit.reason_for_visit = candidate.reason_for_visit.clone();
            visit.history_of_present_illness = candidate.history_of_present_illness.clone();
            visit.assessment = candidate.assessment.clone();
            for page in &candidate.pages {
                visit.note_source_page(*page);
            }

            for (position, entity) in candidate.entities.iter().enumerate() {
                let category = EntityCategory::parse(&entity.category)
                    .ok_or_else(|| DomainError::validation("invalid_category", &entity.category))?;
                document
                    .add_entity_with_sources(
                        &visit_id,
                        category,
                        &entity.attributes,
                        &entity.source_locations,
                    )
                    .map_err(|e| {
                        tracing::warn!(
                            "Rejected {} entity {} of {}: {}",
                            category,
                            position,
                            visit_id,
                            e
                        );
                        e
                    })?;
            }
        }

        tracing::info!(
            "Ingested {} visits, {} entities, {} pages",
            document.visits().len(),
            bundle.entity_count(),
            bundle.pages.len()
        );
        Ok(document)
    }

    async fn score_concurrent(&self, signals: Vec<PageSignals>) -> Result<Vec<PageScore>> {
        if signals.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_size = signals.len().div_ceil(self.config.page_workers);
        let mut handles = Vec::new();
        for chunk in signals.chunks(chunk_size) {
            let chunk = chunk.to_vec();
            let config = self.config.confidence.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                chunk.iter().map(|page| score_page(page, &config)).collect::<Vec<_>>()
            }));
        }

        let mut scores = Vec::with_capacity(signals.len());
        for handle in handles {
            scores.extend(handle.await?);
        }
        Ok(scores)
    }

    async fn reconcile_concurrent(
        &self,
        visit: &Visit,
    ) -> Result<(VisitReconciliation, Option<ReconcileError>)> {
        let deadline = self.reconciler.deadline_from_now();
        let mut tasks = JoinSet::new();
        for (position, category) in EntityCategory::ALL.into_iter().enumerate() {
            let reconciler = self.reconciler.clone();
            let mentions = visit.entities(category).to_vec();
            tasks.spawn_blocking(move || {
                (position, reconciler.reconcile_category_until(category, &mentions, deadline))
            });
        }

        let mut results: Vec<(usize, std::result::Result<CategoryOutcome, ReconcileError>)> =
            Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined?);
        }
        results.sort_by_key(|(position, _)| *position);

        let mut reconciliation = VisitReconciliation {
            visit_id: visit.id().clone(),
            outcomes: Vec::new(),
        };
        for (_, result) in results {
            match result {
                Ok(outcome) => reconciliation.outcomes.push(outcome),
                Err(error) => return Ok((reconciliation, Some(error))),
            }
        }
        Ok((reconciliation, None))
    }

    /// Apply one visit's reconciliation; on error, attach what was done so far
    fn absorb(
        &self,
        document: &mut Document,
        index: usize,
        reconciliation: VisitReconciliation,
        error: Option<ReconcileError>,
        report: &mut ReconciliationReport,
    ) -> Result<()> {
        let visit = document.visits_mut()?.get_mut(index).ok_or_else(|| {
            PipelineError::Reconcile(ReconcileError::Inconsistent(format!("no visit at {}", index)))
        })?;
        Reconciler::apply(visit, &reconciliation)?;
        for outcome in &reconciliation.outcomes {
            report.metrics.record_outcome(outcome);
        }
        report.visits.push(reconciliation);

        match error {
            None => Ok(()),
            Some(error @ ReconcileError::ResourceLimitExceeded { .. }) => {
                tracing::warn!("Reconciliation stopped: {}", error);
                let partial = self
                    .config
                    .partial_results_on_limit
                    .then(|| Box::new(std::mem::take(report)));
                Err(PipelineError::ResourceLimit { error, partial })
            }
            Some(error) => Err(error.into()),
        }
    }

    /// Review, collect diagnostics, freeze
    fn finish(
        &self,
        mut document: Document,
        reconciliation: ReconciliationReport,
        page_scores: Vec<PageScore>,
        document_confidence: DocumentConfidence,
    ) -> Result<ProcessedDocument> {
        let review = self
            .review
            .apply(&mut document, &reconciliation, &page_scores, &document_confidence)?;

        let mut diagnostics = document.validate();
        for visit in &reconciliation.visits {
            diagnostics.extend(visit.diagnostics());
        }
        for diagnostic in diagnostics.iter().filter(|d| d.severity == Severity::Warning) {
            document.add_warning(format!("{}: {}", diagnostic.code, diagnostic.message))?;
        }

        document.freeze();
        tracing::info!(
            "Processed document: confidence {:.2}, {} visits ({} flagged), {} diagnostics",
            document_confidence.score,
            document.visits().len(),
            review.flagged_visits(),
            diagnostics.len()
        );
        tracing::debug!("{}", reconciliation.metrics.summary());

        Ok(ProcessedDocument {
            document,
            reconciliation,
            review,
            page_scores,
            document_confidence,
            diagnostics,
        })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Give every entity the minimum confidence of the pages it cites
fn assign_confidence(
    document: &mut Document,
    page_scores: &[PageScore],
    confidence: &DocumentConfidence,
) -> Result<()> {
    let index = index_scores(page_scores);
    for visit in document.visits_mut()? {
        for category in EntityCategory::ALL {
            for entity in visit.entities_mut(category) {
                let value = confidence_for_pages(&entity.source_pages(), &index, confidence.score);
                entity.set_confidence(value)?;
            }
        }
    }
    Ok(())
}
