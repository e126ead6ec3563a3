//! Integration tests for medrecon-review
//!
//! Documents are scored and reconciled through the public APIs before the
//! aggregator runs, mirroring the pipeline order.

use medrecon_domain::confidence::{aggregate_document, score_pages};
use medrecon_domain::{
    ConfidenceConfig, Document, EntityCategory, PageSignals, RawAttributes, RawSourceLocation,
};
use medrecon_reconciler::Reconciler;
use medrecon_review::{ReviewAggregator, ReviewConfig, ReviewReason};
use proptest::prelude::*;

fn raw(pairs: &[(&str, &str)]) -> RawAttributes {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn test_blood_pressure_conflict_flags_visit() {
    let mut doc = Document::new();
    let visit = doc.add_visit(None).unwrap();
    doc.add_entity(
        &visit,
        EntityCategory::Vital,
        &raw(&[("kind", "BP"), ("value", "120/80")]),
        Some(&RawSourceLocation::new(2, 3, "BP 120/80")),
    )
    .unwrap();
    doc.add_entity(
        &visit,
        EntityCategory::Vital,
        &raw(&[("kind", "BP"), ("value", "130/85")]),
        Some(&RawSourceLocation::new(5, 1, "BP 130/85")),
    )
    .unwrap();

    let config = ConfidenceConfig::default();
    let pages: Vec<PageSignals> =
        (1..=5).map(|p| PageSignals::extracted(p, "Vitals reviewed")).collect();
    let scores = score_pages(&pages, &config);
    let confidence = aggregate_document(&scores, &config);

    let reconciliation = Reconciler::default().reconcile_document(&mut doc).unwrap();
    let report = ReviewAggregator::default()
        .apply(&mut doc, &reconciliation, &scores, &confidence)
        .unwrap();

    let visit = &doc.visits()[0];
    assert!(visit.manual_review_required);
    assert_eq!(visit.review_reasons.len(), 1);
    let reason = &visit.review_reasons[0];
    assert!(reason.contains("blood_pressure"));
    assert!(reason.contains("120/80"));
    assert!(reason.contains("130/85"));
    assert!(reason.contains("page 2"));
    assert!(reason.contains("page 5"));

    match &report.visits[0].reasons[0] {
        ReviewReason::ConflictRetained { field, values, .. } => {
            assert_eq!(field, "blood_pressure");
            assert_eq!(values.iter().map(|(_, p)| *p).collect::<Vec<_>>(), vec![2, 5]);
        }
        other => panic!("unexpected reason: {:?}", other),
    }
}

fn blood_pressure_visit() -> Document {
    let mut doc = Document::new();
    let visit = doc.add_visit(None).unwrap();
    for (value, page) in [("120/80", 2), ("130/85", 5)] {
        doc.add_entity(
            &visit,
            EntityCategory::Vital,
            &raw(&[("kind", "BP"), ("value", value)]),
            Some(&RawSourceLocation::new(page, 1, format!("BP {}", value))),
        )
        .unwrap();
    }
    doc
}

#[test]
fn test_conflict_flagged_after_repeated_reconciliation() {
    let mut doc = blood_pressure_visit();
    let config = ConfidenceConfig::default();
    let pages: Vec<PageSignals> =
        (1..=5).map(|p| PageSignals::extracted(p, "Vitals reviewed")).collect();
    let scores = score_pages(&pages, &config);
    let confidence = aggregate_document(&scores, &config);

    let reconciler = Reconciler::default();
    reconciler.reconcile_document(&mut doc).unwrap();
    let second = reconciler.reconcile_document(&mut doc).unwrap();
    assert_eq!(second.log().count(), 0);

    let report = ReviewAggregator::default()
        .apply(&mut doc, &second, &scores, &confidence)
        .unwrap();

    let visit = &doc.visits()[0];
    assert_eq!(visit.entities(EntityCategory::Vital)[0].conflicting_values().len(), 2);
    assert!(visit.manual_review_required);
    assert_eq!(
        visit.review_reasons,
        vec![
            "conflicting vital blood_pressure values: '120/80' (page 2), '130/85' (page 5)"
                .to_string()
        ]
    );
    assert_eq!(report.flagged_visits(), 1);
}

#[test]
fn test_conflict_flagged_from_unapplied_log() {
    let doc = blood_pressure_visit();
    let reconciliation = Reconciler::default().reconcile_visit(&doc.visits()[0]).unwrap();
    let log: Vec<_> = reconciliation.log().collect();

    let confidence = medrecon_domain::DocumentConfidence {
        score: 0.70,
        scored_pages: Vec::new(),
        excluded_pages: Vec::new(),
        notes: Vec::new(),
    };
    let review = ReviewAggregator::default().review_visit(
        &doc.visits()[0],
        &log,
        &Default::default(),
        &confidence,
    );
    assert_eq!(review.reasons.len(), 1);
    assert!(matches!(
        &review.reasons[0],
        ReviewReason::ConflictRetained { field, .. } if field == "blood_pressure"
    ));
}

#[test]
fn test_clean_document_not_flagged() {
    let mut doc = Document::new();
    let visit = doc.add_visit(None).unwrap();
    doc.add_entity(
        &visit,
        EntityCategory::Problem,
        &raw(&[("problem", "Seasonal allergies")]),
        Some(&RawSourceLocation::new(1, 1, "Seasonal allergies")),
    )
    .unwrap();

    let config = ConfidenceConfig::default();
    let pages = vec![
        PageSignals::extracted(1, "Seasonal allergies, stable."),
        PageSignals::extracted(2, "Return in six months."),
    ];
    let scores = score_pages(&pages, &config);
    let confidence = aggregate_document(&scores, &config);
    assert_eq!(confidence.score, 0.70);

    let reconciliation = Reconciler::default().reconcile_document(&mut doc).unwrap();
    let report = ReviewAggregator::default()
        .apply(&mut doc, &reconciliation, &scores, &confidence)
        .unwrap();

    assert_eq!(report.flagged_visits(), 0);
    assert!(!doc.visits()[0].manual_review_required);
    assert!(doc.visits()[0].review_reasons.is_empty());
    assert_eq!(doc.data_quality().confidence_score, 0.70);
}

#[test]
fn test_low_page_confidence_flags_only_citing_visit() {
    let mut doc = Document::new();
    let first = doc.add_visit(None).unwrap();
    let second = doc.add_visit(None).unwrap();
    doc.add_entity(
        &first,
        EntityCategory::Problem,
        &raw(&[("problem", "Asthma")]),
        Some(&RawSourceLocation::new(1, 1, "Asthma")),
    )
    .unwrap();
    doc.add_entity(
        &second,
        EntityCategory::Problem,
        &raw(&[("problem", "Gout")]),
        Some(&RawSourceLocation::new(2, 1, "Gout")),
    )
    .unwrap();

    let config = ConfidenceConfig::default();
    let pages = vec![
        PageSignals::extracted(1, "Asthma, well controlled."),
        PageSignals::extracted(2, "Gout [ILLEGIBLE] flare"),
    ];
    let scores = score_pages(&pages, &config);
    let confidence = aggregate_document(&scores, &config);

    // page 2 at 0.55 pulls the document below threshold too
    let review_config = ReviewConfig {
        flag_low_document_confidence: false,
        ..Default::default()
    };
    let reconciliation = Reconciler::default().reconcile_document(&mut doc).unwrap();
    ReviewAggregator::new(review_config)
        .unwrap()
        .apply(&mut doc, &reconciliation, &scores, &confidence)
        .unwrap();

    assert!(!doc.visits()[0].manual_review_required);
    assert!(doc.visits()[1].manual_review_required);
    assert_eq!(
        doc.visits()[1].review_reasons,
        vec!["page 2 confidence 0.55 is below 0.70".to_string()]
    );
}

#[test]
fn test_repeated_apply_does_not_duplicate_reasons() {
    let mut doc = Document::new();
    let visit = doc.add_visit(None).unwrap();
    doc.add_entity(
        &visit,
        EntityCategory::Medication,
        &raw(&[("name", "Insulin glargine"), ("dose", "10 U")]),
        Some(&RawSourceLocation::new(1, 1, "Insulin glargine 10 U")),
    )
    .unwrap();

    let config = ConfidenceConfig::default();
    let pages = [PageSignals::extracted(1, "Insulin glargine 10 U nightly")];
    let scores = score_pages(&pages, &config);
    let confidence = aggregate_document(&scores, &config);
    let reconciliation = Reconciler::default().reconcile_document(&mut doc).unwrap();
    let aggregator = ReviewAggregator::default();
    aggregator.apply(&mut doc, &reconciliation, &scores, &confidence).unwrap();
    let once = doc.visits()[0].review_reasons.clone();
    aggregator.apply(&mut doc, &reconciliation, &scores, &confidence).unwrap();

    assert_eq!(doc.visits()[0].review_reasons, once);
    assert!(once.iter().any(|r| r.contains("ambiguous abbreviation 'u'")));
}

proptest! {
    #[test]
    fn prop_flag_matches_reasons(score in 0.15f64..0.85, threshold in 0.0f64..1.0) {
        let mut doc = Document::new();
        doc.add_visit(None).unwrap();
        let confidence = medrecon_domain::DocumentConfidence {
            score,
            scored_pages: Vec::new(),
            excluded_pages: Vec::new(),
            notes: Vec::new(),
        };
        let config = ReviewConfig { confidence_threshold: threshold, ..Default::default() };
        let aggregator = ReviewAggregator::new(config).unwrap();
        let report = aggregator
            .apply(&mut doc, &Default::default(), &[], &confidence)
            .unwrap();

        let visit = &doc.visits()[0];
        prop_assert_eq!(visit.manual_review_required, score < threshold);
        prop_assert_eq!(visit.manual_review_required, !visit.review_reasons.is_empty());
        prop_assert_eq!(report.flagged_visits(), usize::from(score < threshold));
    }
}
