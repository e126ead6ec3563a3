//! Confidence scoring
//!
//! Deterministic, per-page uncertainty scoring. A page starts at the base
//! confidence, loses a fixed amount for each uncertainty signal, and is
//! clamped to `[CONFIDENCE_FLOOR, CONFIDENCE_CEILING]`. All arithmetic runs
//! in integer basis points so equal inputs give bit-identical scores.

use crate::lexicon::{self, HANDWRITING_MARKER};
use crate::normalize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Confidence of a page with no uncertainty signals
pub const BASE_CONFIDENCE: f64 = 0.70;

/// Lowest score a page can receive; also assigned to failed pages
pub const CONFIDENCE_FLOOR: f64 = 0.15;

/// Highest score a page can receive
pub const CONFIDENCE_CEILING: f64 = 0.85;

/// Penalty per `[UNCLEAR`/`[ILLEGIBLE` span
pub const UNCLEAR_SPAN_PENALTY: f64 = 0.15;

/// Penalty per handwriting indicator
pub const HANDWRITING_PENALTY: f64 = 0.05;

/// Penalty when ambiguous characters are too dense
pub const AMBIGUOUS_CHARACTER_PENALTY: f64 = 0.08;

/// Share of non-whitespace characters above which the ambiguous-character penalty applies
pub const AMBIGUOUS_CHARACTER_DENSITY: f64 = 0.15;

/// Penalty when abbreviations are too dense
pub const ABBREVIATION_PENALTY: f64 = 0.05;

/// Share of word tokens above which the abbreviation penalty applies
pub const ABBREVIATION_DENSITY: f64 = 0.20;

/// Characters extraction tends to emit when it cannot read a glyph
const AMBIGUOUS_CHARACTERS: &[char] = &['?', '~', '|', '_', '\u{FFFD}'];

const BASIS_POINTS: f64 = 10_000.0;

fn to_bp(value: f64) -> i64 {
    (value * BASIS_POINTS).round() as i64
}

fn from_bp(bp: i64) -> f64 {
    bp as f64 / BASIS_POINTS
}

/// Configuration for page scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Starting score of every extracted page
    pub base: f64,
    /// Lower clamp bound
    pub floor: f64,
    /// Upper clamp bound
    pub ceiling: f64,
    /// Penalty per unclear span
    pub unclear_span_penalty: f64,
    /// Penalty per handwriting indicator
    pub handwriting_penalty: f64,
    /// Penalty for dense ambiguous characters
    pub ambiguous_character_penalty: f64,
    /// Density threshold for ambiguous characters
    pub ambiguous_character_density: f64,
    /// Penalty for dense abbreviations
    pub abbreviation_penalty: f64,
    /// Density threshold for abbreviations
    pub abbreviation_density: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            base: BASE_CONFIDENCE,
            floor: CONFIDENCE_FLOOR,
            ceiling: CONFIDENCE_CEILING,
            unclear_span_penalty: UNCLEAR_SPAN_PENALTY,
            handwriting_penalty: HANDWRITING_PENALTY,
            ambiguous_character_penalty: AMBIGUOUS_CHARACTER_PENALTY,
            ambiguous_character_density: AMBIGUOUS_CHARACTER_DENSITY,
            abbreviation_penalty: ABBREVIATION_PENALTY,
            abbreviation_density: ABBREVIATION_DENSITY,
        }
    }
}

impl ConfidenceConfig {
    /// Validate bounds and penalties
    pub fn validate(&self) -> Result<(), String> {
        let unit = |name: &str, v: f64| -> Result<(), String> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(format!("{} must be between 0.0 and 1.0, got {}", name, v))
            }
        };
        unit("base", self.base)?;
        unit("floor", self.floor)?;
        unit("ceiling", self.ceiling)?;
        unit("unclear_span_penalty", self.unclear_span_penalty)?;
        unit("handwriting_penalty", self.handwriting_penalty)?;
        unit("ambiguous_character_penalty", self.ambiguous_character_penalty)?;
        unit("ambiguous_character_density", self.ambiguous_character_density)?;
        unit("abbreviation_penalty", self.abbreviation_penalty)?;
        unit("abbreviation_density", self.abbreviation_density)?;

        if self.floor > self.ceiling {
            return Err(format!("floor {} exceeds ceiling {}", self.floor, self.ceiling));
        }
        Ok(())
    }
}

/// Counts of uncertainty signals on a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncertaintyMarkers {
    /// `[UNCLEAR…]` and `[ILLEGIBLE]` spans
    #[serde(default)]
    pub unclear_spans: u32,
    /// Handwriting indicators
    #[serde(default)]
    pub handwriting_indicators: u32,
}

impl UncertaintyMarkers {
    /// Count markers embedded in text
    pub fn detect(text: &str) -> Self {
        Self {
            unclear_spans: lexicon::UNCERTAINTY_MARKERS
                .iter()
                .map(|m| lexicon::count_marker(text, m))
                .sum(),
            handwriting_indicators: lexicon::count_marker(text, HANDWRITING_MARKER),
        }
    }

    /// Sum of two marker sets
    pub fn combined(self, other: UncertaintyMarkers) -> Self {
        Self {
            unclear_spans: self.unclear_spans.saturating_add(other.unclear_spans),
            handwriting_indicators: self
                .handwriting_indicators
                .saturating_add(other.handwriting_indicators),
        }
    }

    /// Whether no signal is present
    pub fn is_empty(&self) -> bool {
        self.unclear_spans == 0 && self.handwriting_indicators == 0
    }
}

/// Extraction status of a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Text was extracted
    #[default]
    Extracted,
    /// Page intentionally empty or skipped
    Blank,
    /// Extraction failed or was blocked
    Failed,
}

/// Everything the scorer needs to know about one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSignals {
    /// 1-based page number
    pub page: u32,
    /// Extracted text
    #[serde(default)]
    pub text: String,
    /// Extraction status
    #[serde(default)]
    pub status: PageStatus,
    /// Marker counts reported explicitly by the extractor
    #[serde(default)]
    pub markers: UncertaintyMarkers,
}

impl PageSignals {
    /// Page with extracted text and no explicit counts
    pub fn extracted(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
            status: PageStatus::Extracted,
            markers: UncertaintyMarkers::default(),
        }
    }

    /// Page the extractor skipped
    pub fn blank(page: u32) -> Self {
        Self {
            page,
            text: String::new(),
            status: PageStatus::Blank,
            markers: UncertaintyMarkers::default(),
        }
    }

    /// Page whose extraction failed
    pub fn failed(page: u32) -> Self {
        Self {
            page,
            text: String::new(),
            status: PageStatus::Failed,
            markers: UncertaintyMarkers::default(),
        }
    }

    /// Attach explicit marker counts
    pub fn with_markers(mut self, markers: UncertaintyMarkers) -> Self {
        self.markers = markers;
        self
    }
}

/// Kind of penalty applied to a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyKind {
    /// Unclear / illegible spans
    UnclearSpan,
    /// Handwriting indicators
    Handwriting,
    /// Dense ambiguous characters
    AmbiguousCharacters,
    /// Dense abbreviations
    AbbreviationDensity,
}

/// One applied penalty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Penalty {
    /// What triggered it
    pub kind: PenaltyKind,
    /// Total deduction
    pub amount: f64,
    /// Number of occurrences (1 for density penalties)
    pub count: u32,
}

/// Which clamp bound was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampBound {
    /// Raised to the floor
    Floor,
    /// Lowered to the ceiling
    Ceiling,
}

/// Score of one page with its explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageScore {
    /// 1-based page number
    pub page: u32,
    /// Extraction status
    pub status: PageStatus,
    basis_points: Option<i64>,
    /// Penalties applied, in evaluation order
    pub penalties: Vec<Penalty>,
    /// Clamp bound applied, if any
    pub clamped: Option<ClampBound>,
}

impl PageScore {
    /// Score in [0, 1]; `None` for blank pages
    pub fn score(&self) -> Option<f64> {
        self.basis_points.map(from_bp)
    }

    /// Whether the page contributes to document confidence
    pub fn is_scored(&self) -> bool {
        self.basis_points.is_some()
    }
}

/// Score one page
pub fn score_page(signals: &PageSignals, config: &ConfidenceConfig) -> PageScore {
    let floor = to_bp(config.floor);
    let ceiling = to_bp(config.ceiling);

    let unscored = |status| PageScore {
        page: signals.page,
        status,
        basis_points: None,
        penalties: Vec::new(),
        clamped: None,
    };

    match signals.status {
        PageStatus::Failed => {
            return PageScore {
                page: signals.page,
                status: PageStatus::Failed,
                basis_points: Some(floor),
                penalties: Vec::new(),
                clamped: None,
            };
        }
        PageStatus::Blank => return unscored(PageStatus::Blank),
        PageStatus::Extracted => {
            if signals.text.trim().is_empty() && signals.markers.is_empty() {
                return unscored(PageStatus::Blank);
            }
        }
    }

    let markers = UncertaintyMarkers::detect(&signals.text).combined(signals.markers);
    let mut penalties = Vec::new();

    if markers.unclear_spans > 0 {
        penalties.push((
            PenaltyKind::UnclearSpan,
            to_bp(config.unclear_span_penalty),
            markers.unclear_spans,
        ));
    }
    if markers.handwriting_indicators > 0 {
        penalties.push((
            PenaltyKind::Handwriting,
            to_bp(config.handwriting_penalty),
            markers.handwriting_indicators,
        ));
    }
    if ambiguous_character_density(&signals.text) > config.ambiguous_character_density {
        penalties.push((
            PenaltyKind::AmbiguousCharacters,
            to_bp(config.ambiguous_character_penalty),
            1,
        ));
    }
    if abbreviation_density(&signals.text) > config.abbreviation_density {
        penalties.push((PenaltyKind::AbbreviationDensity, to_bp(config.abbreviation_penalty), 1));
    }

    let deduction: i64 = penalties.iter().map(|(_, bp, count)| bp * i64::from(*count)).sum();
    let raw = to_bp(config.base) - deduction;
    let (basis_points, clamped) = if raw < floor {
        (floor, Some(ClampBound::Floor))
    } else if raw > ceiling {
        (ceiling, Some(ClampBound::Ceiling))
    } else {
        (raw, None)
    };

    if let Some(bound) = clamped {
        tracing::debug!(
            page = signals.page,
            raw = from_bp(raw),
            bound = ?bound,
            "Page confidence clamped"
        );
    }

    PageScore {
        page: signals.page,
        status: PageStatus::Extracted,
        basis_points: Some(basis_points),
        penalties: penalties
            .into_iter()
            .map(|(kind, bp, count)| Penalty {
                kind,
                amount: from_bp(bp * i64::from(count)),
                count,
            })
            .collect(),
        clamped,
    }
}

/// Score every page, preserving input order
pub fn score_pages(pages: &[PageSignals], config: &ConfidenceConfig) -> Vec<PageScore> {
    pages.iter().map(|p| score_page(p, config)).collect()
}

/// Share of non-whitespace characters that are ambiguous glyph substitutes
///
/// Marker spans (`[UNCLEAR: …]`, `[ILLEGIBLE]`, `[HANDWRITTEN …]`) are not counted.
pub fn ambiguous_character_density(text: &str) -> f64 {
    let text = lexicon::strip_markers(text);
    let mut total = 0usize;
    let mut ambiguous = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if AMBIGUOUS_CHARACTERS.contains(&c) {
            ambiguous += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        ambiguous as f64 / total as f64
    }
}

/// Share of word tokens that are known medical abbreviations
pub fn abbreviation_density(text: &str) -> f64 {
    let words: Vec<String> = normalize::tokens(text)
        .into_iter()
        .filter(|t| t.chars().any(char::is_alphabetic))
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let abbreviated = words.iter().filter(|w| lexicon::is_medical_abbreviation(w)).count();
    abbreviated as f64 / words.len() as f64
}

/// Document-level confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentConfidence {
    /// Mean of scored pages, or the floor if none
    pub score: f64,
    /// Pages that contributed, ascending
    pub scored_pages: Vec<u32>,
    /// Blank or skipped pages, ascending
    pub excluded_pages: Vec<u32>,
    /// Informational notes
    pub notes: Vec<String>,
}

/// Aggregate page scores into a document score
///
/// The mean is taken over scored pages only. Blank pages are listed in
/// `excluded_pages` with a note. With no scored page at all the document
/// gets the configured floor.
pub fn aggregate_document(scores: &[PageScore], config: &ConfidenceConfig) -> DocumentConfidence {
    let mut scored: Vec<(u32, i64)> = scores
        .iter()
        .filter_map(|s| s.basis_points.map(|bp| (s.page, bp)))
        .collect();
    scored.sort_unstable();

    let mut excluded: Vec<u32> = scores.iter().filter(|s| !s.is_scored()).map(|s| s.page).collect();
    excluded.sort_unstable();
    excluded.dedup();

    let mut notes: Vec<String> = excluded
        .iter()
        .map(|p| format!("page {} is blank; excluded from document confidence", p))
        .collect();

    let score = if scored.is_empty() {
        notes.push("no scorable pages; document confidence set to floor".to_string());
        from_bp(to_bp(config.floor))
    } else {
        let count = scored.len() as i64;
        let sum: i64 = scored.iter().map(|(_, bp)| bp).sum();
        from_bp((sum + count / 2) / count)
    };

    tracing::debug!(
        "Document confidence {:.4} from {} pages ({} excluded)",
        score,
        scored.len(),
        excluded.len()
    );

    DocumentConfidence {
        score,
        scored_pages: scored.into_iter().map(|(page, _)| page).collect(),
        excluded_pages: excluded,
        notes,
    }
}

/// Map of page number to score for scored pages
pub fn index_scores(scores: &[PageScore]) -> BTreeMap<u32, f64> {
    scores.iter().filter_map(|s| s.score().map(|v| (s.page, v))).collect()
}

/// Confidence for an entity citing `pages`
///
/// Minimum over the cited pages; a page without a score counts as
/// `document_score`. No pages at all also yields `document_score`.
pub fn confidence_for_pages(pages: &[u32], index: &BTreeMap<u32, f64>, document_score: f64) -> f64 {
    pages
        .iter()
        .map(|p| index.get(p).copied().unwrap_or(document_score))
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
        .unwrap_or(document_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> ConfidenceConfig {
        ConfidenceConfig::default()
    }

    #[test]
    fn test_clean_page_scores_base() {
        let signals = PageSignals::extracted(1, "Patient seen for follow up of diabetes.");
        let score = score_page(&signals, &config());
        assert_eq!(score.score(), Some(0.70));
        assert!(score.penalties.is_empty());
        assert_eq!(score.clamped, None);
    }

    #[test]
    fn test_unclear_span_penalty() {
        let score = score_page(
            &PageSignals::extracted(2, "Lisinopril [UNCLEAR: 10 or 40] mg taken every morning"),
            &config(),
        );
        assert_eq!(score.score(), Some(0.55));
        assert_eq!(score.penalties[0].kind, PenaltyKind::UnclearSpan);
    }

    #[test]
    fn test_explicit_markers_added_to_detected() {
        let signals = PageSignals::extracted(1, "Seen today [HANDWRITTEN] note in margin")
            .with_markers(UncertaintyMarkers {
                unclear_spans: 1,
                handwriting_indicators: 1,
            });
        // 0.70 - 0.15 - 2 * 0.05
        assert_eq!(score_page(&signals, &config()).score(), Some(0.45));
    }

    #[test]
    fn test_floor_clamp_recorded() {
        let text = "[UNCLEAR] [UNCLEAR] [UNCLEAR] [ILLEGIBLE] words here";
        let score = score_page(&PageSignals::extracted(1, text), &config());
        assert_eq!(score.score(), Some(CONFIDENCE_FLOOR));
        assert_eq!(score.clamped, Some(ClampBound::Floor));
    }

    #[test]
    fn test_ceiling_clamp_recorded() {
        let cfg = ConfidenceConfig { base: 0.95, ..config() };
        let score = score_page(&PageSignals::extracted(1, "Plain narrative text"), &cfg);
        assert_eq!(score.score(), Some(CONFIDENCE_CEILING));
        assert_eq!(score.clamped, Some(ClampBound::Ceiling));
    }

    #[test]
    fn test_failed_page_gets_floor() {
        let score = score_page(&PageSignals::failed(4), &config());
        assert_eq!(score.score(), Some(CONFIDENCE_FLOOR));
        assert_eq!(score.status, PageStatus::Failed);
    }

    #[test]
    fn test_blank_pages_unscored() {
        assert_eq!(score_page(&PageSignals::blank(1), &config()).score(), None);
        assert_eq!(score_page(&PageSignals::extracted(2, "   "), &config()).score(), None);
    }

    #[test]
    fn test_ambiguous_character_density() {
        assert!(ambiguous_character_density("a?b~c|d_") > 0.15);
        let score = score_page(&PageSignals::extracted(1, "Met?orm|n 5?0 ~g"), &config());
        assert_eq!(score.score(), Some(0.62));
    }

    #[test]
    fn test_marker_spans_not_counted_as_ambiguous() {
        assert_eq!(ambiguous_character_density("[UNCLEAR: ???] ok"), 0.0);
        assert_eq!(ambiguous_character_density("[ILLEGIBLE ~~|__]"), 0.0);
        assert!(ambiguous_character_density("[1?] ok") > 0.0);
    }

    #[test]
    fn test_abbreviation_density() {
        assert_eq!(abbreviation_density("HTN DM CAD"), 1.0);
        let score = score_page(&PageSignals::extracted(1, "HTN DM CAD stable"), &config());
        assert_eq!(score.score(), Some(0.65));
    }

    #[test]
    fn test_document_mean_excludes_blank() {
        let scores = vec![
            score_page(&PageSignals::extracted(1, "Clean page of narrative"), &config()),
            score_page(&PageSignals::blank(2), &config()),
            score_page(&PageSignals::extracted(3, "Dose [UNCLEAR] noted in the chart"), &config()),
        ];
        let doc = aggregate_document(&scores, &config());
        assert_eq!(doc.score, 0.625);
        assert_eq!(doc.scored_pages, vec![1, 3]);
        assert_eq!(doc.excluded_pages, vec![2]);
        assert_eq!(doc.notes.len(), 1);
    }

    #[test]
    fn test_document_identical_pages_equal_page_score() {
        let scores: Vec<PageScore> = (1..=7)
            .map(|p| {
                score_page(&PageSignals::extracted(p, "Routine visit without concerns"), &config())
            })
            .collect();
        assert_eq!(aggregate_document(&scores, &config()).score, 0.70);
    }

    #[test]
    fn test_document_all_blank_gets_floor() {
        let scores = vec![score_page(&PageSignals::blank(1), &config())];
        let doc = aggregate_document(&scores, &config());
        assert_eq!(doc.score, CONFIDENCE_FLOOR);
        assert!(doc.notes.iter().any(|n| n.contains("no scorable pages")));
    }

    #[test]
    fn test_confidence_for_pages_uses_minimum() {
        let scores = vec![
            score_page(&PageSignals::extracted(1, "Clean page of narrative"), &config()),
            score_page(&PageSignals::extracted(2, "Dose [UNCLEAR] noted in the chart"), &config()),
        ];
        let index = index_scores(&scores);
        assert_eq!(confidence_for_pages(&[1, 2], &index, 0.6), 0.55);
        assert_eq!(confidence_for_pages(&[1], &index, 0.6), 0.70);
        assert_eq!(confidence_for_pages(&[9], &index, 0.6), 0.6);
        assert_eq!(confidence_for_pages(&[], &index, 0.6), 0.6);
    }

    #[test]
    fn test_config_validate() {
        assert!(config().validate().is_ok());
        let inverted = ConfidenceConfig { floor: 0.9, ceiling: 0.2, ..config() };
        assert!(inverted.validate().is_err());
        let negative = ConfidenceConfig { unclear_span_penalty: -0.1, ..config() };
        assert!(negative.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_score_within_bounds(
            text in "[a-zA-Z ?~|_\\[\\]]{0,200}",
            unclear in 0u32..20,
            handwriting in 0u32..20,
        ) {
            let signals = PageSignals::extracted(1, text).with_markers(UncertaintyMarkers {
                unclear_spans: unclear,
                handwriting_indicators: handwriting,
            });
            if let Some(score) = score_page(&signals, &config()).score() {
                prop_assert!((CONFIDENCE_FLOOR..=CONFIDENCE_CEILING).contains(&score));
            }
        }

        #[test]
        fn prop_penalties_are_order_independent(unclear in 0usize..10, handwriting in 0usize..10) {
            let unclear = "[UNCLEAR] ".repeat(unclear);
            let handwriting = "[HANDWRITTEN] ".repeat(handwriting);
            let forward = format!("{}{} visit narrative", unclear, handwriting);
            let backward = format!("visit narrative {}{}", handwriting, unclear);
            prop_assert_eq!(
                score_page(&PageSignals::extracted(1, forward), &config()).score(),
                score_page(&PageSignals::extracted(1, backward), &config()).score()
            );
        }
    }
}
