//! Medrecon Review
//!
//! Decides which visits need a human to look at them and summarizes the
//! quality of the whole document.
//!
//! A visit is flagged when any of these hold:
//! - the document confidence is below the threshold (strict `<`, default 0.70)
//! - a page the visit cites scored below the threshold
//! - reconciliation retained conflicting values
//! - an entity still carries an `[UNCLEAR` or `[ILLEGIBLE` marker
//! - entity text uses an abbreviation with more than one reading (`QD`, `U`, `MS`)
//!
//! Review is data, not an error: flagged visits get `manual_review_required`
//! and a deduplicated list of human-readable reasons.
//!
//! # Examples
//!
//! ```no_run
//! use medrecon_review::{ReviewAggregator, ReviewConfig};
//! # use medrecon_domain::{Document, DocumentConfidence};
//! # use medrecon_reconciler::ReconciliationReport;
//! # fn run(
//! #     mut document: Document,
//! #     reconciliation: ReconciliationReport,
//! #     confidence: DocumentConfidence,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let aggregator = ReviewAggregator::new(ReviewConfig::strict())?;
//! let report = aggregator.apply(&mut document, &reconciliation, &[], &confidence)?;
//! for visit in &report.visits {
//!     for reason in &visit.reasons {
//!         println!("{}: {}", visit.visit_id, reason);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod aggregator;
mod config;
mod error;

pub use aggregator::{has_expected_field, ReviewAggregator, ReviewReason, ReviewReport, VisitReview};
pub use config::{ExpectedField, ReviewConfig, DEFAULT_CONFIDENCE_THRESHOLD};
pub use error::ReviewError;
