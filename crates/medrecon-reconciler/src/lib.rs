//! Medrecon Reconciler
//!
//! Deduplicates entity mentions within each category of a visit and keeps an
//! append-only log of every merge decision.
//!
//! # Overview
//!
//! The Reconciler is responsible for:
//! - **Exact matching**: mentions whose normalized keys coincide always merge
//! - **Fuzzy matching**: remaining groups join when every cross pair of keys
//!   reaches the similarity threshold (complete linkage)
//! - **Merging**: one canonical entity per class, keeping every source location
//! - **Conflicts**: disagreeing doses or measured values are retained, never dropped
//!
//! # Architecture
//!
//! Reconciliation is scoped to one visit. Categories never mix: a problem is
//! never merged with a medication, and mentions of different visits stay apart.
//! Inputs are ordered by (page, line, ingestion index) before matching, so the
//! same document always yields byte-identical entities and logs.
//!
//! | Category | Canonical member | Conflict rule |
//! |----------|------------------|---------------|
//! | **Medication** | Longest spelled-out name | Differing dose, frequency, route or dates |
//! | **Problem** | Longest text, then most populated | None |
//! | **Lab result** | Unit and range, then most populated | Values beyond tolerance |
//! | **Vital** | Unit, then most populated | Values beyond tolerance; BP per component |
//! | **Plan item** | Longest text, then most populated | None |
//!
//! # Usage
//!
//! ```
//! use medrecon_domain::{Document, EntityCategory, RawAttributes, RawSourceLocation};
//! use medrecon_reconciler::Reconciler;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut document = Document::new();
//! let visit = document.add_visit(None)?;
//! for (page, text) in [(1, "Hypertension"), (2, "HTN")] {
//!     let raw: RawAttributes = [("problem".to_string(), text.to_string())].into();
//!     let source = RawSourceLocation::new(page, 1, text);
//!     document.add_entity(&visit, EntityCategory::Problem, &raw, Some(&source))?;
//! }
//!
//! let report = Reconciler::default().reconcile_document(&mut document)?;
//!
//! // An abbreviation is not similar enough to merge on its own
//! assert_eq!(document.visits()[0].entities(EntityCategory::Problem).len(), 2);
//! println!("{}", report.metrics.summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! fuzzy_threshold = 0.85
//! max_mentions_per_category = 500
//! numeric_tolerance = 0.01
//! enable_fuzzy = true
//! # deadline_ms = 250
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod log;
mod merge;
mod metrics;
mod reconciler;

pub mod matcher;
pub mod measurement;
pub mod similarity;

pub use config::ReconcilerConfig;
pub use error::{ReconcileError, Result};
pub use log::{MatchType, MergeAction, MergeLogEntry};
pub use merge::canonical_member;
pub use metrics::ReconcileMetrics;
pub use reconciler::{
    CategoryOutcome, ReconciliationReport, Reconciler, VisitReconciliation, FUZZY_ABORTED,
};
