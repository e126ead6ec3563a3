//! Medrecon Domain Layer
//!
//! This crate contains the canonical clinical record model and the pure
//! scoring and text utilities every other layer depends upon.
//!
//! ## Key Concepts
//!
//! - **Entity**: a single extracted clinical fact (medication, problem, vital,
//!   lab result, plan item) with raw attributes and provenance
//! - **Source Location**: a `{page, line, excerpt}` pointer back into the
//!   extracted text; every entity carries at least one
//! - **Visit / Document**: the record tree, frozen before hand-off to renderers
//! - **Confidence**: a bounded per-page score derived from uncertainty markers
//! - **Normalized key**: a comparison-only form of raw text used for matching
//!
//! ## Architecture
//!
//! - No I/O, no global state
//! - Pure functions for scoring and normalization
//! - Structural invariants are enforced at construction and mutation time

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod category;
pub mod confidence;
pub mod document;
pub mod entity;
pub mod error;
pub mod lexicon;
pub mod normalize;
pub mod provenance;
pub mod schema;
pub mod visit;

// Re-exports for convenience
pub use category::{EntityCategory, VitalKind};
pub use confidence::{
    ConfidenceConfig, DocumentConfidence, PageScore, PageSignals, PageStatus, UncertaintyMarkers,
};
pub use document::{DataQuality, Diagnostic, Document, DocumentMetadata, Severity, UnclearSection};
pub use entity::{ConflictingValue, Entity, EntityAttributes, EntityId, RawAttributes};
pub use error::{DomainError, Result};
pub use provenance::{RawSourceLocation, SourceLocation};
pub use visit::{EntityHandle, Visit, VisitId};
