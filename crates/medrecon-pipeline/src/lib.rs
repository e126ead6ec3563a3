//! Medrecon Pipeline
//!
//! Turns one extraction bundle into a frozen, reconciled clinical record.
//!
//! ## Stages
//!
//! 1. **Ingest**: build the record from upstream candidates; an entity
//!    without provenance rejects the whole bundle
//! 2. **Score**: per-page confidence and the document mean
//! 3. **Reconcile**: merge duplicate mentions per visit and category
//! 4. **Review**: flag visits for a human and compute data quality
//! 5. **Freeze**: no further mutation
//!
//! [`Pipeline::process`] runs on the calling thread.
//! [`Pipeline::process_concurrent`] scores pages and reconciles categories
//! on blocking tasks and produces the same output.
//!
//! ## Usage
//!
//! ```no_run
//! use medrecon_pipeline::{telemetry, ExtractionBundle, Pipeline, PipelineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! telemetry::init_tracing(telemetry::DEFAULT_DIRECTIVE);
//!
//! let config = PipelineConfig::from_file("medrecon.toml")?;
//! let pipeline = Pipeline::new(config)?;
//! let bundle = ExtractionBundle::from_json(&std::fs::read_to_string("bundle.json")?)?;
//! let processed = pipeline.process(&bundle)?;
//! println!("{}", processed.to_json()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Resource limits
//!
//! A category over `reconciler.max_mentions_per_category` fails with
//! [`PipelineError::ResourceLimit`]. With `partial_results_on_limit` set
//! the error carries the visits and categories reconciled before the limit.

#![warn(missing_docs)]

mod config;
mod error;
mod input;
mod pipeline;

pub mod telemetry;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use input::{EntityCandidate, ExtractionBundle, PageInput, VisitCandidate};
pub use pipeline::{Pipeline, ProcessedDocument};
