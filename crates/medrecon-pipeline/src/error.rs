//! Error types for the pipeline

use medrecon_domain::DomainError;
use medrecon_reconciler::{ReconcileError, ReconciliationReport};
use medrecon_review::ReviewError;
use thiserror::Error;

/// Errors that can occur while processing a document
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Upstream input violated the record model (missing provenance, bad ids)
    #[error("Validation error: {0}")]
    Validation(#[from] DomainError),

    /// A category exceeded the mention cap
    #[error("Resource limit: {error}")]
    ResourceLimit {
        /// The reconciler's error
        error: ReconcileError,
        /// Visits and categories reconciled before the limit, when enabled
        partial: Option<Box<ReconciliationReport>>,
    },

    /// Reconciliation failed
    #[error("Reconciliation error: {0}")]
    Reconcile(ReconcileError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(String),

    /// A worker task failed to complete
    #[error("Task error: {0}")]
    Task(String),
}

impl From<ReconcileError> for PipelineError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::Record(e) => PipelineError::Validation(e),
            ReconcileError::Config(e) => PipelineError::Config(e),
            e @ ReconcileError::ResourceLimitExceeded { .. } => PipelineError::ResourceLimit {
                error: e,
                partial: None,
            },
            e => PipelineError::Reconcile(e),
        }
    }
}

impl From<ReviewError> for PipelineError {
    fn from(error: ReviewError) -> Self {
        match error {
            ReviewError::Config(e) => PipelineError::Config(e),
            ReviewError::Record(e) => PipelineError::Validation(e),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::Json(error.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(error: tokio::task::JoinError) -> Self {
        PipelineError::Task(error.to_string())
    }
}

/// Result alias for the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;
