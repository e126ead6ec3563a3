//! Error types for reconciliation

use medrecon_domain::{DomainError, EntityCategory};
use thiserror::Error;

/// Errors that can occur while reconciling a visit
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    /// Too many mentions in one category
    #[error("Resource limit exceeded: {count} {category} mentions (max: {cap})")]
    ResourceLimitExceeded {
        /// Category that overflowed
        category: EntityCategory,
        /// Mentions received
        count: usize,
        /// Configured cap
        cap: usize,
    },

    /// Matching lost or duplicated a mention
    #[error("Inconsistent reconciliation: {0}")]
    Inconsistent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The record model refused the reconciled entities
    #[error("Record error: {0}")]
    Record(#[from] DomainError),
}

/// Result alias for reconciliation
pub type Result<T> = std::result::Result<T, ReconcileError>;
