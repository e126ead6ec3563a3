//! Review error types

use medrecon_domain::DomainError;
use thiserror::Error;

/// Errors that can occur while aggregating review flags
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReviewError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The document refused the update (frozen, unknown visit)
    #[error("Record error: {0}")]
    Record(#[from] DomainError),
}
