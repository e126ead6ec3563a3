//! Domain error types

use thiserror::Error;

/// Result alias for record-model operations
pub type Result<T> = std::result::Result<T, DomainError>;

/// Errors raised by the canonical record model
///
/// Validation messages start with a stable code (`missing_provenance`,
/// `malformed_provenance`, `missing_field`, `invalid_visit_id`, ...)
/// optionally followed by `: <detail>`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Structural violation rejected at creation time
    #[error("Validation error: {0}")]
    Validation(String),

    /// Mutation attempted on a frozen document
    #[error("State error: {0}")]
    State(String),

    /// Unsupported or malformed schema version
    #[error("Schema error: {0}")]
    Schema(String),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    /// Build a validation error from a code and a detail message
    pub fn validation(code: &str, detail: impl AsRef<str>) -> Self {
        let detail = detail.as_ref();
        if detail.is_empty() {
            DomainError::Validation(code.to_string())
        } else {
            DomainError::Validation(format!("{}: {}", code, detail))
        }
    }

    /// The stable code of a validation error, if this is one
    pub fn code(&self) -> Option<&str> {
        match self {
            DomainError::Validation(msg) => Some(msg.split(':').next().unwrap_or(msg)),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_code_without_detail() {
        let err = DomainError::validation("missing_provenance", "");
        assert_eq!(err, DomainError::Validation("missing_provenance".to_string()));
        assert_eq!(err.code(), Some("missing_provenance"));
    }

    #[test]
    fn test_validation_code_with_detail() {
        let err = DomainError::validation("missing_field", "name");
        assert_eq!(err.to_string(), "Validation error: missing_field: name");
        assert_eq!(err.code(), Some("missing_field"));
    }

    #[test]
    fn test_state_error_has_no_code() {
        let err = DomainError::State("document is frozen".to_string());
        assert_eq!(err.code(), None);
    }
}
