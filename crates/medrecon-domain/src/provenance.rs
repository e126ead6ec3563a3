//! Provenance tracking: pointers back into the extracted page text

use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Validation code for an entity that arrives without any source location
pub const MISSING_PROVENANCE: &str = "missing_provenance";

/// Validation code for a source location with a zero page/line or blank excerpt
pub const MALFORMED_PROVENANCE: &str = "malformed_provenance";

/// A `{page, line, excerpt}` pointer into the original extracted text
///
/// Source locations are read-only once built. Merges append clones to the
/// surviving entity's list; nothing edits a location in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSourceLocation")]
pub struct SourceLocation {
    page: u32,
    line: u32,
    excerpt: String,
}

impl SourceLocation {
    /// Create a source location, rejecting zero page/line numbers and blank excerpts
    pub fn new(page: u32, line: u32, excerpt: impl Into<String>) -> Result<Self> {
        let excerpt = excerpt.into();
        if page == 0 {
            return Err(DomainError::validation(MALFORMED_PROVENANCE, "page must be >= 1"));
        }
        if line == 0 {
            return Err(DomainError::validation(MALFORMED_PROVENANCE, "line must be >= 1"));
        }
        if excerpt.trim().is_empty() {
            return Err(DomainError::validation(MALFORMED_PROVENANCE, "excerpt is empty"));
        }
        Ok(Self { page, line, excerpt })
    }

    /// 1-based page number
    pub fn page(&self) -> u32 {
        self.page
    }

    /// 1-based line number within the page
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Extracted text this location points at
    pub fn excerpt(&self) -> &str {
        &self.excerpt
    }

    /// Ingestion ordering key: page, then line
    pub fn order_key(&self) -> (u32, u32) {
        (self.page, self.line)
    }
}

/// Source location as delivered by the upstream structuring collaborator
///
/// Every field is optional on the wire; [`SourceLocation`] is the validated form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSourceLocation {
    /// Page number, if reported
    #[serde(default)]
    pub page: Option<u32>,
    /// Line number, if reported
    #[serde(default)]
    pub line: Option<u32>,
    /// Excerpt text, if reported
    #[serde(default)]
    pub excerpt: Option<String>,
}

impl RawSourceLocation {
    /// Convenience constructor for a fully populated location
    pub fn new(page: u32, line: u32, excerpt: impl Into<String>) -> Self {
        Self {
            page: Some(page),
            line: Some(line),
            excerpt: Some(excerpt.into()),
        }
    }
}

impl TryFrom<RawSourceLocation> for SourceLocation {
    type Error = DomainError;

    fn try_from(raw: RawSourceLocation) -> Result<Self> {
        let page = raw
            .page
            .ok_or_else(|| DomainError::validation(MALFORMED_PROVENANCE, "page is missing"))?;
        let line = raw
            .line
            .ok_or_else(|| DomainError::validation(MALFORMED_PROVENANCE, "line is missing"))?;
        let excerpt = raw
            .excerpt
            .ok_or_else(|| DomainError::validation(MALFORMED_PROVENANCE, "excerpt is missing"))?;
        SourceLocation::new(page, line, excerpt)
    }
}

/// Validate a list of upstream locations; an empty list is `missing_provenance`
pub fn resolve_sources(raw: &[RawSourceLocation]) -> Result<Vec<SourceLocation>> {
    if raw.is_empty() {
        return Err(DomainError::validation(MISSING_PROVENANCE, ""));
    }
    raw.iter().cloned().map(SourceLocation::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_location() {
        let loc = SourceLocation::new(3, 12, "Metformin 500mg BID").unwrap();
        assert_eq!(loc.page(), 3);
        assert_eq!(loc.line(), 12);
        assert_eq!(loc.excerpt(), "Metformin 500mg BID");
        assert_eq!(loc.order_key(), (3, 12));
    }

    #[test]
    fn test_zero_page_is_malformed() {
        let err = SourceLocation::new(0, 1, "text").unwrap_err();
        assert_eq!(err.code(), Some(MALFORMED_PROVENANCE));
    }

    #[test]
    fn test_blank_excerpt_is_malformed() {
        let err = SourceLocation::new(1, 1, "   ").unwrap_err();
        assert_eq!(err.code(), Some(MALFORMED_PROVENANCE));
    }

    #[test]
    fn test_raw_missing_line_is_malformed() {
        let raw = RawSourceLocation {
            page: Some(2),
            line: None,
            excerpt: Some("BP 120/80".to_string()),
        };
        let err = SourceLocation::try_from(raw).unwrap_err();
        assert_eq!(err.code(), Some(MALFORMED_PROVENANCE));
    }

    #[test]
    fn test_resolve_empty_is_missing_provenance() {
        let err = resolve_sources(&[]).unwrap_err();
        assert_eq!(err, DomainError::Validation(MISSING_PROVENANCE.to_string()));
    }

    #[test]
    fn test_deserialize_rejects_malformed() {
        let json = r#"{"page": 0, "line": 1, "excerpt": "x"}"#;
        let parsed: std::result::Result<SourceLocation, _> = serde_json::from_str(json);
        assert!(parsed.is_err());

        let json = r#"{"page": 4, "line": 7, "excerpt": "HTN"}"#;
        let parsed: SourceLocation = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.order_key(), (4, 7));
    }
}
