//! Schema versioning for persisted documents
//!
//! Minor versions evolve additively: new fields are optional and default on
//! load. A record from any earlier 2.x minor loads unchanged apart from its
//! version stamp. Other majors are refused.

use crate::error::{DomainError, Result};
use serde_json::Value;
use std::fmt;

/// Current schema version written by [`crate::Document::to_json`]
pub const SCHEMA_VERSION: &str = "2.0";

/// A parsed `major.minor` version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion {
    /// Major version; a change means incompatible structure
    pub major: u32,
    /// Minor version; additive changes only
    pub minor: u32,
}

impl SchemaVersion {
    /// The version this crate writes
    pub fn current() -> Self {
        SchemaVersion { major: 2, minor: 0 }
    }

    /// Parse `"<major>.<minor>"`; a bare major means minor 0
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.trim().splitn(2, '.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| DomainError::Schema(format!("malformed schema version '{}'", s)))?;
        let minor = match parts.next() {
            Some(p) => p
                .parse::<u32>()
                .map_err(|_| DomainError::Schema(format!("malformed schema version '{}'", s)))?,
            None => 0,
        };
        Ok(SchemaVersion { major, minor })
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Bring a persisted record to the current schema version
///
/// # Errors
/// [`DomainError::Schema`] when the version is missing, malformed, or has a
/// different major.
pub fn migrate(mut value: Value) -> Result<Value> {
    let raw = value
        .get("schema_version")
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::Schema("missing schema_version".to_string()))?;
    let found = SchemaVersion::parse(raw)?;
    let current = SchemaVersion::current();

    if found.major != current.major {
        return Err(DomainError::Schema(format!(
            "unsupported schema major version {} (expected {})",
            found, current.major
        )));
    }
    if found.minor > current.minor {
        tracing::debug!(
            "Loading schema {} with newer minor than {}; unknown fields ignored",
            found,
            current
        );
    }

    if let Some(obj) = value.as_object_mut() {
        obj.insert("schema_version".to_string(), Value::String(current.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_versions() {
        assert_eq!(SchemaVersion::parse("2.0").unwrap(), SchemaVersion { major: 2, minor: 0 });
        assert_eq!(SchemaVersion::parse("2").unwrap(), SchemaVersion { major: 2, minor: 0 });
        assert_eq!(SchemaVersion::parse("2.3").unwrap().to_string(), "2.3");
        assert!(SchemaVersion::parse("two").is_err());
        assert!(SchemaVersion::parse("2.x").is_err());
    }

    #[test]
    fn test_migrate_accepts_2x() {
        let migrated = migrate(json!({"schema_version": "2.1", "visits": []})).unwrap();
        assert_eq!(migrated["schema_version"], SCHEMA_VERSION);
        assert_eq!(migrated["visits"], json!([]));
    }

    #[test]
    fn test_migrate_rejects_other_majors() {
        assert!(matches!(migrate(json!({"schema_version": "1.0"})), Err(DomainError::Schema(_))));
        assert!(matches!(migrate(json!({"schema_version": "3.0"})), Err(DomainError::Schema(_))));
    }

    #[test]
    fn test_migrate_requires_version() {
        assert!(matches!(migrate(json!({"visits": []})), Err(DomainError::Schema(_))));
    }
}
