//! Review aggregator configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default confidence below which review is required (strict `<`)
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.70;

/// A per-visit field counted by the completeness score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedField {
    /// Visit date
    Date,
    /// Reason for visit
    ReasonForVisit,
    /// History of present illness
    HistoryOfPresentIllness,
    /// Assessment
    Assessment,
    /// At least one medication
    Medications,
    /// At least one problem
    Problems,
    /// At least one vital sign
    Vitals,
    /// At least one lab result
    Results,
    /// At least one plan item
    Plan,
}

impl ExpectedField {
    /// Name used in `missing_critical_fields`
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpectedField::Date => "date",
            ExpectedField::ReasonForVisit => "reason_for_visit",
            ExpectedField::HistoryOfPresentIllness => "history_of_present_illness",
            ExpectedField::Assessment => "assessment",
            ExpectedField::Medications => "medications",
            ExpectedField::Problems => "problems",
            ExpectedField::Vitals => "vitals",
            ExpectedField::Results => "results",
            ExpectedField::Plan => "plan",
        }
    }
}

impl fmt::Display for ExpectedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the review aggregator
///
/// # Examples
///
/// ```
/// use medrecon_review::ReviewConfig;
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.confidence_threshold, 0.70);
///
/// let config = ReviewConfig::from_toml("confidence_threshold = 0.8").unwrap();
/// assert!(config.flag_conflicts);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Confidence below which a document or cited page needs review
    /// Default: 0.70
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Flag visits when the document confidence is low
    #[serde(default = "default_true")]
    pub flag_low_document_confidence: bool,

    /// Flag visits citing a low-confidence page
    #[serde(default = "default_true")]
    pub flag_low_page_confidence: bool,

    /// Flag visits with retained conflicts
    #[serde(default = "default_true")]
    pub flag_conflicts: bool,

    /// Flag visits holding entities with unresolved markers
    #[serde(default = "default_true")]
    pub flag_uncertain_entities: bool,

    /// Flag visits whose entity text uses an ambiguous abbreviation
    #[serde(default = "default_true")]
    pub flag_ambiguous_abbreviations: bool,

    /// Fields counted by the completeness score
    #[serde(default = "default_expected_fields")]
    pub expected_fields: Vec<ExpectedField>,
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_true() -> bool {
    true
}

fn default_expected_fields() -> Vec<ExpectedField> {
    vec![
        ExpectedField::Date,
        ExpectedField::ReasonForVisit,
        ExpectedField::HistoryOfPresentIllness,
        ExpectedField::Assessment,
        ExpectedField::Medications,
        ExpectedField::Problems,
        ExpectedField::Vitals,
        ExpectedField::Plan,
    ]
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            flag_low_document_confidence: true,
            flag_low_page_confidence: true,
            flag_conflicts: true,
            flag_uncertain_entities: true,
            flag_ambiguous_abbreviations: true,
            expected_fields: default_expected_fields(),
        }
    }
}

impl ReviewConfig {
    /// Create a strict configuration (higher threshold, lab results expected)
    pub fn strict() -> Self {
        let mut expected_fields = default_expected_fields();
        expected_fields.push(ExpectedField::Results);
        Self {
            confidence_threshold: 0.80,
            expected_fields,
            ..Self::default()
        }
    }

    /// Create a lenient configuration (lower threshold, abbreviations not flagged)
    pub fn lenient() -> Self {
        Self {
            confidence_threshold: 0.60,
            flag_ambiguous_abbreviations: false,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold must be between 0.0 and 1.0, got {}",
                self.confidence_threshold
            ));
        }
        if self.expected_fields.is_empty() {
            return Err("expected_fields must not be empty".to_string());
        }
        for (i, field) in self.expected_fields.iter().enumerate() {
            if self.expected_fields[..i].contains(field) {
                return Err(format!("expected_fields lists '{}' twice", field));
            }
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReviewConfig::default();
        assert_eq!(config.confidence_threshold, 0.70);
        assert_eq!(config.expected_fields.len(), 8);
        assert!(!config.expected_fields.contains(&ExpectedField::Results));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let strict = ReviewConfig::strict();
        assert_eq!(strict.confidence_threshold, 0.80);
        assert!(strict.expected_fields.contains(&ExpectedField::Results));

        let lenient = ReviewConfig::lenient();
        assert_eq!(lenient.confidence_threshold, 0.60);
        assert!(!lenient.flag_ambiguous_abbreviations);
    }

    #[test]
    fn test_validation() {
        let config = ReviewConfig {
            confidence_threshold: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ReviewConfig {
            expected_fields: vec![ExpectedField::Date, ExpectedField::Date],
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("date"));

        let config = ReviewConfig {
            expected_fields: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ReviewConfig::strict();
        let toml_str = config.to_toml().unwrap();
        assert_eq!(ReviewConfig::from_toml(&toml_str).unwrap(), config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = "flag_conflicts = false\nexpected_fields = [\"date\", \"plan\"]";
        let config = ReviewConfig::from_toml(toml).unwrap();
        assert!(!config.flag_conflicts);
        assert_eq!(config.expected_fields, vec![ExpectedField::Date, ExpectedField::Plan]);
        assert_eq!(config.confidence_threshold, 0.70);
    }
}
