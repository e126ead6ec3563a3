//! Configuration for the reconciliation engine

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default similarity a fuzzy pair must reach
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

/// Default cap on mentions per category per visit
pub const DEFAULT_MAX_MENTIONS: usize = 500;

/// Default relative tolerance for numeric values (1 %)
pub const DEFAULT_NUMERIC_TOLERANCE: f64 = 0.01;

/// Configuration for the Reconciler
///
/// # Examples
///
/// ```
/// use medrecon_reconciler::ReconcilerConfig;
///
/// let config = ReconcilerConfig::default();
/// assert_eq!(config.fuzzy_threshold, 0.85);
///
/// // Fewer fuzzy merges
/// let config = ReconcilerConfig::strict();
/// assert!(config.fuzzy_threshold > 0.85);
///
/// // More fuzzy merges
/// let config = ReconcilerConfig::lenient();
/// assert!(config.fuzzy_threshold < 0.85);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Minimum normalized Levenshtein similarity for a fuzzy candidate pair
    /// Default: 0.85
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    /// Mentions allowed in one category of one visit
    /// Default: 500
    #[serde(default = "default_max_mentions")]
    pub max_mentions_per_category: usize,

    /// Relative tolerance when comparing numeric values after unit normalization
    /// Default: 0.01
    #[serde(default = "default_numeric_tolerance")]
    pub numeric_tolerance: f64,

    /// Optional wall-clock budget per visit; the fuzzy tier stops when it runs out
    #[serde(default)]
    pub deadline_ms: Option<u64>,

    /// Run the fuzzy tier at all
    /// Default: true
    #[serde(default = "default_enable_fuzzy")]
    pub enable_fuzzy: bool,
}

fn default_fuzzy_threshold() -> f64 {
    DEFAULT_FUZZY_THRESHOLD
}

fn default_max_mentions() -> usize {
    DEFAULT_MAX_MENTIONS
}

fn default_numeric_tolerance() -> f64 {
    DEFAULT_NUMERIC_TOLERANCE
}

fn default_enable_fuzzy() -> bool {
    true
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            max_mentions_per_category: DEFAULT_MAX_MENTIONS,
            numeric_tolerance: DEFAULT_NUMERIC_TOLERANCE,
            deadline_ms: None,
            enable_fuzzy: true,
        }
    }
}

impl ReconcilerConfig {
    /// Conservative matching: higher threshold, tighter tolerance
    pub fn strict() -> Self {
        Self {
            fuzzy_threshold: 0.92,
            numeric_tolerance: 0.0,
            ..Self::default()
        }
    }

    /// Permissive matching: lower threshold, looser tolerance
    pub fn lenient() -> Self {
        Self {
            fuzzy_threshold: 0.80,
            numeric_tolerance: 0.02,
            ..Self::default()
        }
    }

    /// Deadline as a Duration
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(format!(
                "fuzzy_threshold must be between 0.0 and 1.0, got {}",
                self.fuzzy_threshold
            ));
        }
        if self.max_mentions_per_category == 0 {
            return Err("max_mentions_per_category must be greater than 0".to_string());
        }
        if !(0.0..1.0).contains(&self.numeric_tolerance) {
            return Err(format!(
                "numeric_tolerance must be in [0.0, 1.0), got {}",
                self.numeric_tolerance
            ));
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
        let config = ReconcilerConfig::default();
        assert_eq!(config.fuzzy_threshold, 0.85);
        assert_eq!(config.max_mentions_per_category, 500);
        assert_eq!(config.numeric_tolerance, 0.01);
        assert_eq!(config.deadline(), None);
        assert!(config.enable_fuzzy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_validate() {
        assert!(ReconcilerConfig::strict().validate().is_ok());
        assert!(ReconcilerConfig::lenient().validate().is_ok());
        assert!(
            ReconcilerConfig::strict().fuzzy_threshold > ReconcilerConfig::lenient().fuzzy_threshold
        );
    }

    #[test]
    fn test_invalid_values() {
        let config = ReconcilerConfig {
            fuzzy_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ReconcilerConfig {
            max_mentions_per_category: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_partial_uses_defaults() {
        let config =
            ReconcilerConfig::from_toml("fuzzy_threshold = 0.9\ndeadline_ms = 250\n").unwrap();
        assert_eq!(config.fuzzy_threshold, 0.9);
        assert_eq!(config.max_mentions_per_category, 500);
        assert_eq!(config.deadline(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ReconcilerConfig::lenient();
        let toml_str = config.to_toml().unwrap();
        let parsed = ReconcilerConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }
}
