//! Pipeline configuration

use crate::{PipelineError, Result};
use medrecon_domain::ConfidenceConfig;
use medrecon_reconciler::ReconcilerConfig;
use medrecon_review::ReviewConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the whole pipeline
///
/// Each stage has its own table in TOML:
///
/// ```toml
/// page_workers = 4
/// partial_results_on_limit = true
///
/// [confidence]
/// base = 0.70
///
/// [reconciler]
/// fuzzy_threshold = 0.85
/// max_mentions_per_category = 500
///
/// [review]
/// confidence_threshold = 0.70
/// ```
///
/// # Examples
///
/// ```
/// use medrecon_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::from_toml("[reconciler]\nfuzzy_threshold = 0.9\n").unwrap();
/// assert_eq!(config.reconciler.fuzzy_threshold, 0.9);
/// assert_eq!(config.review.confidence_threshold, 0.70);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Blocking tasks used to score pages on the concurrent path
    /// Default: 4
    #[serde(default = "default_page_workers")]
    pub page_workers: usize,

    /// Attach already reconciled visits to a resource limit error
    /// Default: true
    #[serde(default = "default_partial_results")]
    pub partial_results_on_limit: bool,

    /// Page scoring
    #[serde(default)]
    pub confidence: ConfidenceConfig,

    /// Reconciliation
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Review flags and data quality
    #[serde(default)]
    pub review: ReviewConfig,
}

fn default_page_workers() -> usize {
    4
}

fn default_partial_results() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_workers: default_page_workers(),
            partial_results_on_limit: default_partial_results(),
            confidence: ConfidenceConfig::default(),
            reconciler: ReconcilerConfig::default(),
            review: ReviewConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Fewer fuzzy merges and a higher review threshold
    pub fn strict() -> Self {
        Self {
            reconciler: ReconcilerConfig::strict(),
            review: ReviewConfig::strict(),
            ..Self::default()
        }
    }

    /// More fuzzy merges and a lower review threshold
    pub fn lenient() -> Self {
        Self {
            reconciler: ReconcilerConfig::lenient(),
            review: ReviewConfig::lenient(),
            ..Self::default()
        }
    }

    /// Validate every stage's configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.confidence.validate().map_err(|e| format!("confidence: {}", e))?;
        self.reconciler.validate().map_err(|e| format!("reconciler: {}", e))?;
        self.review.validate().map_err(|e| format!("review: {}", e))?;
        if self.page_workers == 0 {
            return Err("page_workers must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> std::result::Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }

    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content).map_err(PipelineError::Config)?;
        config.validate().map_err(PipelineError::Config)?;
        tracing::debug!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.page_workers, 4);
        assert!(config.partial_results_on_limit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert!(PipelineConfig::strict().reconciler.fuzzy_threshold > 0.85);
        assert!(PipelineConfig::lenient().review.confidence_threshold < 0.70);
    }

    #[test]
    fn test_validation_names_stage() {
        let mut config = PipelineConfig::default();
        config.reconciler.fuzzy_threshold = 2.0;
        assert!(config.validate().unwrap_err().starts_with("reconciler:"));

        let config = PipelineConfig {
            page_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = PipelineConfig::strict();
        let toml_str = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml(&toml_str).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir()
            .join(format!("medrecon-pipeline-{}.toml", std::process::id()));
        std::fs::write(&path, "page_workers = 2\n[review]\nflag_conflicts = false\n").unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.page_workers, 2);
        assert!(!config.review.flag_conflicts);

        assert!(matches!(
            PipelineConfig::from_file("/nonexistent/medrecon.toml"),
            Err(PipelineError::Config(_))
        ));
    }
}
