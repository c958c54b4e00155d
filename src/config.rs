//! Analysis configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::inference::StatisticsScope;
use crate::observer::CoherenceAlgorithm;

/// When coherence checking runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckingMode {
    /// From the first event on.
    #[default]
    Always,
    /// Only once the trace reported lost events.
    AfterFirstLostEvent,
}

/// Analysis configuration.
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes:
///
/// ```
/// use tracecoherence::{AnalysisConfig, CoherenceAlgorithm};
///
/// let config = AnalysisConfig::from_json_str(r#"{"algorithm": "naive"}"#).unwrap();
/// assert_eq!(config.algorithm, CoherenceAlgorithm::Naive);
/// assert!(!config.parallel_inference);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Coherence checker used by every FSM.
    pub algorithm: CoherenceAlgorithm,
    /// Counters consulted when choosing and weighting transitions.
    pub statistics_scope: StatisticsScope,
    /// When incoherences start being detected.
    pub checking: CheckingMode,
    /// Run inference for different FSMs on worker threads.
    pub parallel_inference: bool,
    /// Maximum number of inference worker threads.
    pub inference_workers: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            algorithm: CoherenceAlgorithm::Optimized,
            statistics_scope: StatisticsScope::LocalWithGlobalFallback,
            checking: CheckingMode::Always,
            parallel_inference: false,
            inference_workers: 4,
        }
    }
}

impl AnalysisConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for malformed JSON, unknown
    /// fields or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if the file cannot be read or
    /// does not hold a valid configuration.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` when `inference_workers` is 0.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.inference_workers == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "inference_workers must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Whether checking is on before any lost-events marker was seen.
    #[must_use]
    pub const fn checks_from_start(&self) -> bool {
        matches!(self.checking, CheckingMode::Always)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.algorithm, CoherenceAlgorithm::Optimized);
        assert_eq!(config.statistics_scope, StatisticsScope::LocalWithGlobalFallback);
        assert!(config.checks_from_start());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = AnalysisConfig::from_json_str(
            r#"{"checking": "after_first_lost_event", "statistics_scope": "global", "parallel_inference": true}"#,
        )
        .unwrap();
        assert_eq!(config.checking, CheckingMode::AfterFirstLostEvent);
        assert_eq!(config.statistics_scope, StatisticsScope::Global);
        assert!(config.parallel_inference);
        assert_eq!(config.inference_workers, 4);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            AnalysisConfig::from_json_str("{not json"),
            Err(ValidationError::InvalidConfig { .. })
        ));
        assert!(AnalysisConfig::from_json_str(r#"{"algorithm": "quantum"}"#).is_err());
        assert!(AnalysisConfig::from_json_str(r#"{"inference_workers": 0}"#).is_err());
        assert!(AnalysisConfig::from_json_str(r#"{"workers": 2}"#).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = AnalysisConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(format!("{err}").contains("cannot read"));
    }
}
