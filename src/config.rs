//! Pipeline configuration
//!
//! Every tunable knob of the extraction pipeline lives here. The struct tree
//! deserializes from YAML with serde defaults on every field, so a partial
//! file only overrides what it names.
//!
//! Three confidence limits are deliberately *not* configurable:
//! [`HIGH_CONFIDENCE`], [`LOCK_THRESHOLD`] and [`ENHANCER_CEILING`]. Callers
//! rely on them as stable contract values.

use crate::event::Field;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// A pattern result at or above this is trusted without escalation.
pub const HIGH_CONFIDENCE: f64 = 0.80;

/// Fields at or above this are never handed to the enhancer.
pub const LOCK_THRESHOLD: f64 = 0.80;

/// Upper bound on any enhancer-sourced confidence.
pub const ENHANCER_CEILING: f64 = 0.70;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration for [`crate::ExtractionPipeline`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub confidence: ConfidenceConfig,
    pub timing: TimingConfig,
    pub extraction: ExtractionConfig,
    pub enhancer: EnhancerConfig,
    pub cache: CacheConfig,
}

/// Confidence bands, weights and penalties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Lower edge of the medium band; the upper edge is [`HIGH_CONFIDENCE`].
    pub medium_floor: f64,
    /// Overall confidence below this sets `needs_confirmation`.
    pub confirmation_floor: f64,
    /// Subtracted from overall confidence once per unresolved essential field.
    pub missing_essential_penalty: f64,
    pub weights: FieldWeights,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            medium_floor: 0.40,
            confirmation_floor: 0.60,
            missing_essential_penalty: 0.10,
            weights: FieldWeights::default(),
        }
    }
}

/// Per-field weights used by the overall confidence score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub title: f64,
    pub start: f64,
    pub end: f64,
    pub location: f64,
    pub description: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            title: 0.30,
            start: 0.30,
            end: 0.15,
            location: 0.15,
            description: 0.10,
        }
    }
}

impl FieldWeights {
    /// Weight for a field. Duration never contributes directly.
    pub fn weight(&self, field: Field) -> f64 {
        match field {
            Field::Title => self.title,
            Field::Start => self.start,
            Field::End => self.end,
            Field::Location => self.location,
            Field::Description => self.description,
            Field::Duration => 0.0,
        }
    }
}

/// Deadlines for field tasks and the whole request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub field_timeout_ms: u64,
    pub pipeline_deadline_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            field_timeout_ms: 1_000,
            pipeline_deadline_ms: 5_000,
        }
    }
}

impl TimingConfig {
    pub fn field_timeout(&self) -> Duration {
        Duration::from_millis(self.field_timeout_ms)
    }

    pub fn pipeline_deadline(&self) -> Duration {
        Duration::from_millis(self.pipeline_deadline_ms)
    }
}

/// Input limits and extraction defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// End = start + this when no end or duration is stated.
    pub default_duration_minutes: i64,
    /// Allowed gap between a stated duration and end - start.
    pub duration_tolerance_minutes: i64,
    pub max_input_chars: usize,
    pub max_secondary_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: 60,
            duration_tolerance_minutes: 15,
            max_input_chars: 2_000,
            max_secondary_chars: 1_000,
        }
    }
}

/// Generative enhancement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    pub enabled: bool,
    /// Timeout for a single attempt. One retry is allowed.
    pub timeout_ms: u64,
    /// Subprocess to spawn for enhancement (program followed by args).
    pub command: Option<Vec<String>>,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 2_000,
            command: None,
        }
    }
}

impl EnhancerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
    pub ttl_secs: u64,
    /// Reference times within the same bucket share cache entries.
    pub reference_bucket_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1_024,
            ttl_secs: 3_600,
            reference_bucket_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from a YAML string and validate it.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Config with the enhancer switched off (deterministic-only output).
    pub fn deterministic() -> Self {
        let mut config = Self::default();
        config.enhancer.enabled = false;
        config
    }

    /// Reject values that would make the confidence model incoherent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.confidence;
        if !(c.medium_floor > 0.0 && c.medium_floor < HIGH_CONFIDENCE) {
            return Err(ConfigError::Invalid(format!(
                "medium_floor must be in (0, {}), got {}",
                HIGH_CONFIDENCE, c.medium_floor
            )));
        }
        if !(0.0..=1.0).contains(&c.confirmation_floor) {
            return Err(ConfigError::Invalid(format!(
                "confirmation_floor must be in [0, 1], got {}",
                c.confirmation_floor
            )));
        }
        if !(0.0..=1.0).contains(&c.missing_essential_penalty) {
            return Err(ConfigError::Invalid(format!(
                "missing_essential_penalty must be in [0, 1], got {}",
                c.missing_essential_penalty
            )));
        }

        let w = &c.weights;
        for (name, value) in [
            ("title", w.title),
            ("start", w.start),
            ("end", w.end),
            ("location", w.location),
            ("description", w.description),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "weight '{}' must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if w.title <= 0.0 || w.start <= 0.0 {
            return Err(ConfigError::Invalid(
                "essential field weights must be positive".to_string(),
            ));
        }

        if self.timing.field_timeout_ms == 0 || self.timing.pipeline_deadline_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }
        if self.enhancer.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "enhancer timeout must be non-zero".to_string(),
            ));
        }
        if let Some(command) = &self.enhancer.command {
            if command.is_empty() {
                return Err(ConfigError::Invalid(
                    "enhancer command must name a program".to_string(),
                ));
            }
        }

        let e = &self.extraction;
        if e.default_duration_minutes <= 0 || e.duration_tolerance_minutes < 0 {
            return Err(ConfigError::Invalid(
                "durations must be positive".to_string(),
            ));
        }
        if e.max_input_chars == 0 {
            return Err(ConfigError::Invalid("max_input_chars must be non-zero".to_string()));
        }

        if self.cache.capacity == 0 || self.cache.reference_bucket_secs <= 0 {
            return Err(ConfigError::Invalid(
                "cache capacity and reference bucket must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn enhancer_ceiling_sits_below_high_threshold() {
        assert!(ENHANCER_CEILING < HIGH_CONFIDENCE);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = PipelineConfig::from_yaml(
            "confidence:\n  missing_essential_penalty: 0.25\ncache:\n  capacity: 8\n",
        )
        .unwrap();

        assert_eq!(config.confidence.missing_essential_penalty, 0.25);
        assert_eq!(config.confidence.medium_floor, 0.40);
        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.cache.ttl_secs, 3_600);
    }

    #[test]
    fn rejects_floor_above_high_threshold() {
        let err = PipelineConfig::from_yaml("confidence:\n  medium_floor: 0.9\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = PipelineConfig::from_yaml("cache:\n  capacity: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "enhancer:\n  enabled: false\n  timeout_ms: 500").unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert!(!config.enhancer.enabled);
        assert_eq!(config.enhancer.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn yaml_round_trip() {
        let config = PipelineConfig::deterministic();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(PipelineConfig::from_yaml(&yaml).unwrap(), config);
    }
}
