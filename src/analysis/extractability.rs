//! Cheap per-field extractability estimates
//!
//! A lexical pre-pass over the canonical text. It predicts how confidently
//! each field is likely to resolve and by which strategy, without resolving
//! anything.

use crate::config::{ConfidenceConfig, HIGH_CONFIDENCE};
use crate::event::{Field, Source};
use crate::extract::lexicon::Cues;
use crate::extract::GrammarBackupExtractor;
use serde::Serialize;

/// Where a confidence value sits relative to the routing thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    /// At or above the high threshold: pattern alone is sufficient.
    High,
    /// Between the medium floor and the high threshold.
    Medium,
    /// Some cue exists but below the medium floor.
    Low,
    /// No cue at all.
    Absent,
}

impl ConfidenceBand {
    pub fn classify(confidence: f64, medium_floor: f64) -> Self {
        if confidence <= 0.0 {
            ConfidenceBand::Absent
        } else if confidence >= HIGH_CONFIDENCE {
            ConfidenceBand::High
        } else if confidence >= medium_floor {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

/// Predicted confidence and strategy for one field. Consumed by the planner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldExtractabilityEstimate {
    pub field: Field,
    pub predicted_confidence: f64,
    pub predicted_strategy: Option<Source>,
    pub band: ConfidenceBand,
}

#[derive(Debug, Clone)]
pub struct FieldExtractabilityAnalyzer {
    medium_floor: f64,
}

impl Default for FieldExtractabilityAnalyzer {
    fn default() -> Self {
        Self::from_config(&ConfidenceConfig::default())
    }
}

impl FieldExtractabilityAnalyzer {
    pub fn new(medium_floor: f64) -> Self {
        Self { medium_floor }
    }

    pub fn from_config(config: &ConfidenceConfig) -> Self {
        Self::new(config.medium_floor)
    }

    /// One estimate per requested field, in the order given.
    pub fn estimate(&self, text: &str, fields: &[Field]) -> Vec<FieldExtractabilityEstimate> {
        let cues = Cues::detect(text);
        let start = start_confidence(&cues);

        fields
            .iter()
            .map(|&field| {
                let predicted = match field {
                    Field::Start => start,
                    Field::Duration => {
                        if cues.duration {
                            0.9
                        } else {
                            0.0
                        }
                    }
                    Field::End => {
                        if cues.end {
                            0.9
                        } else {
                            start.min(0.8)
                        }
                    }
                    Field::Title => {
                        if cues.event {
                            0.9
                        } else if text.trim().is_empty() {
                            0.0
                        } else {
                            0.6
                        }
                    }
                    Field::Location => location_confidence(&cues),
                    Field::Description => {
                        if text.trim().is_empty() {
                            0.0
                        } else {
                            0.85
                        }
                    }
                };
                self.classify(field, predicted)
            })
            .collect()
    }

    fn classify(&self, field: Field, predicted: f64) -> FieldExtractabilityEstimate {
        let band = ConfidenceBand::classify(predicted, self.medium_floor);
        let predicted_strategy = match band {
            ConfidenceBand::High => Some(Source::Pattern),
            ConfidenceBand::Medium if GrammarBackupExtractor::supports(field) => Some(Source::Grammar),
            ConfidenceBand::Medium => Some(Source::Pattern),
            ConfidenceBand::Low => Some(Source::Enhancer),
            ConfidenceBand::Absent => None,
        };
        FieldExtractabilityEstimate {
            field,
            predicted_confidence: predicted,
            predicted_strategy,
            band,
        }
    }
}

fn start_confidence(cues: &Cues) -> f64 {
    if cues.time && cues.date {
        0.9
    } else if cues.time || cues.date {
        0.85
    } else if cues.bare_hour || cues.period {
        0.6
    } else if cues.vague {
        0.3
    } else {
        0.0
    }
}

fn location_confidence(cues: &Cues) -> f64 {
    if cues.online || (cues.place && cues.venue_keyword) {
        0.9
    } else if cues.place {
        0.7
    } else if cues.venue_keyword {
        0.4
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band_of(estimates: &[FieldExtractabilityEstimate], field: Field) -> ConfidenceBand {
        estimates.iter().find(|e| e.field == field).map(|e| e.band).unwrap()
    }

    #[test]
    fn explicit_text_is_high_everywhere() {
        let analyzer = FieldExtractabilityAnalyzer::default();
        let estimates = analyzer.estimate(
            "Team meeting tomorrow at 2:00pm in Conference Room A",
            &Field::ALL,
        );

        assert_eq!(band_of(&estimates, Field::Start), ConfidenceBand::High);
        assert_eq!(band_of(&estimates, Field::Title), ConfidenceBand::High);
        assert_eq!(band_of(&estimates, Field::Location), ConfidenceBand::High);
        assert_eq!(band_of(&estimates, Field::End), ConfidenceBand::High);
        assert_eq!(band_of(&estimates, Field::Duration), ConfidenceBand::Absent);
    }

    #[test]
    fn missing_cues_are_absent() {
        let analyzer = FieldExtractabilityAnalyzer::default();
        let estimates = analyzer.estimate("lunch with sarah", &[Field::Start, Field::Location]);

        assert_eq!(band_of(&estimates, Field::Start), ConfidenceBand::Absent);
        assert_eq!(band_of(&estimates, Field::Location), ConfidenceBand::Absent);
        assert!(estimates.iter().all(|e| e.predicted_strategy.is_none()));
    }

    #[test]
    fn vague_start_is_routed_to_enhancer() {
        let analyzer = FieldExtractabilityAnalyzer::default();
        let estimates = analyzer.estimate("Dinner with the team sometime next week", &[Field::Start]);

        assert_eq!(estimates[0].band, ConfidenceBand::Low);
        assert_eq!(estimates[0].predicted_strategy, Some(Source::Enhancer));
    }

    #[test]
    fn bare_hour_is_routed_to_grammar() {
        let analyzer = FieldExtractabilityAnalyzer::default();
        let estimates = analyzer.estimate("coffee at 3", &[Field::Start]);

        assert_eq!(estimates[0].band, ConfidenceBand::Medium);
        assert_eq!(estimates[0].predicted_strategy, Some(Source::Grammar));
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(ConfidenceBand::classify(0.8, 0.4), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::classify(0.4, 0.4), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::classify(0.39, 0.4), ConfidenceBand::Low);
        assert_eq!(ConfidenceBand::classify(0.0, 0.4), ConfidenceBand::Absent);
    }
}
