//! The aggregated calendar event and the record of stages that produced it

use super::field::Source;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A structured calendar event extracted from free text.
///
/// Ephemeral per request; only the result cache holds on to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub title: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub location: Option<String>,
    pub description: String,
    pub all_day: bool,
    pub timezone: String,
    pub overall_confidence: f64,
    pub needs_confirmation: bool,
    pub warnings: Vec<String>,
}

impl Event {
    /// An event with nothing resolved.
    pub fn empty(timezone: impl Into<String>) -> Self {
        Self {
            title: None,
            start: None,
            end: None,
            location: None,
            description: String::new(),
            all_day: false,
            timezone: timezone.into(),
            overall_confidence: 0.0,
            needs_confirmation: true,
            warnings: Vec::new(),
        }
    }
}

/// Stages that actually ran for a request, in first-run order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsingPath {
    stages: Vec<Source>,
}

impl ParsingPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a stage ran. Repeats are ignored.
    pub fn record(&mut self, stage: Source) {
        if !self.stages.contains(&stage) {
            self.stages.push(stage);
        }
    }

    pub fn extend(&mut self, other: &ParsingPath) {
        for stage in &other.stages {
            self.record(*stage);
        }
    }

    pub fn stages(&self) -> &[Source] {
        &self.stages
    }

    pub fn contains(&self, stage: Source) -> bool {
        self.stages.contains(&stage)
    }

    /// `pattern_only`, `pattern+grammar`, `pattern+grammar+enhancer`, ...
    pub fn label(&self) -> String {
        match self.stages.as_slice() {
            [] => "none".to_string(),
            [Source::Pattern] => "pattern_only".to_string(),
            stages => {
                let mut sorted = stages.to_vec();
                sorted.sort();
                sorted
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join("+")
            }
        }
    }
}

impl Serialize for ParsingPath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_alone_is_pattern_only() {
        let mut path = ParsingPath::new();
        path.record(Source::Pattern);
        path.record(Source::Pattern);
        assert_eq!(path.label(), "pattern_only");
    }

    #[test]
    fn label_is_stage_ordered() {
        let mut path = ParsingPath::new();
        path.record(Source::Enhancer);
        path.record(Source::Pattern);
        path.record(Source::Grammar);
        assert_eq!(path.label(), "pattern+grammar+enhancer");
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"pattern+grammar+enhancer\"");
    }

    #[test]
    fn empty_event_needs_confirmation() {
        let event = Event::empty("UTC");
        assert!(event.needs_confirmation);
        assert_eq!(event.overall_confidence, 0.0);
    }
}
