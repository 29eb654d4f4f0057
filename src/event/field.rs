//! Field identifiers, values and per-field extraction results

use crate::config::ENHANCER_CEILING;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Longest duration any stage may report: one leap year.
pub const MAX_DURATION_MINUTES: i64 = 366 * 24 * 60;

/// A named attribute of the target event.
///
/// Variant order is dependency order: start must be known before duration,
/// duration before end. Title, location and description are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Start,
    /// Internal: only used to derive `End`, never an Event attribute.
    Duration,
    End,
    Title,
    Location,
    Description,
}

impl Field {
    /// All fields in dependency order.
    pub const ALL: [Field; 6] = [
        Field::Start,
        Field::Duration,
        Field::End,
        Field::Title,
        Field::Location,
        Field::Description,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Start => "start",
            Field::Duration => "duration",
            Field::End => "end",
            Field::Title => "title",
            Field::Location => "location",
            Field::Description => "description",
        }
    }

    /// Title and start: without them the event is not actionable.
    pub fn is_essential(&self) -> bool {
        matches!(self, Field::Title | Field::Start)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Field::Start | Field::Duration | Field::End)
    }

    /// Whether this field appears on the final [`super::Event`].
    pub fn is_event_attribute(&self) -> bool {
        !matches!(self, Field::Duration)
    }

    /// Fields that must be resolved before this one.
    pub fn dependencies(&self) -> &'static [Field] {
        match self {
            Field::Duration => &[Field::Start],
            Field::End => &[Field::Start, Field::Duration],
            _ => &[],
        }
    }

    /// Check that a value has the right shape for this field.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Field::Start | Field::End, FieldValue::DateTime(_) | FieldValue::Date(_)) => true,
            (Field::Duration, FieldValue::Minutes(m)) => (1..=MAX_DURATION_MINUTES).contains(m),
            (Field::Title | Field::Location | Field::Description, FieldValue::Text(t)) => {
                !t.trim().is_empty()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Field::Start),
            "duration" => Ok(Field::Duration),
            "end" => Ok(Field::End),
            "title" => Ok(Field::Title),
            "location" => Ok(Field::Location),
            "description" => Ok(Field::Description),
            other => Err(format!("unknown field '{}'", other)),
        }
    }
}

/// Which extraction stage produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Pattern,
    Grammar,
    Enhancer,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Pattern => "pattern",
            Source::Grammar => "grammar",
            Source::Enhancer => "enhancer",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed field value.
///
/// Date-times are local wall-clock values in the request timezone; the
/// aggregator attaches the offset when building the event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    DateTime(NaiveDateTime),
    /// A date with no time of day (all-day event).
    Date(NaiveDate),
    Minutes(i64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Date-time view; a bare date reads as local midnight.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            FieldValue::DateTime(dt) => Some(*dt),
            FieldValue::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            _ => None,
        }
    }

    pub fn as_minutes(&self) -> Option<i64> {
        match self {
            FieldValue::Minutes(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<ChronoDuration> {
        self.as_minutes().and_then(ChronoDuration::try_minutes)
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, FieldValue::Date(_))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(t) => f.write_str(t),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Minutes(m) => write!(f, "{} min", m),
        }
    }
}

/// Byte offsets into the normalized source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of resolving one field.
///
/// Created once per field per request. Confidence is clamped to `[0, 1]` on
/// construction, and enhancer results are further capped at
/// [`ENHANCER_CEILING`], so no code path can produce an out-of-contract value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    pub field: Field,
    pub value: FieldValue,
    pub source: Source,
    confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<FieldValue>,
    /// Telemetry only; excluded from the serialized form.
    #[serde(skip)]
    pub processing_time: Duration,
}

impl FieldResult {
    pub fn new(field: Field, value: FieldValue, source: Source, confidence: f64) -> Self {
        Self {
            field,
            value,
            source,
            confidence: calibrate(source, confidence),
            span: None,
            alternatives: Vec::new(),
            processing_time: Duration::ZERO,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<FieldValue>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn with_processing_time(mut self, elapsed: Duration) -> Self {
        self.processing_time = elapsed;
        self
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Scale confidence down (used by cross-field validation).
    pub fn downgrade(&mut self, factor: f64) {
        self.confidence = calibrate(self.source, self.confidence * factor);
    }
}

fn calibrate(source: Source, confidence: f64) -> f64 {
    let clamped = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    match source {
        Source::Enhancer => clamped.min(ENHANCER_CEILING),
        Source::Pattern | Source::Grammar => clamped,
    }
}

/// Per-request result slots, one per field, iterated in dependency order.
pub type FieldMap = BTreeMap<Field, FieldResult>;

/// Confidence for a field, zero when unresolved.
pub fn confidence_of(results: &FieldMap, field: Field) -> f64 {
    results.get(&field).map(|r| r.confidence()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order_is_dependency_order() {
        let mut fields = vec![Field::Title, Field::End, Field::Start, Field::Duration];
        fields.sort();
        assert_eq!(fields, vec![Field::Start, Field::Duration, Field::End, Field::Title]);
    }

    #[test]
    fn field_parses_case_insensitively() {
        assert_eq!("Start".parse::<Field>().unwrap(), Field::Start);
        assert_eq!(" location ".parse::<Field>().unwrap(), Field::Location);
        assert!("venue".parse::<Field>().is_err());
    }

    #[test]
    fn confidence_is_clamped() {
        let high = FieldResult::new(Field::Title, FieldValue::Text("x".into()), Source::Pattern, 1.7);
        let nan = FieldResult::new(Field::Title, FieldValue::Text("x".into()), Source::Grammar, f64::NAN);
        assert_eq!(high.confidence(), 1.0);
        assert_eq!(nan.confidence(), 0.0);
    }

    #[test]
    fn enhancer_confidence_is_capped() {
        let result = FieldResult::new(
            Field::Location,
            FieldValue::Text("Cafe".into()),
            Source::Enhancer,
            0.99,
        );
        assert_eq!(result.confidence(), ENHANCER_CEILING);
    }

    #[test]
    fn accepts_checks_value_shape() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();
        assert!(Field::Start.accepts(&FieldValue::Date(date)));
        assert!(!Field::Start.accepts(&FieldValue::Text("tomorrow".into())));
        assert!(!Field::Duration.accepts(&FieldValue::Minutes(0)));
        assert!(Field::Duration.accepts(&FieldValue::Minutes(MAX_DURATION_MINUTES)));
        assert!(!Field::Duration.accepts(&FieldValue::Minutes(i64::MAX)));
        assert!(!Field::Title.accepts(&FieldValue::Text("   ".into())));
    }

    #[test]
    fn processing_time_is_not_serialized() {
        let a = FieldResult::new(Field::Title, FieldValue::Text("x".into()), Source::Pattern, 0.9)
            .with_processing_time(Duration::from_millis(3));
        let b = FieldResult::new(Field::Title, FieldValue::Text("x".into()), Source::Pattern, 0.9)
            .with_processing_time(Duration::from_millis(9));

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn span_overlap() {
        assert!(Span::new(0, 5).overlaps(&Span::new(4, 8)));
        assert!(!Span::new(0, 5).overlaps(&Span::new(5, 8)));
    }
}
