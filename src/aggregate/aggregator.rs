//! Merge per-field results into one event

use super::validate::validate_cross_fields;
use crate::config::{ConfidenceConfig, PipelineConfig};
use crate::event::{Event, Field, FieldMap, FieldValue};
use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use tracing::debug;

/// Output of aggregation: the event plus the (validated) results behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub event: Event,
    pub field_results: FieldMap,
    /// Requested fields the caller should review, in field order.
    pub unconfirmed_fields: Vec<Field>,
}

/// Combines field results, scores them and validates cross-field consistency.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    confidence: ConfidenceConfig,
    duration_tolerance_minutes: i64,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl ResultAggregator {
    pub fn new(confidence: ConfidenceConfig, duration_tolerance_minutes: i64) -> Self {
        Self {
            confidence,
            duration_tolerance_minutes,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.confidence.clone(),
            config.extraction.duration_tolerance_minutes,
        )
    }

    /// Build the event.
    ///
    /// `flagged` holds fields an earlier stage gave up on (timeouts, failed
    /// enhancement); they are always reported as unconfirmed. `warnings` are
    /// carried over ahead of any validation warnings.
    pub fn aggregate(
        &self,
        mut results: FieldMap,
        requested: &[Field],
        flagged: &BTreeSet<Field>,
        offset: FixedOffset,
        timezone: &str,
        mut warnings: Vec<String>,
    ) -> Aggregation {
        warnings.extend(validate_cross_fields(
            &mut results,
            self.duration_tolerance_minutes,
        ));

        let overall = overall_confidence(&results, requested, &self.confidence);
        let missing_essential = requested
            .iter()
            .any(|f| f.is_essential() && !results.contains_key(f));
        let needs_confirmation = overall < self.confidence.confirmation_floor || missing_essential;

        let unconfirmed_fields: Vec<Field> = requested
            .iter()
            .copied()
            .filter(|f| f.is_event_attribute())
            .filter(|f| match results.get(f) {
                Some(r) => flagged.contains(f) || r.confidence() < self.confidence.medium_floor,
                None => flagged.contains(f) || f.is_essential(),
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let start_value = results.get(&Field::Start).map(|r| &r.value);
        let all_day = start_value.is_some_and(|v| v.is_all_day());

        let zone = timezone.parse::<Tz>().ok();
        let mut event = Event::empty(timezone);
        event.title = text_of(&results, Field::Title);
        event.start = start_value.and_then(|v| attach(v, offset, zone));
        event.end = results.get(&Field::End).and_then(|r| attach(&r.value, offset, zone));
        event.location = text_of(&results, Field::Location);
        event.description = text_of(&results, Field::Description).unwrap_or_default();
        event.all_day = all_day;
        event.overall_confidence = overall;
        event.needs_confirmation = needs_confirmation;
        event.warnings = warnings;

        debug!(
            overall = overall,
            needs_confirmation = needs_confirmation,
            resolved = results.len(),
            "aggregated event"
        );

        Aggregation {
            event,
            field_results: results,
            unconfirmed_fields,
        }
    }
}

/// Weighted mean confidence over requested attributes, minus a penalty per
/// unresolved essential field, clamped to `[0, 1]`.
///
/// Unresolved optional fields are left out of the mean rather than counted as
/// zero; unresolved essential fields count as zero and are also penalised.
pub fn overall_confidence(results: &FieldMap, requested: &[Field], config: &ConfidenceConfig) -> f64 {
    let fields: BTreeSet<Field> = requested.iter().copied().collect();

    let mut weighted = 0.0;
    let mut total = 0.0;
    let mut missing = 0u32;

    for field in fields {
        let weight = config.weights.weight(field);
        match results.get(&field) {
            Some(result) => {
                weighted += weight * result.confidence();
                total += weight;
            }
            None if field.is_essential() => {
                total += weight;
                missing += 1;
            }
            None => {}
        }
    }

    if total <= 0.0 {
        return 0.0;
    }

    let score = weighted / total - config.missing_essential_penalty * f64::from(missing);
    score.clamp(0.0, 1.0)
}

fn text_of(results: &FieldMap, field: Field) -> Option<String> {
    results
        .get(&field)
        .and_then(|r| r.value.as_text())
        .map(str::to_string)
}

/// Pin a wall-clock value to an instant. A named IANA zone supplies the
/// offset in force at that instant; otherwise the reference offset is used.
fn attach(value: &FieldValue, offset: FixedOffset, zone: Option<Tz>) -> Option<DateTime<FixedOffset>> {
    let local = value.as_datetime()?;
    let Some(zone) = zone else {
        return local.and_local_timezone(offset).single();
    };
    // Ambiguous times take the earlier reading; skipped times move past the gap.
    zone.from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            let shifted = local.checked_add_signed(Duration::hours(1))?;
            zone.from_local_datetime(&shifted).earliest()
        })
        .map(|t| t.fixed_offset())
}
