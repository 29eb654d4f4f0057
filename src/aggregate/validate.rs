//! Cross-field consistency checks
//!
//! A pure function over the per-request result map. It never adds values,
//! only drops or downgrades them, and reports what it did as warnings.

use crate::event::{Field, FieldMap};

/// Factor applied to the weaker side of a duration conflict.
const CONFLICT_DOWNGRADE: f64 = 0.5;

/// Enforce start ≤ end and duration agreement.
///
/// - An end before the start is removed.
/// - When the stated duration and `end - start` disagree by more than
///   `tolerance_minutes`, the lower-confidence of end and duration is
///   downgraded. Ties downgrade the duration.
pub fn validate_cross_fields(results: &mut FieldMap, tolerance_minutes: i64) -> Vec<String> {
    let mut warnings = Vec::new();

    let start = results.get(&Field::Start).and_then(|r| r.value.as_datetime());
    let end = results.get(&Field::End).and_then(|r| r.value.as_datetime());

    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            results.remove(&Field::End);
            warnings.push(format!(
                "end time {} precedes start {}; end discarded",
                end.format("%Y-%m-%d %H:%M"),
                start.format("%Y-%m-%d %H:%M")
            ));
            return warnings;
        }

        let stated = results
            .get(&Field::Duration)
            .and_then(|r| r.value.as_minutes().map(|m| (m, r.confidence())));
        let end_confidence = results.get(&Field::End).map(|r| r.confidence());

        if let (Some((minutes, duration_confidence)), Some(end_confidence)) = (stated, end_confidence) {
            let implied = (end - start).num_minutes();
            if (implied - minutes).abs() > tolerance_minutes {
                let weaker = if end_confidence < duration_confidence {
                    Field::End
                } else {
                    Field::Duration
                };
                if let Some(result) = results.get_mut(&weaker) {
                    result.downgrade(CONFLICT_DOWNGRADE);
                }
                warnings.push(format!(
                    "stated duration of {} min conflicts with end time ({} min after start); {} confidence lowered",
                    minutes, implied, weaker
                ));
            }
        }
    }

    warnings
}
