//! Bounded generative enhancement for residual fields

use crate::config::{EnhancerConfig, LOCK_THRESHOLD};
use crate::event::{Field, FieldMap, FieldResult, FieldValue, Source, Span};
use crate::extract::{Candidate, CandidateRequest, CandidateSource, SourceError};
use crate::pipeline::CancellationToken;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Calls made per enhancement: the first try plus one retry.
const MAX_ATTEMPTS: u32 = 2;

/// Why an enhancement produced nothing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnhancerFailure {
    #[error("enhancement unavailable: {0}")]
    Unavailable(String),
    #[error("enhancement unavailable: timed out after {attempts} attempts")]
    TimedOut { attempts: u32 },
    #[error("enhancement discarded: schema violation ({0})")]
    SchemaViolation(String),
    #[error("enhancement abandoned: request cancelled")]
    Cancelled,
}

/// What the enhancer is allowed to see.
///
/// Only constructible through [`ResidualInput::build`], which drops every
/// field at or above the lock threshold and blanks out the text those fields
/// were read from. There is no way to hand the enhancer a trusted field.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualInput {
    text: String,
    fields: Vec<Field>,
    reference: NaiveDateTime,
    context: BTreeMap<Field, FieldValue>,
}

impl ResidualInput {
    /// Returns `None` when nothing is left to enhance.
    pub fn build(
        text: &str,
        reference: NaiveDateTime,
        wanted: &[Field],
        resolved: &FieldMap,
    ) -> Option<Self> {
        let locked: Vec<&FieldResult> = resolved
            .values()
            .filter(|r| r.confidence() >= LOCK_THRESHOLD)
            .collect();

        let fields: Vec<Field> = wanted
            .iter()
            .copied()
            .filter(|f| !locked.iter().any(|r| r.field == *f))
            .collect();
        if fields.is_empty() {
            return None;
        }

        // Same-length blanking keeps candidate spans aligned with the source.
        let mut masked = text.to_string();
        for result in &locked {
            if let Some(span) = result.span {
                if span.len() < text.len() && text.is_char_boundary(span.start) && text.is_char_boundary(span.end) {
                    masked.replace_range(span.start..span.end, &" ".repeat(span.len()));
                }
            }
        }

        let context = fields
            .iter()
            .flat_map(|f| f.dependencies())
            .filter_map(|dep| resolved.get(dep))
            .filter(|r| r.confidence() >= LOCK_THRESHOLD)
            .map(|r| (r.field, r.value.clone()))
            .collect();

        Some(Self {
            text: masked,
            fields,
            reference,
            context,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn to_request(&self) -> CandidateRequest {
        CandidateRequest::new(self.text.clone(), self.fields.clone(), self.reference)
            .with_context(self.context.clone())
    }
}

/// One guarded call to a generative [`CandidateSource`].
///
/// Fixed timeout, exactly one retry on timeout or transient failure, strict
/// schema check, confidence capped by [`FieldResult::new`].
pub struct GuardedEnhancer {
    source: Arc<dyn CandidateSource>,
    timeout: Duration,
}

impl GuardedEnhancer {
    pub fn new(source: Arc<dyn CandidateSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub fn from_config(source: Arc<dyn CandidateSource>, config: &EnhancerConfig) -> Self {
        Self::new(source, config.timeout())
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Run the enhancement. Never panics and never touches anything outside
    /// `input`; the caller turns a failure into a warning.
    pub async fn enhance(
        &self,
        input: &ResidualInput,
        cancel: &CancellationToken,
    ) -> Result<Vec<FieldResult>, EnhancerFailure> {
        let request = input.to_request();
        let timeout_ms = self.timeout.as_millis() as u64;
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(EnhancerFailure::Cancelled);
            }
            attempts += 1;
            let started = Instant::now();
            debug!(
                source = self.source.name(),
                attempt = attempts,
                fields = ?input.fields,
                "calling enhancer"
            );

            let error = match tokio::time::timeout(self.timeout, self.source.candidates(&request)).await {
                Ok(Ok(candidates)) => return validate(input, candidates, started.elapsed()),
                Ok(Err(e)) => e,
                Err(_) => SourceError::Timeout(timeout_ms),
            };
            warn!(source = self.source.name(), attempt = attempts, error = %error, "enhancer attempt failed");

            if error.is_retryable() && attempts < MAX_ATTEMPTS {
                continue;
            }
            return Err(match error {
                SourceError::InvalidResponse(reason) => EnhancerFailure::SchemaViolation(reason),
                SourceError::Timeout(_) => EnhancerFailure::TimedOut { attempts },
                SourceError::Transient(reason) | SourceError::Unavailable(reason) => {
                    EnhancerFailure::Unavailable(reason)
                }
            });
        }
    }
}

/// All-or-nothing schema check.
fn validate(
    input: &ResidualInput,
    candidates: Vec<Candidate>,
    elapsed: Duration,
) -> Result<Vec<FieldResult>, EnhancerFailure> {
    let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        if !input.fields.contains(&candidate.field) {
            return Err(EnhancerFailure::SchemaViolation(format!(
                "field '{}' was not requested",
                candidate.field
            )));
        }
        if !seen.insert(candidate.field) {
            return Err(EnhancerFailure::SchemaViolation(format!(
                "field '{}' returned twice",
                candidate.field
            )));
        }
        if !candidate.field.accepts(&candidate.value) {
            return Err(EnhancerFailure::SchemaViolation(format!(
                "value for '{}' has the wrong type",
                candidate.field
            )));
        }
        if !candidate.confidence.is_finite() || !(0.0..=1.0).contains(&candidate.confidence) {
            return Err(EnhancerFailure::SchemaViolation(format!(
                "confidence for '{}' is outside [0, 1]",
                candidate.field
            )));
        }

        let span = candidate
            .span
            .filter(|s: &Span| s.start <= s.end && s.end <= input.text.len());
        let mut result = FieldResult::new(candidate.field, candidate.value, Source::Enhancer, candidate.confidence)
            .with_processing_time(elapsed);
        result.span = span;
        results.push(result);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENHANCER_CEILING;
    use crate::extract::MockSource;
    use chrono::NaiveDate;

    fn reference() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 12)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn tuesday_dinner() -> FieldValue {
        FieldValue::DateTime(NaiveDate::from_ymd_opt(2025, 3, 18).unwrap().and_hms_opt(19, 0, 0).unwrap())
    }

    fn input(fields: &[Field]) -> ResidualInput {
        ResidualInput::build("Dinner with the team sometime next week", reference(), fields, &FieldMap::new()).unwrap()
    }

    fn enhancer(source: MockSource) -> (GuardedEnhancer, Arc<MockSource>) {
        let source = Arc::new(source);
        let guarded = GuardedEnhancer::new(source.clone(), Duration::from_millis(50));
        (guarded, source)
    }

    #[test]
    fn locked_fields_never_reach_the_enhancer() {
        let text = "Team meeting sometime";
        let mut resolved = FieldMap::new();
        resolved.insert(
            Field::Title,
            FieldResult::new(Field::Title, FieldValue::Text("Team meeting".into()), Source::Pattern, 0.9)
                .with_span(Span::new(0, 12)),
        );

        let residual = ResidualInput::build(text, reference(), &[Field::Title, Field::Start], &resolved).unwrap();
        assert_eq!(residual.fields(), &[Field::Start]);
        assert!(!residual.text().contains("Team meeting"));
        assert_eq!(residual.text().len(), text.len());

        assert!(ResidualInput::build(text, reference(), &[Field::Title], &resolved).is_none());
    }

    #[tokio::test]
    async fn confidence_is_capped_at_ceiling() {
        let (guarded, _) = enhancer(MockSource::responding(vec![Candidate::new(
            Field::Start,
            tuesday_dinner(),
            0.99,
        )]));

        let out = guarded.enhance(&input(&[Field::Start]), &CancellationToken::new()).await.unwrap();
        assert_eq!(out[0].source, Source::Enhancer);
        assert_eq!(out[0].confidence(), ENHANCER_CEILING);
    }

    #[tokio::test]
    async fn unrequested_field_discards_everything() {
        let (guarded, _) = enhancer(MockSource::responding(vec![
            Candidate::new(Field::Start, tuesday_dinner(), 0.6),
            Candidate::new(Field::Location, FieldValue::Text("Cafe".into()), 0.6),
        ]));

        let err = guarded.enhance(&input(&[Field::Start]), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EnhancerFailure::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn wrong_type_discards_everything() {
        let (guarded, _) = enhancer(MockSource::responding(vec![Candidate::new(
            Field::Start,
            FieldValue::Text("next tuesday".into()),
            0.6,
        )]));

        let err = guarded.enhance(&input(&[Field::Start]), &CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().starts_with("enhancement discarded"));
    }

    #[tokio::test]
    async fn timeout_retries_exactly_once() {
        let (guarded, source) = enhancer(MockSource::responding(Vec::new()).with_delay(Duration::from_secs(5)));

        let err = guarded.enhance(&input(&[Field::Start]), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, EnhancerFailure::TimedOut { attempts: 2 });
        assert_eq!(source.calls(), 2);
        assert!(err.to_string().starts_with("enhancement unavailable"));
    }

    #[tokio::test]
    async fn transient_failure_recovers_on_retry() {
        let (guarded, source) = enhancer(
            MockSource::responding(vec![Candidate::new(Field::Start, tuesday_dinner(), 0.5)]).failing_first(1),
        );

        let out = guarded.enhance(&input(&[Field::Start]), &CancellationToken::new()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn unavailable_is_not_retried() {
        let (guarded, source) = enhancer(MockSource::unavailable());

        let err = guarded.enhance(&input(&[Field::Start]), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EnhancerFailure::Unavailable(_)));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn retries_follow_source_error_retryability() {
        let (guarded, source) = enhancer(MockSource::failing(SourceError::Transient("busy".into())));
        let err = guarded.enhance(&input(&[Field::Start]), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, EnhancerFailure::Unavailable("busy".into()));
        assert_eq!(source.calls(), MAX_ATTEMPTS as usize);

        let (guarded, source) = enhancer(MockSource::failing(SourceError::InvalidResponse("not json".into())));
        let err = guarded.enhance(&input(&[Field::Start]), &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, EnhancerFailure::SchemaViolation("not json".into()));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn cancelled_request_spends_no_calls() {
        let (guarded, source) = enhancer(MockSource::responding(Vec::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = guarded.enhance(&input(&[Field::Start]), &cancel).await.unwrap_err();
        assert_eq!(err, EnhancerFailure::Cancelled);
        assert_eq!(source.calls(), 0);
    }
}
