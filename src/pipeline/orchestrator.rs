//! Confidence-routed extraction pipeline
//!
//! One request, one logical worker:
//! 1. Normalize, then look the result up in the cache
//! 2. Analyze and plan
//! 3. Concurrent pattern batch for high-band, dependency-free fields
//! 4. Sequential queue in dependency order, escalating medium-band temporal
//!    fields to the grammar backup
//! 5. One guarded enhancer call for whatever is still below the medium floor
//! 6. Aggregate, validate, cache
//!
//! Every field task writes only its own slot. A task that misses its timeout
//! leaves the field unresolved with a warning; nothing short of invalid
//! input or cancellation fails the request.

use super::cancel::CancellationToken;
use super::types::{ExtractionRequest, ExtractionResponse, PipelineError};
use crate::aggregate::ResultAggregator;
use crate::analysis::{ConfidenceBand, ExecutionPlan, FieldExtractabilityAnalyzer, ProcessingOrderPlanner};
use crate::cache::{CacheBackend, CacheKey, CacheStats, CachedExtraction, KeyParts, ResultCache};
use crate::config::{PipelineConfig, HIGH_CONFIDENCE, LOCK_THRESHOLD};
use crate::enhance::{EnhancerFailure, GuardedEnhancer, ResidualInput};
use crate::event::{confidence_of, Field, FieldMap, FieldResult, ParsingPath, Source};
use crate::extract::grammar::GRAMMAR_CEILING;
use crate::extract::{CandidateRequest, CandidateSource, GrammarBackupExtractor, PatternExtractor};
use crate::normalize::{NormalizedText, TextNormalizer};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How one field task ended.
#[derive(Debug)]
enum FieldOutcome {
    Resolved(FieldResult),
    Unresolved,
    TimedOut,
    Failed(String),
}

/// Per-request mutable state. Owned by the request's worker; field tasks
/// hand their outcomes back instead of touching it.
#[derive(Debug, Default)]
struct RunState {
    results: FieldMap,
    warnings: Vec<String>,
    flagged: BTreeSet<Field>,
    path: ParsingPath,
}

impl RunState {
    fn settle(&mut self, field: Field, outcome: FieldOutcome, budget: Duration) {
        match outcome {
            FieldOutcome::Resolved(result) => {
                self.results.insert(field, result);
            }
            FieldOutcome::Unresolved => {}
            FieldOutcome::TimedOut => {
                warn!(field = %field, budget_ms = budget.as_millis() as u64, "field task timed out");
                self.warnings.push(format!(
                    "extraction timeout: {} exceeded {}ms",
                    field,
                    budget.as_millis()
                ));
                self.flagged.insert(field);
            }
            FieldOutcome::Failed(reason) => {
                warn!(field = %field, error = %reason, "field task failed");
                self.warnings
                    .push(format!("extraction of {} failed: {}", field, reason));
                self.flagged.insert(field);
            }
        }
    }

    fn deadline_missed(&mut self, field: Field) {
        self.warnings.push(format!(
            "extraction timeout: pipeline deadline reached before {} resolved",
            field
        ));
        self.flagged.insert(field);
    }
}

/// Run the pattern extractor for one field on the blocking pool, bounded by
/// `budget`. A late result is discarded.
async fn run_pattern(
    pattern: Arc<PatternExtractor>,
    field: Field,
    text: Arc<str>,
    reference: NaiveDateTime,
    resolved: FieldMap,
    budget: Duration,
) -> FieldOutcome {
    let started = Instant::now();
    let work = tokio::task::spawn_blocking(move || pattern.extract(field, &text, reference, &resolved));

    match timeout(budget, work).await {
        Ok(Ok(Some(result))) => FieldOutcome::Resolved(result.with_processing_time(started.elapsed())),
        Ok(Ok(None)) => FieldOutcome::Unresolved,
        Ok(Err(e)) => FieldOutcome::Failed(e.to_string()),
        Err(_) => FieldOutcome::TimedOut,
    }
}

/// The unified extraction pipeline.
///
/// Cheap to share behind an `Arc`; concurrent requests only meet in the cache.
pub struct ExtractionPipeline {
    config: PipelineConfig,
    normalizer: TextNormalizer,
    analyzer: FieldExtractabilityAnalyzer,
    planner: ProcessingOrderPlanner,
    pattern: Arc<PatternExtractor>,
    grammar: Arc<dyn CandidateSource>,
    enhancer: Option<GuardedEnhancer>,
    aggregator: ResultAggregator,
    cache: Option<Arc<dyn CacheBackend>>,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl ExtractionPipeline {
    /// Deterministic stages plus an in-memory cache (when enabled). Attach a
    /// generative provider with [`Self::with_enhancer`].
    pub fn new(config: PipelineConfig) -> Self {
        let cache: Option<Arc<dyn CacheBackend>> = if config.cache.enabled {
            Some(Arc::new(ResultCache::from_config(&config.cache)))
        } else {
            None
        };

        Self {
            normalizer: TextNormalizer::new(),
            analyzer: FieldExtractabilityAnalyzer::from_config(&config.confidence),
            planner: ProcessingOrderPlanner::new(),
            pattern: Arc::new(PatternExtractor::from_config(&config.extraction)),
            grammar: Arc::new(GrammarBackupExtractor::from_config(&config.confidence)),
            enhancer: None,
            aggregator: ResultAggregator::from_config(&config),
            cache,
            config,
        }
    }

    /// Use `source` for guarded enhancement. Ignored at run time while
    /// `enhancer.enabled` is false.
    pub fn with_enhancer(mut self, source: Arc<dyn CandidateSource>) -> Self {
        self.enhancer = Some(GuardedEnhancer::from_config(source, &self.config.enhancer));
        self
    }

    /// Replace the in-process grammar backup.
    pub fn with_grammar(mut self, source: Arc<dyn CandidateSource>) -> Self {
        self.grammar = source;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    fn enhancer(&self) -> Option<&GuardedEnhancer> {
        self.enhancer
            .as_ref()
            .filter(|_| self.config.enhancer.enabled)
    }

    /// Extract one event.
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, PipelineError> {
        self.extract_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Extract one event, abandoning work once `cancel` is set.
    pub async fn extract_with_cancel(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResponse, PipelineError> {
        let started = Instant::now();
        request.validate(&self.config.extraction)?;

        let request_id = Uuid::new_v4();
        let normalized = self
            .normalizer
            .normalize(&request.text, request.secondary_text.as_deref());
        let requested = request.requested_fields();

        let key = self.cache.as_ref().map(|_| {
            CacheKey::new(KeyParts {
                normalized_text: &normalized.text,
                secondary_note: normalized.secondary_note.as_deref(),
                reference_time: request.reference_time,
                bucket_secs: self.config.cache.reference_bucket_secs,
                timezone: &request.timezone,
                locale: &request.locale,
                fields: &requested,
            })
        });

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            match cache.get(key) {
                Ok(Some(hit)) => {
                    debug!(request_id = %request_id, key = %key, "cache hit");
                    return Ok(respond(request_id, request.audit_mode, hit, true, started));
                }
                Ok(None) => debug!(request_id = %request_id, key = %key, "cache miss"),
                Err(e) => warn!(request_id = %request_id, error = %e, "cache lookup failed, bypassing"),
            }
        }

        cancel.checkpoint("analyze")?;
        let extraction = self.run(&normalized, request, &requested, cancel).await?;
        cancel.checkpoint("cache")?;

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            if let Err(e) = cache.put(key, extraction.clone()) {
                warn!(request_id = %request_id, error = %e, "cache write failed");
            }
        }

        info!(
            request_id = %request_id,
            path = %extraction.parsing_path.label(),
            overall = extraction.event.overall_confidence,
            needs_confirmation = extraction.event.needs_confirmation,
            "extraction complete"
        );
        Ok(respond(request_id, request.audit_mode, extraction, false, started))
    }

    async fn run(
        &self,
        normalized: &NormalizedText,
        request: &ExtractionRequest,
        requested: &[Field],
        cancel: &CancellationToken,
    ) -> Result<CachedExtraction, PipelineError> {
        let text: Arc<str> = Arc::from(normalized.text.as_str());
        let reference = request.reference_time.naive_local();
        let deadline = tokio::time::Instant::now() + self.config.timing.pipeline_deadline();

        let mut state = RunState::default();
        if let Some(note) = &normalized.secondary_note {
            state.warnings.push(note.clone());
        }
        if !request.locale.to_ascii_lowercase().starts_with("en") {
            state.warnings.push(format!(
                "locale '{}' has no dedicated rules; English patterns applied",
                request.locale
            ));
        }

        let planned: Vec<Field> = ProcessingOrderPlanner::closure(requested).into_iter().collect();
        let estimates = self.analyzer.estimate(&text, &planned);
        let plan = self.planner.plan(requested, &estimates);
        debug!(
            concurrent = ?plan.concurrent.iter().map(|p| p.field).collect::<Vec<_>>(),
            sequential = ?plan.sequential.iter().map(|p| p.field).collect::<Vec<_>>(),
            "plan built"
        );

        self.run_concurrent(&plan, &text, reference, deadline, &mut state)
            .await;
        cancel.checkpoint("pattern")?;
        self.run_sequential(&plan, &text, reference, deadline, &mut state, cancel)
            .await?;
        self.run_enhancer(&plan, &text, reference, deadline, &mut state, cancel)
            .await?;

        let aggregation = self.aggregator.aggregate(
            state.results,
            requested,
            &state.flagged,
            *request.reference_time.offset(),
            &request.timezone,
            state.warnings,
        );

        Ok(CachedExtraction {
            event: aggregation.event,
            field_results: aggregation.field_results,
            parsing_path: state.path,
            unconfirmed_fields: aggregation.unconfirmed_fields,
        })
    }

    /// Phase 1: dependency-free high-band fields, joined against the
    /// pipeline deadline.
    async fn run_concurrent(
        &self,
        plan: &ExecutionPlan,
        text: &Arc<str>,
        reference: NaiveDateTime,
        deadline: tokio::time::Instant,
        state: &mut RunState,
    ) {
        if plan.concurrent.is_empty() {
            return;
        }
        state.path.record(Source::Pattern);

        let budget = self.config.timing.field_timeout();
        let mut tasks = JoinSet::new();
        for planned in &plan.concurrent {
            let field = planned.field;
            let pattern = Arc::clone(&self.pattern);
            let text = Arc::clone(text);
            tasks.spawn(async move {
                let outcome = run_pattern(pattern, field, text, reference, FieldMap::new(), budget).await;
                (field, outcome)
            });
        }

        let mut pending: BTreeSet<Field> = plan.concurrent.iter().map(|p| p.field).collect();
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((field, outcome)))) => {
                    pending.remove(&field);
                    state.settle(field, outcome, budget);
                }
                Ok(Some(Err(e))) => warn!(error = %e, "field task aborted"),
                Ok(None) => break,
                Err(_) => {
                    tasks.abort_all();
                    break;
                }
            }
        }

        for field in pending {
            state.deadline_missed(field);
        }
    }

    /// Phase 2: everything else, in dependency order.
    async fn run_sequential(
        &self,
        plan: &ExecutionPlan,
        text: &Arc<str>,
        reference: NaiveDateTime,
        deadline: tokio::time::Instant,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let field_timeout = self.config.timing.field_timeout();

        for planned in &plan.sequential {
            cancel.checkpoint("sequential")?;
            let field = planned.field;

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                state.deadline_missed(field);
                continue;
            }
            let budget = field_timeout.min(remaining);

            state.path.record(Source::Pattern);
            let outcome = run_pattern(
                Arc::clone(&self.pattern),
                field,
                Arc::clone(text),
                reference,
                state.results.clone(),
                budget,
            )
            .await;
            state.settle(field, outcome, budget);

            if planned.escalate && self.wants_grammar(field, planned.band, state.results.get(&field)) {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    state.deadline_missed(field);
                    continue;
                }
                self.run_grammar(field, text, reference, field_timeout.min(remaining), state)
                    .await;
            }
        }

        Ok(())
    }

    /// Grammar runs for temporal fields whose pattern confidence sits in the
    /// medium band, or that the analyzer predicted medium but pattern missed.
    fn wants_grammar(&self, field: Field, band: ConfidenceBand, result: Option<&FieldResult>) -> bool {
        if !GrammarBackupExtractor::supports(field) {
            return false;
        }
        match result {
            Some(r) => r.confidence() >= self.config.confidence.medium_floor && r.confidence() < HIGH_CONFIDENCE,
            None => band == ConfidenceBand::Medium,
        }
    }

    async fn run_grammar(
        &self,
        field: Field,
        text: &Arc<str>,
        reference: NaiveDateTime,
        budget: Duration,
        state: &mut RunState,
    ) {
        let context = field
            .dependencies()
            .iter()
            .filter_map(|dep| state.results.get(dep).map(|r| (*dep, r.value.clone())))
            .collect();
        let request = CandidateRequest::new(text.to_string(), vec![field], reference).with_context(context);

        state.path.record(Source::Grammar);
        let started = Instant::now();
        debug!(field = %field, source = self.grammar.name(), "escalating to grammar backup");

        match timeout(budget, self.grammar.candidates(&request)).await {
            Ok(Ok(candidates)) => {
                let best = candidates
                    .into_iter()
                    .filter(|c| c.field == field && field.accepts(&c.value))
                    .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
                let Some(candidate) = best else { return };

                let mut result = FieldResult::new(
                    field,
                    candidate.value,
                    Source::Grammar,
                    candidate.confidence.min(GRAMMAR_CEILING),
                )
                .with_processing_time(started.elapsed());
                result.span = candidate.span;

                let current = confidence_of(&state.results, field);
                if result.confidence() > current {
                    if let Some(previous) = state.results.remove(&field) {
                        if previous.value != result.value {
                            result = result.with_alternatives(vec![previous.value]);
                        }
                    }
                    state.results.insert(field, result);
                }
            }
            Ok(Err(e)) => {
                warn!(field = %field, error = %e, "grammar backup failed");
                state
                    .warnings
                    .push(format!("grammar backup for {} failed: {}", field, e));
            }
            Err(_) => {
                warn!(field = %field, "grammar backup timed out");
                state.warnings.push(format!(
                    "extraction timeout: grammar backup for {} exceeded {}ms",
                    field,
                    budget.as_millis()
                ));
            }
        }
    }

    /// Phase 3: one guarded call for residual low-confidence fields.
    async fn run_enhancer(
        &self,
        plan: &ExecutionPlan,
        text: &Arc<str>,
        reference: NaiveDateTime,
        deadline: tokio::time::Instant,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let Some(enhancer) = self.enhancer() else {
            return Ok(());
        };

        let floor = self.config.confidence.medium_floor;
        let residual: Vec<Field> = plan
            .fields()
            .filter(|f| plan.get(*f).is_some_and(|p| p.escalate))
            .filter(|f| confidence_of(&state.results, *f) < floor)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let Some(input) = ResidualInput::build(text, reference, &residual, &state.results) else {
            return Ok(());
        };

        if deadline <= tokio::time::Instant::now() {
            for field in input.fields() {
                state.deadline_missed(*field);
            }
            return Ok(());
        }
        cancel.checkpoint("enhance")?;

        state.path.record(Source::Enhancer);
        info!(source = enhancer.source_name(), fields = ?input.fields(), "escalating to enhancer");

        let outcome = match timeout_at(deadline, enhancer.enhance(&input, cancel)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EnhancerFailure::Unavailable(
                "pipeline deadline reached".to_string(),
            )),
        };

        match outcome {
            Ok(enhanced) => {
                let mut start_changed = false;
                let mut end_supplied = false;
                for result in enhanced {
                    let field = result.field;
                    if result.confidence() > confidence_of(&state.results, field) {
                        start_changed |= field == Field::Start;
                        end_supplied |= field == Field::End;
                        state.results.insert(field, result);
                    }
                }

                // A new start moves the derived end with it.
                if start_changed
                    && !end_supplied
                    && plan.get(Field::End).is_some()
                    && confidence_of(&state.results, Field::End) < LOCK_THRESHOLD
                {
                    if let Some(end) = self.pattern.derive_end(text, reference, &state.results) {
                        state.results.insert(Field::End, end);
                    }
                }

                for field in input.fields() {
                    if !state.results.contains_key(field) {
                        state.flagged.insert(*field);
                    }
                }
            }
            Err(EnhancerFailure::Cancelled) => return Err(PipelineError::Cancelled),
            Err(failure) => {
                warn!(error = %failure, "enhancement failed, keeping deterministic results");
                state.warnings.push(failure.to_string());
                state.flagged.extend(input.fields().iter().copied());
            }
        }

        Ok(())
    }
}

fn respond(
    request_id: Uuid,
    audit_mode: bool,
    extraction: CachedExtraction,
    cache_hit: bool,
    started: Instant,
) -> ExtractionResponse {
    ExtractionResponse {
        request_id,
        overall_confidence: extraction.event.overall_confidence,
        warnings: extraction.event.warnings.clone(),
        needs_confirmation: extraction.event.needs_confirmation,
        field_results: audit_mode.then(|| extraction.field_results.values().cloned().collect()),
        parsing_path: extraction.parsing_path,
        unconfirmed_fields: extraction.unconfirmed_fields,
        event: extraction.event,
        processing_time_ms: started.elapsed().as_millis() as u64,
        cache_hit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Candidate, MockSource, SourceError};
    use crate::event::FieldValue;
    use chrono::{DateTime, FixedOffset, NaiveDate};

    fn reference() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2025-03-12T09:00:00+00:00").unwrap()
    }

    fn pipeline() -> ExtractionPipeline {
        ExtractionPipeline::new(PipelineConfig::deterministic()).without_cache()
    }

    #[tokio::test]
    async fn explicit_text_stays_pattern_only() {
        let response = pipeline()
            .extract(&ExtractionRequest::new("Team meeting tomorrow at 2:00 PM in Conference Room A", reference()))
            .await
            .unwrap();

        assert_eq!(response.parsing_path.label(), "pattern_only");
        assert!(!response.needs_confirmation);
        assert!(response.field_results.is_none());
    }

    #[tokio::test]
    async fn ambiguous_hour_escalates_to_grammar() {
        let response = pipeline()
            .extract(&ExtractionRequest::new("coffee at 3", reference()).with_audit())
            .await
            .unwrap();

        assert!(response.parsing_path.contains(Source::Grammar));
        let start = response.result_for(Field::Start).unwrap();
        assert!(start.confidence() < HIGH_CONFIDENCE);
    }

    #[tokio::test]
    async fn slow_grammar_times_out_but_keeps_pattern_result() {
        // Compile the rule tables outside the timed run.
        pipeline()
            .extract(&ExtractionRequest::new("coffee at 3", reference()))
            .await
            .unwrap();

        let mut config = PipelineConfig::deterministic();
        config.timing.field_timeout_ms = 50;
        let slow = Arc::new(MockSource::responding(Vec::new()).with_delay(Duration::from_secs(5)));
        let pipeline = ExtractionPipeline::new(config)
            .without_cache()
            .with_grammar(slow);

        let response = pipeline
            .extract(&ExtractionRequest::new("coffee at 3", reference()).with_audit())
            .await
            .unwrap();

        assert!(response.warnings.iter().any(|w| w.starts_with("extraction timeout")));
        assert_eq!(response.result_for(Field::Start).unwrap().source, Source::Pattern);
    }

    #[tokio::test]
    async fn enhancer_fills_residual_start_under_ceiling() {
        let next_tuesday = NaiveDate::from_ymd_opt(2025, 3, 18).unwrap().and_hms_opt(19, 0, 0).unwrap();
        let source = Arc::new(MockSource::responding(vec![Candidate::new(
            Field::Start,
            FieldValue::DateTime(next_tuesday),
            0.95,
        )]));
        let pipeline = ExtractionPipeline::new(PipelineConfig::default())
            .without_cache()
            .with_enhancer(source.clone());

        let response = pipeline
            .extract(&ExtractionRequest::new("Dinner with the team sometime next week", reference()).with_audit())
            .await
            .unwrap();

        assert!(response.parsing_path.contains(Source::Enhancer));
        let start = response.result_for(Field::Start).unwrap();
        assert_eq!(start.source, Source::Enhancer);
        assert!(start.confidence() <= crate::config::ENHANCER_CEILING);
        assert!(response.event.end.is_some());
        assert!(!source.requests()[0].fields.contains(&Field::Title));
    }

    #[tokio::test]
    async fn disabled_enhancer_is_never_called() {
        let source = Arc::new(MockSource::failing(SourceError::Unavailable("down".into())));
        let pipeline = pipeline().with_enhancer(source.clone());

        pipeline
            .extract(&ExtractionRequest::new("Dinner with the team sometime next week", reference()))
            .await
            .unwrap();
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_request_is_not_cached() {
        let pipeline = ExtractionPipeline::new(PipelineConfig::deterministic());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pipeline
            .extract_with_cancel(&ExtractionRequest::new("lunch with sarah", reference()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(pipeline.cache_stats().unwrap().entries, 0);
    }

    #[tokio::test]
    async fn invalid_input_fails_fast() {
        let err = pipeline()
            .extract(&ExtractionRequest::new("  ", reference()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
