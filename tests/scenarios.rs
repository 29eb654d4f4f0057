//! End-to-end extraction scenarios
//!
//! Run with: `cargo test --test scenarios`

mod common;

use common::{deterministic, local, reference, request, with_enhancer, FailingCache};
use eventparse::{
    Candidate, ExtractionPipeline, Field, FieldValue, PipelineConfig, Source, ENHANCER_CEILING,
};
use std::sync::Arc;
use std::time::Duration;

use eventparse::extract::MockSource;

#[tokio::test]
async fn explicit_sentence_is_resolved_by_patterns_alone() {
    let response = deterministic()
        .extract(&request("Team meeting tomorrow at 2:00 PM in Conference Room A"))
        .await
        .unwrap();

    let event = &response.event;
    assert_eq!(event.title.as_deref(), Some("Team meeting"));
    assert_eq!(event.start.unwrap().naive_local(), local(2025, 3, 13, 14, 0));
    assert_eq!(event.end.unwrap().naive_local(), local(2025, 3, 13, 15, 0));
    assert_eq!(event.location.as_deref(), Some("Conference Room A"));
    assert_eq!(response.parsing_path.label(), "pattern_only");
    assert!(response.overall_confidence >= 0.8);
    assert!(!response.needs_confirmation);
    assert!(response.warnings.is_empty());
}

#[tokio::test]
async fn missing_start_is_penalised_and_needs_confirmation() {
    let text = "lunch with sarah";
    let strict = deterministic().extract(&request(text)).await.unwrap();

    let mut lenient_config = PipelineConfig::deterministic();
    lenient_config.confidence.missing_essential_penalty = 0.0;
    let lenient = ExtractionPipeline::new(lenient_config)
        .without_cache()
        .extract(&request(text))
        .await
        .unwrap();

    assert!(strict.event.title.is_some());
    assert!(strict.event.start.is_none());
    assert!(strict.event.end.is_none());
    assert!(strict.needs_confirmation);
    assert!(strict.unconfirmed_fields.contains(&Field::Start));
    assert!((lenient.overall_confidence - strict.overall_confidence - 0.10).abs() < 1e-9);
}

#[tokio::test]
async fn most_recent_time_mention_wins() {
    let response = deterministic()
        .extract(&request("meeting at 10am, moved to 2pm").with_audit())
        .await
        .unwrap();

    assert_eq!(response.event.start.unwrap().naive_local(), local(2025, 3, 12, 14, 0));
    let start = response.result_for(Field::Start).unwrap();
    assert!(start
        .alternatives
        .contains(&FieldValue::DateTime(local(2025, 3, 12, 10, 0))));
}

#[tokio::test]
async fn delayed_enhancer_degrades_to_partial_result() {
    let slow = Arc::new(MockSource::responding(Vec::new()).with_delay(Duration::from_secs(5)));
    let pipeline = with_enhancer(slow.clone(), 50);

    let response = pipeline
        .extract(&request("Dinner with the team sometime next week").with_audit())
        .await
        .unwrap();

    assert!(response.event.start.is_none());
    assert!(response.result_for(Field::Start).is_none());
    assert!(response
        .warnings
        .iter()
        .any(|w| w.starts_with("enhancement unavailable")));
    assert!(response.needs_confirmation);
    assert!(response.unconfirmed_fields.contains(&Field::Start));
    assert!(response.parsing_path.contains(Source::Enhancer));
    assert_eq!(slow.calls(), 2);
}

#[tokio::test]
async fn identical_requests_hit_the_cache() {
    let pipeline = ExtractionPipeline::new(PipelineConfig::deterministic());
    let req = request("Team meeting tomorrow at 2:00 PM in Conference Room A");

    let first = pipeline.extract(&req).await.unwrap();
    let second = pipeline.extract(&req).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.event, second.event);
    assert_eq!(first.parsing_path, second.parsing_path);
    assert_eq!(first.unconfirmed_fields, second.unconfirmed_fields);

    let stats = pipeline.cache_stats().unwrap();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
}

#[tokio::test]
async fn failing_cache_is_bypassed() {
    let failing = Arc::new(FailingCache::default());
    let pipeline = ExtractionPipeline::new(PipelineConfig::deterministic()).with_cache(failing.clone());
    let req = request("Standup at 9:30am via Zoom");

    let with_broken_cache = pipeline.extract(&req).await.unwrap();
    let without_cache = deterministic().extract(&req).await.unwrap();

    assert!(!with_broken_cache.cache_hit);
    assert_eq!(with_broken_cache.event, without_cache.event);
    assert_eq!(failing.attempts(), 2);
}

#[tokio::test]
async fn enhancer_output_outside_schema_is_discarded() {
    let rogue = Arc::new(MockSource::responding(vec![
        Candidate::new(
            Field::Start,
            FieldValue::DateTime(local(2025, 3, 18, 19, 0)),
            0.6,
        ),
        Candidate::new(Field::Title, FieldValue::Text("Something else".into()), 0.9),
    ]));
    let response = with_enhancer(rogue, 200)
        .extract(&request("Dinner with the team sometime next week"))
        .await
        .unwrap();

    assert!(response.event.start.is_none());
    assert_ne!(response.event.title.as_deref(), Some("Something else"));
    assert!(response
        .warnings
        .iter()
        .any(|w| w.starts_with("enhancement discarded")));
}

#[tokio::test]
async fn enhancer_cannot_reach_locked_fields() {
    let source = Arc::new(MockSource::responding(vec![Candidate::new(
        Field::Start,
        FieldValue::DateTime(local(2025, 3, 18, 19, 0)),
        0.99,
    )]));
    let response = with_enhancer(source.clone(), 200)
        .extract(&request("Dinner with the team sometime next week").with_audit())
        .await
        .unwrap();

    let sent = &source.requests()[0];
    assert!(!sent.fields.contains(&Field::Title));

    let start = response.result_for(Field::Start).unwrap();
    assert_eq!(start.source, Source::Enhancer);
    assert_eq!(start.confidence(), ENHANCER_CEILING);
    assert!(response.event.title.unwrap().starts_with("Dinner with the team"));
}

#[tokio::test]
async fn complementary_secondary_fragment_is_merged() {
    let response = deterministic()
        .extract(&request("Dentist appointment on Friday").with_secondary("at 3:30pm"))
        .await
        .unwrap();

    assert_eq!(response.event.start.unwrap().naive_local(), local(2025, 3, 14, 15, 30));
    assert!(response.warnings.is_empty());
}

#[tokio::test]
async fn redundant_secondary_fragment_is_noted() {
    let response = deterministic()
        .extract(&request("Team meeting tomorrow at 2pm").with_secondary("team meeting tomorrow at 2pm"))
        .await
        .unwrap();

    assert!(response
        .warnings
        .iter()
        .any(|w| w.contains("near-duplicate")));
}

#[tokio::test]
async fn field_subset_limits_scoring() {
    let response = deterministic()
        .extract(&request("lunch with sarah").with_fields(vec![Field::Title]))
        .await
        .unwrap();

    assert!(response.event.title.is_some());
    assert!(!response.needs_confirmation);
    assert!(response.unconfirmed_fields.is_empty());
}

#[tokio::test]
async fn date_without_time_is_all_day() {
    let response = deterministic()
        .extract(&request("Company offsite March 20"))
        .await
        .unwrap();

    let event = &response.event;
    assert!(event.all_day);
    assert_eq!(event.start.unwrap().naive_local(), local(2025, 3, 20, 0, 0));
    assert_eq!(event.end.unwrap().naive_local(), local(2025, 3, 21, 0, 0));
}

#[tokio::test]
async fn unknown_locale_falls_back_with_warning() {
    let response = deterministic()
        .extract(&request("Team meeting tomorrow at 2pm").with_locale("de"))
        .await
        .unwrap();

    assert!(response.event.start.is_some());
    assert!(response.warnings.iter().any(|w| w.contains("locale 'de'")));
}

#[tokio::test]
async fn explicit_range_sets_both_ends() {
    let response = deterministic()
        .extract(&request("Workshop tomorrow from 1pm to 4:30pm"))
        .await
        .unwrap();

    assert_eq!(response.event.start.unwrap().naive_local(), local(2025, 3, 13, 13, 0));
    assert_eq!(response.event.end.unwrap().naive_local(), local(2025, 3, 13, 16, 30));
}

#[tokio::test]
async fn stated_duration_sets_end() {
    let response = deterministic()
        .extract(&request("Team sync tomorrow at 10am for 30 minutes"))
        .await
        .unwrap();

    assert_eq!(response.event.end.unwrap().naive_local(), local(2025, 3, 13, 10, 30));
}

#[tokio::test]
async fn absurd_duration_keeps_default_end() {
    let response = deterministic()
        .extract(&request("Meeting tomorrow at 3pm for 99999999999 hours"))
        .await
        .unwrap();

    assert_eq!(response.event.start.unwrap().naive_local(), local(2025, 3, 13, 15, 0));
    assert_eq!(response.event.end.unwrap().naive_local(), local(2025, 3, 13, 16, 0));
    assert!(!response.warnings.iter().any(|w| w.contains("failed")));
}

#[tokio::test]
async fn absurd_duration_survives_enhanced_start() {
    let source = Arc::new(MockSource::responding(vec![Candidate::new(
        Field::Start,
        FieldValue::DateTime(local(2025, 3, 18, 19, 0)),
        0.9,
    )]));
    let response = with_enhancer(source, 200)
        .extract(&request("Dinner with the team sometime next week for 99999999999 hours"))
        .await
        .unwrap();

    assert_eq!(response.event.start.unwrap().naive_local(), local(2025, 3, 18, 19, 0));
    assert_eq!(response.event.end.unwrap().naive_local(), local(2025, 3, 18, 20, 0));
}

#[tokio::test]
async fn case_changing_characters_keep_title() {
    let response = deterministic()
        .extract(&request("Boo\u{212A} dinner tomorrow at 7pm"))
        .await
        .unwrap();

    let title = response.event.title.unwrap();
    assert!(title.contains("dinner"));
    assert_eq!(response.event.start.unwrap().naive_local(), local(2025, 3, 13, 19, 0));
    assert!(response.warnings.is_empty());
}

#[tokio::test]
async fn pipeline_deadline_leaves_partial_result() {
    // Warm the blocking pool outside the timed run.
    deterministic().extract(&request("coffee at 3")).await.unwrap();

    let mut config = PipelineConfig::deterministic();
    config.timing.pipeline_deadline_ms = 100;
    let slow = Arc::new(MockSource::responding(Vec::new()).with_delay(Duration::from_secs(5)));
    let pipeline = ExtractionPipeline::new(config).without_cache().with_grammar(slow);

    let started = std::time::Instant::now();
    let response = pipeline
        .extract(&request("coffee at 3").with_audit())
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(response.result_for(Field::Start).unwrap().source, Source::Pattern);
    assert!(response
        .warnings
        .iter()
        .any(|w| w.contains("pipeline deadline reached")));
    assert!(response.unconfirmed_fields.contains(&Field::End));
    assert!(response.unconfirmed_fields.contains(&Field::Location));
    assert!(response.needs_confirmation);
}

#[tokio::test]
async fn first_request_fits_a_tight_deadline() {
    let mut config = PipelineConfig::deterministic();
    config.timing.pipeline_deadline_ms = 250;
    let response = ExtractionPipeline::new(config)
        .without_cache()
        .extract(&request("Team meeting tomorrow at 2pm in Room 4B"))
        .await
        .unwrap();

    assert_eq!(response.event.title.as_deref(), Some("Team meeting"));
    assert!(response.event.start.is_some());
    assert_eq!(response.event.location.as_deref(), Some("Room 4B"));
}

#[test]
fn reference_is_a_wednesday() {
    use chrono::Datelike;
    assert_eq!(reference().weekday(), chrono::Weekday::Wed);
}
