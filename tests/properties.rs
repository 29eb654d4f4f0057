//! Randomised invariant checks over generated event text
//!
//! Sentences are assembled from fragment tables with a seeded RNG so
//! failures reproduce.
//!
//! Run with: `cargo test --test properties`

mod common;

use async_trait::async_trait;
use common::{deterministic, local, request, with_enhancer};
use eventparse::{
    Candidate, CandidateRequest, CandidateSource, Field, FieldValue, Source, SourceError,
    ENHANCER_CEILING, LOCK_THRESHOLD,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

const CASES: usize = 60;

const SUBJECTS: &[&str] = &[
    "Team meeting",
    "lunch with sarah",
    "Dentist appointment",
    "Quarterly review",
    "call with the vendor",
    "Dinner with the team",
    "Yoga",
    "Boo\u{212A} club",
    "İstanbul call",
    "Café Müller brunch",
    "チーム会議",
    "",
];

const DAYS: &[&str] = &[
    "tomorrow",
    "today",
    "on Friday",
    "next Tuesday",
    "March 20",
    "sometime next week",
    "2/30",
    "2025-02-30",
    "",
];

const TIMES: &[&str] = &[
    "at 2pm",
    "at 10:30am",
    "at 3",
    "from 1pm to 4:30pm",
    "at 9pm until 1am",
    "in the afternoon",
    "at noon",
    "",
];

const PLACES: &[&str] = &[
    "in Conference Room A",
    "at 221 Baker Street",
    "via Zoom",
    "in Room 4B",
    "",
];

const TAILS: &[&str] = &[
    "for 30 minutes",
    "for 2 hours",
    ", moved to 5pm",
    "notes: bring slides",
    "for 99999999999 hours",
    "for 9000000 hours",
    "in 4000000000 weeks",
    "",
];

fn pick<'a>(rng: &mut StdRng, table: &[&'a str]) -> &'a str {
    table[rng.gen_range(0..table.len())]
}

fn sentence(rng: &mut StdRng) -> String {
    let parts = [
        pick(rng, SUBJECTS),
        pick(rng, DAYS),
        pick(rng, TIMES),
        pick(rng, PLACES),
        pick(rng, TAILS),
    ];
    let text = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        "Standup".to_string()
    } else {
        text
    }
}

fn sentences(seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..CASES).map(|_| sentence(&mut rng)).collect()
}

/// Answers every requested field with a well-formed value at a random
/// confidence, recording what was asked.
struct EchoSource {
    rng: Mutex<StdRng>,
    requests: Mutex<Vec<CandidateRequest>>,
}

impl EchoSource {
    fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn take_requests(&self) -> Vec<CandidateRequest> {
        std::mem::take(&mut *self.requests.lock().unwrap())
    }
}

#[async_trait]
impl CandidateSource for EchoSource {
    fn name(&self) -> &str {
        "echo"
    }

    async fn candidates(&self, request: &CandidateRequest) -> Result<Vec<Candidate>, SourceError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut rng = self.rng.lock().unwrap();
        let candidates = request
            .fields
            .iter()
            .map(|field| {
                let value = match field {
                    Field::Start => FieldValue::DateTime(local(2025, 3, 18, rng.gen_range(8..20), 0)),
                    Field::End => FieldValue::DateTime(local(2025, 3, 18, rng.gen_range(8..23), 0)),
                    Field::Duration => FieldValue::Minutes(rng.gen_range(15..180)),
                    _ => FieldValue::Text(format!("{} guess", field)),
                };
                Candidate::new(*field, value, rng.gen_range(0.0..=1.0))
            })
            .collect();
        Ok(candidates)
    }
}

#[tokio::test]
async fn overall_confidence_stays_in_unit_interval() {
    let pipeline = deterministic();
    for text in sentences(42) {
        let response = pipeline.extract(&request(&text)).await.unwrap();
        assert!(
            !response.warnings.iter().any(|w| w.contains("panicked")),
            "{:?}: {:?}",
            text,
            response.warnings
        );
        assert!(
            (0.0..=1.0).contains(&response.overall_confidence),
            "{:?} scored {}",
            text,
            response.overall_confidence
        );
    }
}

#[tokio::test]
async fn end_never_precedes_start() {
    let source = Arc::new(EchoSource::new(7));
    let pipelines = [deterministic(), with_enhancer(source, 500)];
    for pipeline in &pipelines {
        for text in sentences(42) {
            let response = pipeline.extract(&request(&text)).await.unwrap();
            if let (Some(start), Some(end)) = (response.event.start, response.event.end) {
                assert!(start <= end, "{:?}: {} > {}", text, start, end);
            }
        }
    }
}

#[tokio::test]
async fn enhancer_results_respect_ceiling() {
    let source = Arc::new(EchoSource::new(42));
    let pipeline = with_enhancer(source, 500);
    for text in sentences(42) {
        let response = pipeline.extract(&request(&text).with_audit()).await.unwrap();
        for result in response.field_results.iter().flatten() {
            if result.source == Source::Enhancer {
                assert!(
                    result.confidence() <= ENHANCER_CEILING,
                    "{:?}: {} at {}",
                    text,
                    result.field,
                    result.confidence()
                );
            }
        }
    }
}

#[tokio::test]
async fn locked_fields_are_never_sent_to_enhancer() {
    let source = Arc::new(EchoSource::new(42));
    let baseline = deterministic();
    let enhanced = with_enhancer(source.clone(), 500);

    for text in sentences(42) {
        let trusted = baseline.extract(&request(&text).with_audit()).await.unwrap();
        enhanced.extract(&request(&text)).await.unwrap();

        let locked: Vec<Field> = trusted
            .field_results
            .iter()
            .flatten()
            .filter(|r| r.confidence() >= LOCK_THRESHOLD)
            .map(|r| r.field)
            .collect();
        for sent in source.take_requests() {
            for field in &locked {
                assert!(!sent.fields.contains(field), "{:?}: {} was locked", text, field);
            }
        }
    }
}

#[tokio::test]
async fn deterministic_runs_serialize_identically() {
    let first = deterministic();
    let second = deterministic();
    for text in sentences(1234) {
        let req = request(&text).with_audit();
        let a = first.extract(&req).await.unwrap();
        let b = second.extract(&req).await.unwrap();

        assert_eq!(
            serde_json::to_string(&a.field_results).unwrap(),
            serde_json::to_string(&b.field_results).unwrap(),
            "{:?}",
            text
        );
        assert_eq!(a.event, b.event);
        assert_eq!(a.overall_confidence, b.overall_confidence);
    }
}
