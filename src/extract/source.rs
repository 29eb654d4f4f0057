//! Candidate sources: the one narrow interface to upstream resolvers
//!
//! Both the grammar backup and the generative enhancer answer the same
//! question: given text and a target field set, return typed candidate values
//! with self-reported confidence. Implementations:
//! - `GrammarBackupExtractor`: in-process grammar parse
//! - `CommandSource`: external generative process over a JSON line protocol
//! - `MockSource`: preconfigured responses (testing)

use crate::event::{Field, FieldValue, Span};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What a source is asked to resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRequest {
    /// Text to read. For the enhancer this is residual text with trusted
    /// spans masked out.
    pub text: String,
    pub fields: Vec<Field>,
    /// Local wall-clock reference for relative expressions.
    pub reference: NaiveDateTime,
    /// Already-resolved values the requested fields may depend on.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<Field, FieldValue>,
}

impl CandidateRequest {
    pub fn new(text: impl Into<String>, fields: Vec<Field>, reference: NaiveDateTime) -> Self {
        Self {
            text: text.into(),
            fields,
            reference,
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, context: BTreeMap<Field, FieldValue>) -> Self {
        self.context = context;
        self
    }
}

/// A typed value proposed by a source, with its self-reported confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub field: Field,
    pub value: FieldValue,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl Candidate {
    pub fn new(field: Field, value: FieldValue, confidence: f64) -> Self {
        Self {
            field,
            value,
            confidence,
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// Errors at the provider boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// Timeouts and transient failures earn the single retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Timeout(_) | SourceError::Transient(_))
    }
}

/// Anything that can propose candidate values for a set of fields.
///
/// Abstracts over transport (in-process, subprocess, mock) so the pipeline
/// doesn't depend on how a resolver is reached.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Short identifier used in logs and warnings.
    fn name(&self) -> &str;

    /// Propose candidates for the requested fields.
    async fn candidates(&self, request: &CandidateRequest) -> Result<Vec<Candidate>, SourceError>;
}

/// Mock source for testing. Returns preconfigured responses.
pub struct MockSource {
    outcome: Result<Vec<Candidate>, SourceError>,
    delay: Option<Duration>,
    failures_before_success: usize,
    calls: AtomicUsize,
    requests: Mutex<Vec<CandidateRequest>>,
}

impl MockSource {
    /// A source that answers with the given candidates.
    pub fn responding(candidates: Vec<Candidate>) -> Self {
        Self {
            outcome: Ok(candidates),
            delay: None,
            failures_before_success: 0,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A source that is never reachable.
    pub fn unavailable() -> Self {
        Self::failing(SourceError::Unavailable(
            "mock source configured as unavailable".to_string(),
        ))
    }

    /// A source that always fails with `error`.
    pub fn failing(error: SourceError) -> Self {
        Self {
            outcome: Err(error),
            ..Self::responding(Vec::new())
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the first `n` calls with a transient error.
    pub fn failing_first(mut self, n: usize) -> Self {
        self.failures_before_success = n;
        self
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<CandidateRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CandidateSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn candidates(&self, request: &CandidateRequest) -> Result<Vec<Candidate>, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if call < self.failures_before_success {
            return Err(SourceError::Transient(format!(
                "mock failure on call {}",
                call + 1
            )));
        }

        self.outcome.clone()
    }
}
