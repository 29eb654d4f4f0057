//! Shared helpers for eventparse integration tests
//!
//! Fixed reference time, pipeline builders and a cache backend that always
//! fails.

#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use eventparse::cache::{CacheBackend, CacheError, CacheKey, CacheStats, CachedExtraction};
use eventparse::{CandidateSource, ExtractionPipeline, ExtractionRequest, PipelineConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Wednesday 2025-03-12 09:00 UTC.
pub fn reference() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2025-03-12T09:00:00+00:00").unwrap()
}

pub fn local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub fn request(text: &str) -> ExtractionRequest {
    ExtractionRequest::new(text, reference()).with_timezone("UTC")
}

/// Deterministic stages only, no cache.
pub fn deterministic() -> ExtractionPipeline {
    ExtractionPipeline::new(PipelineConfig::deterministic()).without_cache()
}

/// Enhancer enabled with a short per-attempt timeout, no cache.
pub fn with_enhancer(source: Arc<dyn CandidateSource>, timeout_ms: u64) -> ExtractionPipeline {
    let mut config = PipelineConfig::default();
    config.enhancer.timeout_ms = timeout_ms;
    ExtractionPipeline::new(config)
        .without_cache()
        .with_enhancer(source)
}

/// A cache backend whose every operation fails.
#[derive(Default)]
pub struct FailingCache {
    attempts: AtomicU64,
}

impl FailingCache {
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl CacheBackend for FailingCache {
    fn get(&self, _key: &CacheKey) -> Result<Option<CachedExtraction>, CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("backend offline".to_string()))
    }

    fn put(&self, _key: CacheKey, _value: CachedExtraction) -> Result<(), CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("backend offline".to_string()))
    }

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}
