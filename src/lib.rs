//! eventparse: confidence-routed calendar event extraction
//!
//! Turns free-form text into a structured calendar event with a calibrated
//! confidence score. Each field is routed through the cheapest strategy that
//! can resolve it with confidence:
//!
//! - **Pattern**: deterministic, precedence-ranked rules (always first)
//! - **Grammar**: deterministic grammar parse for medium-band temporal fields
//! - **Enhancer**: one guarded generative call for residual low-confidence
//!   fields, never allowed to touch trusted results
//!
//! Results are aggregated into an [`Event`], validated across fields and
//! served through a content-addressed cache.
//!
//! # Example
//!
//! ```no_run
//! use eventparse::{ExtractionPipeline, ExtractionRequest, PipelineConfig};
//!
//! # async fn run() -> Result<(), eventparse::PipelineError> {
//! let pipeline = ExtractionPipeline::new(PipelineConfig::default());
//! let now = chrono::DateTime::parse_from_rfc3339("2025-03-12T09:00:00-05:00").unwrap();
//! let response = pipeline
//!     .extract(&ExtractionRequest::new("Team meeting tomorrow at 2pm in Room 4B", now))
//!     .await?;
//! assert_eq!(response.parsing_path.label(), "pattern_only");
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod enhance;
pub mod event;
pub mod extract;
pub mod normalize;
pub mod pipeline;

pub use cache::{CacheBackend, CacheStats, ResultCache};
pub use config::{ConfigError, PipelineConfig, ENHANCER_CEILING, HIGH_CONFIDENCE, LOCK_THRESHOLD};
pub use enhance::CommandSource;
pub use event::{Event, Field, FieldResult, FieldValue, ParsingPath, Source};
pub use extract::{Candidate, CandidateRequest, CandidateSource, SourceError};
pub use pipeline::{
    CancellationToken, ExtractionPipeline, ExtractionRequest, ExtractionResponse, PipelineError,
    ValidationError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
