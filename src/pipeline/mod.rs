//! The extraction pipeline and its request/response boundary

mod cancel;
mod orchestrator;
mod types;

pub use cancel::CancellationToken;
pub use orchestrator::ExtractionPipeline;
pub use types::{ExtractionRequest, ExtractionResponse, PipelineError, ValidationError};
