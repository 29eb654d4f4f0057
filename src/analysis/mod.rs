//! Pre-extraction analysis
//!
//! - **FieldExtractabilityAnalyzer**: cheap lexical scan predicting, per
//!   field, a confidence band and the strategy likely to resolve it
//! - **ProcessingOrderPlanner**: turns estimates into a dependency-respecting
//!   plan with a concurrent pattern-only batch and a sequential queue

mod extractability;
mod planner;

pub use extractability::{ConfidenceBand, FieldExtractabilityAnalyzer, FieldExtractabilityEstimate};
pub use planner::{ExecutionPlan, PlannedField, ProcessingOrderPlanner};
