//! Result aggregation
//!
//! - **ResultAggregator**: builds the [`crate::Event`], scores it and decides
//!   whether it needs confirmation
//! - **validate_cross_fields**: pure consistency pass over the result map

mod aggregator;
mod validate;

pub use aggregator::{overall_confidence, Aggregation, ResultAggregator};
pub use validate::validate_cross_fields;
