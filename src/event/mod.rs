//! Event data model
//!
//! - **Field / FieldValue**: what is being extracted and its typed value
//! - **FieldResult**: one field's value with source stage, confidence and span
//! - **Event**: the aggregated record returned to callers
//! - **ParsingPath**: which stages actually ran

mod field;
mod model;

pub use field::{confidence_of, Field, FieldMap, FieldResult, FieldValue, Source, Span, MAX_DURATION_MINUTES};
pub use model::{Event, ParsingPath};
