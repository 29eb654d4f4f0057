//! Field extraction strategies
//!
//! - **pattern**: deterministic rule table, always runs first
//! - **grammar**: deterministic grammar parse for medium-confidence temporal fields
//! - **source**: the narrow candidate interface shared by grammar and enhancer
//! - **lexicon / temporal**: shared vocabulary and the temporal rule scan

pub mod grammar;
pub mod lexicon;
pub mod pattern;
pub mod source;
pub mod temporal;

pub use grammar::GrammarBackupExtractor;
pub use pattern::PatternExtractor;
pub use source::{Candidate, CandidateRequest, CandidateSource, MockSource, SourceError};
