//! Last-resort generative enhancement
//!
//! - **GuardedEnhancer**: timeout, single retry, schema check and confidence
//!   cap around any [`crate::extract::CandidateSource`]
//! - **ResidualInput**: the only thing the enhancer is ever shown
//! - **CommandSource**: subprocess provider speaking a JSON line protocol

mod command;
mod guarded;

pub use command::CommandSource;
pub use guarded::{EnhancerFailure, GuardedEnhancer, ResidualInput};
