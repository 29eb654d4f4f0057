//! Request, response and error types at the pipeline boundary

use crate::config::ExtractionConfig;
use crate::event::{Event, Field, FieldResult, ParsingPath};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Malformed or oversized input. The only failure that aborts a request
/// before any extraction runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("text is empty")]
    EmptyText,

    #[error("text is {len} characters, limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("secondary text is {len} characters, limit is {max}")]
    SecondaryTooLong { len: usize, max: usize },

    #[error("field subset names no event attribute")]
    EmptyFieldSubset,

    #[error("timezone is empty")]
    EmptyTimezone,
}

/// Errors that escape [`super::ExtractionPipeline::extract`]
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Request cancelled")]
    Cancelled,
}

/// Input contract from the serving layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_text: Option<String>,
    /// "Now" for relative expressions; its offset is the event's offset.
    pub reference_time: DateTime<FixedOffset>,
    pub timezone: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Restrict extraction to these fields. `None` means every attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_subset: Option<Vec<Field>>,
    /// Include per-field results in the response.
    #[serde(default)]
    pub audit_mode: bool,
}

fn default_locale() -> String {
    "en".to_string()
}

impl ExtractionRequest {
    /// A request in the reference time's own offset, English locale.
    pub fn new(text: impl Into<String>, reference_time: DateTime<FixedOffset>) -> Self {
        Self {
            text: text.into(),
            secondary_text: None,
            reference_time,
            timezone: reference_time.offset().to_string(),
            locale: default_locale(),
            field_subset: None,
            audit_mode: false,
        }
    }

    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary_text = Some(secondary.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.field_subset = Some(fields);
        self
    }

    pub fn with_audit(mut self) -> Self {
        self.audit_mode = true;
        self
    }

    /// Requested event attributes in field order. Duration is internal and
    /// is dropped from an explicit subset.
    pub fn requested_fields(&self) -> Vec<Field> {
        let wanted = |f: &Field| {
            f.is_event_attribute()
                && self
                    .field_subset
                    .as_ref()
                    .map_or(true, |subset| subset.contains(f))
        };
        Field::ALL.iter().copied().filter(wanted).collect()
    }

    /// Check input limits. Lengths are counted in characters.
    pub fn validate(&self, limits: &ExtractionConfig) -> Result<(), ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        let len = self.text.chars().count();
        if len > limits.max_input_chars {
            return Err(ValidationError::TextTooLong {
                len,
                max: limits.max_input_chars,
            });
        }
        if let Some(secondary) = &self.secondary_text {
            let len = secondary.chars().count();
            if len > limits.max_secondary_chars {
                return Err(ValidationError::SecondaryTooLong {
                    len,
                    max: limits.max_secondary_chars,
                });
            }
        }
        if self.timezone.trim().is_empty() {
            return Err(ValidationError::EmptyTimezone);
        }
        if self.requested_fields().is_empty() {
            return Err(ValidationError::EmptyFieldSubset);
        }
        Ok(())
    }
}

/// Output contract to the serving layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResponse {
    pub request_id: Uuid,
    pub event: Event,
    /// Per-field results, only in audit mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_results: Option<Vec<FieldResult>>,
    pub overall_confidence: f64,
    pub parsing_path: ParsingPath,
    pub processing_time_ms: u64,
    pub cache_hit: bool,
    pub warnings: Vec<String>,
    pub needs_confirmation: bool,
    pub unconfirmed_fields: Vec<Field>,
}

impl ExtractionResponse {
    pub fn result_for(&self, field: Field) -> Option<&FieldResult> {
        self.field_results
            .as_ref()
            .and_then(|results| results.iter().find(|r| r.field == field))
    }
}
