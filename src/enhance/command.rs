//! External generative enhancer over a JSON line protocol
//!
//! Each call spawns the configured command, writes one JSON
//! [`CandidateRequest`] line to its stdin and reads one JSON response line
//! from its stdout. The response is either a bare candidate array or an
//! object:
//!
//! ```json
//! {"candidates": [{"field": "start", "value": {"type": "date_time", "value": "2025-03-18T19:00:00"}, "confidence": 0.6}]}
//! {"error": {"message": "model overloaded", "transient": true}}
//! ```

use crate::config::EnhancerConfig;
use crate::extract::{Candidate, CandidateRequest, CandidateSource, SourceError};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireResponse {
    Bare(Vec<Candidate>),
    Envelope {
        #[serde(default)]
        candidates: Vec<Candidate>,
        #[serde(default)]
        error: Option<WireError>,
    },
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
    #[serde(default)]
    transient: bool,
}

/// A [`CandidateSource`] backed by an external process.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from `enhancer.command`. `None` when no command is configured.
    pub fn from_config(config: &EnhancerConfig) -> Option<Self> {
        let (program, args) = config.command.as_ref()?.split_first()?;
        Some(Self::new(program.clone(), args.to_vec(), config.timeout()))
    }
}

#[async_trait]
impl CandidateSource for CommandSource {
    fn name(&self) -> &str {
        &self.program
    }

    async fn candidates(&self, request: &CandidateRequest) -> Result<Vec<Candidate>, SourceError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SourceError::Unavailable(format!("Failed to start {}: {}", self.program, e)))?;

        let request_json = serde_json::to_string(request)
            .map_err(|e| SourceError::Unavailable(format!("Failed to serialize request: {}", e)))?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| SourceError::Unavailable("No stdin available".to_string()))?;
            stdin
                .write_all(request_json.as_bytes())
                .await
                .map_err(|e| SourceError::Transient(format!("Failed to write request: {}", e)))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| SourceError::Transient(format!("Failed to write newline: {}", e)))?;
            stdin
                .flush()
                .await
                .map_err(|e| SourceError::Transient(format!("Failed to flush stdin: {}", e)))?;
        }
        // Close stdin so one-shot commands see EOF.
        drop(child.stdin.take());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Unavailable("No stdout available".to_string()))?;
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();

        let read = timeout(self.timeout, reader.read_line(&mut line)).await;
        let _ = child.start_kill();

        match read {
            Ok(Ok(0)) => Err(SourceError::Transient(format!("{} closed stdout without a response", self.program))),
            Ok(Ok(_)) => {
                debug!(program = %self.program, bytes = line.len(), "enhancer response received");
                parse_response(&line)
            }
            Ok(Err(e)) => Err(SourceError::Transient(format!("Failed to read response: {}", e))),
            Err(_) => Err(SourceError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

fn parse_response(line: &str) -> Result<Vec<Candidate>, SourceError> {
    let response: WireResponse = serde_json::from_str(line.trim())
        .map_err(|e| SourceError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    match response {
        WireResponse::Bare(candidates) => Ok(candidates),
        WireResponse::Envelope { error: Some(error), .. } if error.transient => {
            Err(SourceError::Transient(error.message))
        }
        WireResponse::Envelope { error: Some(error), .. } => Err(SourceError::Unavailable(error.message)),
        WireResponse::Envelope { candidates, .. } => Ok(candidates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Field, FieldValue};

    #[test]
    fn parses_bare_array() {
        let line = r#"[{"field":"title","value":{"type":"text","value":"Dinner"},"confidence":0.6}]"#;
        let out = parse_response(line).unwrap();
        assert_eq!(out, vec![Candidate::new(Field::Title, FieldValue::Text("Dinner".into()), 0.6)]);
    }

    #[test]
    fn parses_envelope() {
        let line = r#"{"candidates":[{"field":"duration","value":{"type":"minutes","value":90},"confidence":0.5}]}"#;
        let out = parse_response(line).unwrap();
        assert_eq!(out[0].value, FieldValue::Minutes(90));
    }

    #[test]
    fn envelope_error_maps_to_source_error() {
        let transient = parse_response(r#"{"error":{"message":"busy","transient":true}}"#).unwrap_err();
        assert_eq!(transient, SourceError::Transient("busy".into()));

        let fatal = parse_response(r#"{"error":{"message":"no model"}}"#).unwrap_err();
        assert!(matches!(fatal, SourceError::Unavailable(_)));
    }

    #[test]
    fn garbage_is_invalid_response() {
        let err = parse_response("definitely not json").unwrap_err();
        assert!(matches!(err, SourceError::InvalidResponse(_)));
    }

    #[test]
    fn from_config_requires_a_command() {
        let mut config = EnhancerConfig::default();
        config.command = None;
        assert!(CommandSource::from_config(&config).is_none());

        config.command = Some(vec!["enhancer".into(), "--json".into()]);
        let source = CommandSource::from_config(&config).unwrap();
        assert_eq!(source.name(), "enhancer");
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let source = CommandSource::new(
            "/nonexistent/eventparse-enhancer",
            Vec::new(),
            Duration::from_millis(200),
        );
        let reference = chrono::NaiveDate::from_ymd_opt(2025, 3, 12)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let request = CandidateRequest::new("dinner", vec![Field::Start], reference);

        let err = source.candidates(&request).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }
}
