//! Job descriptor parsing and validation.
//!
//! A queue message body looks like:
//!
//! ```json
//! {
//!   "workflow": { "<node id>": { "class_type": "...", "inputs": { ... } } },
//!   "inputs":   { "face.png": "https://example.com/face.png" },
//!   "s3_url":   "s3://bucket/renders/out.png"
//! }
//! ```
//!
//! `inputs` is optional. Parsing has no side effects, so a rejected job
//! never touches the workspace or the network.

use serde_json::{Map, Value};

use crate::error::JobError;
use crate::types::MessageId;
use crate::workflow::Workflow;

/// Body field holding the workflow graph.
pub const FIELD_WORKFLOW: &str = "workflow";

/// Body field holding the input staging map.
pub const FIELD_INPUTS: &str = "inputs";

/// Body field holding the destination locator.
pub const FIELD_DESTINATION: &str = "s3_url";

/// One file to stage into the input directory before execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// File name inside the input directory, exactly as the workflow
    /// references it.
    pub filename: String,
    /// Where to fetch the bytes from.
    pub source: String,
}

/// A validated render job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: MessageId,
    pub workflow: Workflow,
    /// Inputs in document order.
    pub inputs: Vec<InputFile>,
    pub destination: String,
}

impl Job {
    /// Parse and validate a raw message body.
    pub fn parse(id: impl Into<MessageId>, body: &str) -> Result<Self, JobError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| JobError::Malformed(format!("Body is not valid JSON: {e}")))?;
        Self::from_value(id, value)
    }

    /// Validate an already-decoded job document.
    pub fn from_value(id: impl Into<MessageId>, value: Value) -> Result<Self, JobError> {
        let Value::Object(mut obj) = value else {
            return Err(JobError::Malformed("Body must be a JSON object".into()));
        };

        let workflow = obj
            .remove(FIELD_WORKFLOW)
            .ok_or_else(|| JobError::Malformed(format!("Missing required field '{FIELD_WORKFLOW}'")))
            .and_then(Workflow::from_value)?;

        let destination = require_string_field(&obj, FIELD_DESTINATION)?;

        let inputs = match obj.remove(FIELD_INPUTS) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(map)) => parse_inputs(map)?,
            Some(_) => {
                return Err(JobError::Malformed(format!(
                    "'{FIELD_INPUTS}' must be a JSON object"
                )))
            }
        };

        Ok(Self {
            id: id.into(),
            workflow,
            inputs,
            destination,
        })
    }
}

/// Helper: ensure an object has a non-empty string field and return it trimmed.
fn require_string_field(obj: &Map<String, Value>, field: &str) -> Result<String, JobError> {
    match obj.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(_) => Err(JobError::Malformed(format!(
            "Field '{field}' must be a non-empty string"
        ))),
        None => Err(JobError::Malformed(format!(
            "Missing required field '{field}'"
        ))),
    }
}

fn parse_inputs(map: Map<String, Value>) -> Result<Vec<InputFile>, JobError> {
    map.into_iter()
        .map(|(filename, source)| {
            validate_filename(&filename)?;
            match source {
                Value::String(s) if !s.trim().is_empty() => Ok(InputFile {
                    filename,
                    source: s.trim().to_string(),
                }),
                _ => Err(JobError::Malformed(format!(
                    "Input '{filename}' must map to a non-empty locator string"
                ))),
            }
        })
        .collect()
}

/// Input names must be a single plain path component so staging stays
/// inside the input directory.
fn validate_filename(name: &str) -> Result<(), JobError> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(JobError::Malformed(format!(
            "Invalid input filename '{name}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SCENARIO_A: &str = r#"{
        "workflow": {"1": {"class_type": "Save", "inputs": {}}},
        "s3_url": "s3://bucket/out.png"
    }"#;

    #[test]
    fn parses_minimal_job() {
        let job = Job::parse("msg-1", SCENARIO_A).unwrap();
        assert_eq!(job.id, "msg-1");
        assert_eq!(job.destination, "s3://bucket/out.png");
        assert_eq!(job.workflow.len(), 1);
        assert!(job.inputs.is_empty());
    }

    #[test]
    fn inputs_keep_document_order() {
        let body = r#"{
            "workflow": {"1": {"class_type": "LoadImage", "inputs": {"image": "b.png"}}},
            "inputs": {"b.png": "s3://in/b.png", "a.png": "https://example.com/a.png"},
            "s3_url": "s3://bucket/out.png"
        }"#;
        let job = Job::parse("msg-2", body).unwrap();
        let names: Vec<_> = job.inputs.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["b.png", "a.png"]);
        assert_eq!(job.inputs[1].source, "https://example.com/a.png");
    }

    #[test]
    fn null_inputs_treated_as_empty() {
        let body = r#"{"workflow": {"1": {"class_type": "Save"}}, "inputs": null, "s3_url": "s3://b/k"}"#;
        assert!(Job::parse("m", body).unwrap().inputs.is_empty());
    }

    #[test]
    fn rejects_invalid_json() {
        assert_matches!(Job::parse("m", "{not json"), Err(JobError::Malformed(_)));
    }

    #[test]
    fn rejects_non_object_body() {
        assert_matches!(Job::parse("m", "[]"), Err(JobError::Malformed(_)));
    }

    #[test]
    fn rejects_missing_workflow() {
        let result = Job::parse("m", r#"{"s3_url": "s3://b/k"}"#);
        assert_matches!(result, Err(JobError::Malformed(msg)) if msg.contains("workflow"));
    }

    #[test]
    fn rejects_missing_destination() {
        let result = Job::parse("m", r#"{"workflow": {"1": {"class_type": "Save"}}}"#);
        assert_matches!(result, Err(JobError::Malformed(msg)) if msg.contains("s3_url"));
    }

    #[test]
    fn rejects_blank_destination() {
        let body = r#"{"workflow": {"1": {"class_type": "Save"}}, "s3_url": "   "}"#;
        assert_matches!(Job::parse("m", body), Err(JobError::Malformed(_)));
    }

    #[test]
    fn rejects_non_object_inputs() {
        let body = r#"{"workflow": {"1": {"class_type": "Save"}}, "inputs": ["a"], "s3_url": "s3://b/k"}"#;
        assert_matches!(Job::parse("m", body), Err(JobError::Malformed(_)));
    }

    #[test]
    fn rejects_non_string_input_locator() {
        let body = r#"{"workflow": {"1": {"class_type": "Save"}}, "inputs": {"a.png": 5}, "s3_url": "s3://b/k"}"#;
        assert_matches!(Job::parse("m", body), Err(JobError::Malformed(_)));
    }

    #[test]
    fn rejects_path_traversal_in_input_names() {
        for name in ["../etc/passwd", "sub/dir.png", "..", "", "a\\b.png"] {
            let body = serde_json::json!({
                "workflow": {"1": {"class_type": "Save"}},
                "inputs": {name: "s3://b/k"},
                "s3_url": "s3://b/out.png"
            });
            assert_matches!(
                Job::from_value("m", body),
                Err(JobError::Malformed(_)),
                "name {name:?} should be rejected"
            );
        }
    }
}
