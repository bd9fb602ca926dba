use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::codec::JobRequestCandidate;
use crate::config::DispatcherConfig;

/// Error produced when a candidate cannot become a [`JobRequest`].
///
/// Validation failures are candidate-level: sibling candidates from the
/// same record are still evaluated. Recovery requires the message producer
/// to fix the payload.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ValidationError {
    /// The candidate is not a JSON object.
    #[error("job request is not a JSON object")]
    NotAnObject,
    /// A required field is absent, empty, or not a string.
    #[error("required field `{0}` is missing or empty")]
    MissingField(&'static str),
    /// An optional field is present with an unusable value.
    #[error("field `{field}` has an invalid value: {detail}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        detail: String,
    },
}

/// Validated, defaulted description of one compute job to submit.
///
/// Constructed from a decoded candidate by [`JobRequest::validate`];
/// consumed once by the submitter; not persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Analysis pipeline the job should run.
    pub pipeline: String,
    /// Location of the job's input data.
    pub input: String,
    /// Location the job should write results to.
    pub output: String,
    /// Identifier of the pre-registered compute job template.
    pub job_definition: String,
    /// Target compute queue.
    pub job_queue: String,
    /// Memory requirement in MiB.
    pub job_memory_mib: u64,
    /// vCPU requirement.
    pub job_vcpus: u32,
}

impl JobRequest {
    /// Validate a candidate and fill absent optional fields from the
    /// process configuration.
    ///
    /// `pipeline`, `input`, and `output` must be present as non-empty
    /// strings. `job_definition`, `job_queue`, `job_memory` and `job_vcpu`
    /// fall back to the configured defaults when absent; when present with
    /// the wrong JSON type they are rejected rather than forwarded for the
    /// scheduler to reject later. Unknown fields are ignored.
    pub fn validate(
        candidate: &JobRequestCandidate,
        config: &DispatcherConfig,
    ) -> Result<Self, ValidationError> {
        let fields = candidate
            .value()
            .as_object()
            .ok_or(ValidationError::NotAnObject)?;

        Ok(Self {
            pipeline: required_string(fields, "pipeline")?,
            input: required_string(fields, "input")?,
            output: required_string(fields, "output")?,
            job_definition: optional_string(fields, "job_definition")?
                .unwrap_or_else(|| config.default_job_definition.clone()),
            job_queue: optional_string(fields, "job_queue")?
                .unwrap_or_else(|| config.default_job_queue.clone()),
            job_memory_mib: optional_u64(fields, "job_memory")?
                .unwrap_or(config.default_job_memory_mib),
            job_vcpus: match optional_u64(fields, "job_vcpu")? {
                Some(v) => u32::try_from(v).map_err(|_| {
                    ValidationError::InvalidField {
                        field: "job_vcpu",
                        detail: format!("value {} out of range", v),
                    }
                })?,
                None => config.default_job_vcpus,
            },
        })
    }
}

fn required_string(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<String, ValidationError> {
    match fields.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | None => Err(ValidationError::MissingField(name)),
        Some(other) => Err(ValidationError::InvalidField {
            field: name,
            detail: format!("expected a string, got {}", other),
        }),
    }
}

fn optional_string(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, ValidationError> {
    match fields.get(name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ValidationError::InvalidField {
            field: name,
            detail: format!("expected a string, got {}", other),
        }),
    }
}

fn optional_u64(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<u64>, ValidationError> {
    match fields.get(name) {
        None => Ok(None),
        Some(value) => match value.as_u64() {
            Some(n) => Ok(Some(n)),
            None => Err(ValidationError::InvalidField {
                field: name,
                detail: format!("expected a non-negative integer, got {}", value),
            }),
        },
    }
}
