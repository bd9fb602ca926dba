use serde_json::Value;
use thiserror::Error;

/// Error produced when a record body cannot be decoded into candidates.
///
/// A `DecodeError` is attributable to the whole queue record: no candidate
/// is extracted and the record is left for the queue's redelivery and
/// dead-letter policy.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not syntactically valid JSON.
    #[error("record body is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),
    /// The body parsed, but the top-level value is neither an object nor
    /// an array.
    #[error("record body decoded to {shape}, expected an object or an array")]
    UnexpectedShape {
        /// Human-readable name of the offending JSON shape.
        shape: &'static str,
    },
}

/// One element extracted from a record body, not yet validated.
///
/// Candidates preserve the order they appeared in the body so outcomes can
/// be reported against their original positions.
#[derive(Clone, Debug, PartialEq)]
pub struct JobRequestCandidate {
    value: Value,
}

impl JobRequestCandidate {
    /// Wrap a raw JSON value as a candidate.
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// The raw JSON value of this candidate.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Decode a raw record body into job request candidates.
///
/// A JSON object yields exactly one candidate; a JSON array yields one
/// candidate per element, in array order. Any other top-level shape
/// (scalar, null, malformed syntax) yields [`DecodeError`].
///
/// This is a pure function over the input bytes.
pub fn decode(raw_body: &[u8]) -> Result<Vec<JobRequestCandidate>, DecodeError> {
    let parsed: Value = serde_json::from_slice(raw_body)?;
    match parsed {
        Value::Object(_) => Ok(vec![JobRequestCandidate::new(parsed)]),
        Value::Array(items) => {
            Ok(items.into_iter().map(JobRequestCandidate::new).collect())
        }
        other => Err(DecodeError::UnexpectedShape {
            shape: json_shape(&other),
        }),
    }
}

fn json_shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
