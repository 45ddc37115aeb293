//! Optional JSON Schema gate on submitted job data.

use std::fmt;

use jsonschema::Validator;
use serde_json::Value;

use crate::error::ApiError;

/// A compiled job schema together with the document it was compiled from.
pub struct JobSchema {
    raw: Value,
    validator: Validator,
}

impl fmt::Debug for JobSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSchema").field("raw", &self.raw).finish()
    }
}

impl JobSchema {
    /// Compile `raw`. A document that is not a valid schema is a bad request.
    pub fn compile(raw: Value) -> Result<Self, ApiError> {
        let validator = jsonschema::validator_for(&raw)
            .map_err(|e| ApiError::bad_request(format!("invalid job schema: {e}")))?;
        Ok(Self { raw, validator })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Check `data` against the schema, reporting every violation.
    pub fn check(&self, data: &Value) -> Result<(), ApiError> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(data)
            .map(|e| {
                let at = e.instance_path.to_string();
                if at.is_empty() {
                    e.to_string()
                } else {
                    format!("{e} (at {at})")
                }
            })
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(violations.join("; ")))
        }
    }
}
