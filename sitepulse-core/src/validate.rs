//! Schema validation collaborator seam.
//!
//! Payload schemas are an external contract. The handler only needs a
//! pass/fail with structured details it can mirror into a 400 response.

use crate::entities::EventKind;
use jsonschema::JSONSchema;
use serde::Serialize;
use sitepulse_sdk::objects::EventPayload;
use std::collections::HashMap;

/// One validation failure, mirroring the validator's error shape.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationDetail {
    /// JSON pointer to the offending payload element.
    pub path: String,
    pub message: String,
}

/// The payload did not satisfy the schema for its kind.
#[derive(Debug, Clone, thiserror::Error)]
#[error("payload failed schema validation")]
pub struct ValidationFailure {
    pub details: Vec<ValidationDetail>,
}

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, kind: EventKind, payload: &EventPayload) -> Result<(), ValidationFailure>;
}

/// A configured schema document failed to compile.
#[derive(Debug, thiserror::Error)]
#[error("invalid schema for {kind}: {message}")]
pub struct SchemaCompileError {
    pub kind: EventKind,
    pub message: String,
}

/// [`SchemaValidator`] backed by JSON Schema documents, one per kind.
/// Kinds without a configured schema pass untouched.
#[derive(Default)]
pub struct JsonSchemaValidator {
    schemas: HashMap<EventKind, JSONSchema>,
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(
        mut self,
        kind: EventKind,
        schema: serde_json::Value,
    ) -> Result<Self, SchemaCompileError> {
        // jsonschema ties the compiled schema to the document's lifetime;
        // schemas are installed once per process, so leak the document.
        let schema: &'static serde_json::Value = Box::leak(Box::new(schema));
        let compiled = JSONSchema::options()
            .compile(schema)
            .map_err(|e| SchemaCompileError {
                kind,
                message: e.to_string(),
            })?;
        self.schemas.insert(kind, compiled);
        Ok(self)
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, kind: EventKind, payload: &EventPayload) -> Result<(), ValidationFailure> {
        let Some(schema) = self.schemas.get(&kind) else {
            return Ok(());
        };
        let instance = serde_json::Value::Object(payload.clone());
        if let Err(errors) = schema.validate(&instance) {
            let details = errors
                .map(|error| ValidationDetail {
                    path: error.instance_path.to_string(),
                    message: error.to_string(),
                })
                .collect();
            return Err(ValidationFailure { details });
        }
        Ok(())
    }
}
