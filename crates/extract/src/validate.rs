//! Runtime shape checks for model output.
//!
//! A [`Shape`] is a static description of the fields a pipeline reads. Checking stops at
//! the first missing or mistyped field and names it. Arrays are only checked for
//! array-ness unless the rule asks for an array of strings. Failures in the typed
//! deserialization that follows are reported at their JSON path.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    String,
    NonEmptyString,
    Bool,
    Number,
    Array,
    StringArray,
    Object,
    /// An object, an explicit `null`, or no key at all.
    OptionalObject,
}

impl Kind {
    fn describe(self) -> &'static str {
        match self {
            Kind::String => "expected string",
            Kind::NonEmptyString => "expected non-empty string",
            Kind::Bool => "expected boolean",
            Kind::Number => "expected number",
            Kind::Array => "expected array",
            Kind::StringArray => "expected array of strings",
            Kind::Object => "expected object",
            Kind::OptionalObject => "expected object or null",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Kind::String => value.is_string(),
            Kind::NonEmptyString => value.as_str().is_some_and(|s| !s.is_empty()),
            Kind::Bool => value.is_boolean(),
            Kind::Number => value.is_number(),
            Kind::Array => value.is_array(),
            Kind::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Kind::Object => value.is_object(),
            Kind::OptionalObject => value.is_object() || value.is_null(),
        }
    }

    fn may_be_absent(self) -> bool {
        matches!(self, Kind::OptionalObject)
    }
}

/// One rule: a dotted path from the root object and the kind expected there.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub path: &'static str,
    pub kind: Kind,
}

impl Field {
    pub const fn new(path: &'static str, kind: Kind) -> Self {
        Self { path, kind }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl Shape {
    pub const fn new(name: &'static str, fields: &'static [Field]) -> Self {
        Self { name, fields }
    }

    pub fn check(&self, value: &Value) -> Result<(), PipelineError> {
        if !value.is_object() {
            return Err(PipelineError::schema(
                self.name,
                "response is not an object",
            ));
        }

        'fields: for field in self.fields {
            let mut current = value;
            let mut walked = 0;
            for segment in field.path.split('.') {
                walked += segment.len() + 1;
                let reached = &field.path[..walked - 1];
                let Some(object) = current.as_object() else {
                    return Err(PipelineError::schema(reached, "expected object"));
                };
                match object.get(segment) {
                    Some(next) => current = next,
                    None if reached == field.path && field.kind.may_be_absent() => {
                        continue 'fields;
                    }
                    None => return Err(PipelineError::schema(reached, "field is missing")),
                }
            }
            if !field.kind.accepts(current) {
                return Err(PipelineError::schema(field.path, field.kind.describe()));
            }
        }
        Ok(())
    }
}

/// Check `value` against `shape`, then deserialize it into the typed result.
///
/// A deserialization failure names the JSON path it happened at, such as
/// `product_matching[0].compliance_score`, or the shape name when it is at the root.
pub fn validate_into<T: DeserializeOwned>(value: Value, shape: &Shape) -> Result<T, PipelineError> {
    shape.check(&value)?;
    serde_path_to_error::deserialize(value).map_err(|e| {
        let path = e.path().to_string();
        let field = if path == "." { shape.name.to_string() } else { path };
        PipelineError::schema(field, e.into_inner().to_string())
    })
}
