//! Explicit payload schemas
//!
//! Schemas are plain data built in code by workflow builders. There is
//! no reflection and no external schema language: a [`Schema`] is a map
//! of field names to [`FieldSpec`]s, and a spec is a kind plus whatever
//! constraints apply to that kind.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The declared shape of a step payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Field name → specification
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    /// Create an empty schema (accepts only the empty object)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field specification
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the schema declares no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The kind of value a field accepts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// UTF-8 string
    String,
    /// Integer (JSON number with no fractional part)
    Integer,
    /// Floating-point number
    Number,
    /// Boolean
    Boolean,
    /// Homogeneous array of the given item spec
    Array(Box<FieldSpec>),
    /// Nested object validated against its own schema
    Object(Box<Schema>),
}

/// Specification for one field: its kind plus the constraints that
/// apply to that kind. Irrelevant constraints are simply ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// The value kind
    pub kind: FieldKind,
    /// Whether the field may be absent
    #[serde(default)]
    pub optional: bool,
    /// Value substituted into the validated output when absent.
    /// A field with a default is implicitly optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Enumerated allowed values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Value>>,
    /// Numeric lower bound (integers and numbers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Numeric upper bound (integers and numbers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Minimum length (strings and arrays)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    /// Maximum length (strings and arrays)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

impl FieldSpec {
    fn of_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            optional: false,
            default: None,
            one_of: None,
            min: None,
            max: None,
            min_len: None,
            max_len: None,
        }
    }

    /// A required string field
    pub fn string() -> Self {
        Self::of_kind(FieldKind::String)
    }

    /// A required integer field
    pub fn integer() -> Self {
        Self::of_kind(FieldKind::Integer)
    }

    /// A required number field
    pub fn number() -> Self {
        Self::of_kind(FieldKind::Number)
    }

    /// A required boolean field
    pub fn boolean() -> Self {
        Self::of_kind(FieldKind::Boolean)
    }

    /// A required array field with the given item spec
    pub fn array(items: FieldSpec) -> Self {
        Self::of_kind(FieldKind::Array(Box::new(items)))
    }

    /// A required nested object field
    pub fn object(schema: Schema) -> Self {
        Self::of_kind(FieldKind::Object(Box::new(schema)))
    }

    /// Mark the field as optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Give the field a default. The field becomes optional: the
    /// default fills the validated output when the raw input omits it.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.optional = true;
        self
    }

    /// Restrict the field to an enumerated set of values
    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.one_of = Some(values);
        self
    }

    /// Set a numeric lower bound
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Set a numeric upper bound
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Set a minimum length for strings or arrays
    pub fn min_len(mut self, len: usize) -> Self {
        self.min_len = Some(len);
        self
    }

    /// Set a maximum length for strings or arrays
    pub fn max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }
}
