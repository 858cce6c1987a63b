//! Schemas, typed values and rows.
//!
//! A [`Schema`] is an ordered list of named, typed fields. A [`Row`] is an
//! immutable tuple of [`Value`]s that has been checked against a schema when it
//! was built, so every row that reaches the codec is already well formed.
//!
//! ## Types
//!
//! | type      | Rust value | on-disk size (fixed format)   |
//! |-----------|------------|-------------------------------|
//! | `BOOLEAN` | `bool`     | 1 byte                        |
//! | `INTEGER` | `i64`      | 8 bytes, big-endian           |
//! | `FLOAT`   | `f64`      | 8 bytes, IEEE-754 big-endian  |
//! | `VARCHAR` | `String`   | 2-byte length + UTF-8 bytes   |

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Maximum UTF-8 byte length of a `VARCHAR` value.
pub const MAX_VARCHAR_LEN: usize = u16::MAX as usize;

/// Primitive column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// `true` / `false`.
    Boolean,
    /// 64-bit signed integer.
    Integer,
    /// IEEE-754 double.
    Float,
    /// UTF-8 string of at most 65,535 bytes.
    Varchar,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::Varchar => "VARCHAR",
        };
        f.write_str(name)
    }
}

/// A named column in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Whether the column may hold [`Value::Null`].
    #[serde(default)]
    pub nullable: bool,
}

impl Field {
    /// Creates a non-nullable field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(), data_type, nullable: false }
    }

    /// Creates a nullable field.
    pub fn nullable(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(), data_type, nullable: true }
    }
}

/// Ordered mapping from field name to type and nullability.
///
/// Immutable once built. Serializes as a JSON array of fields so that an
/// external loader can produce one from a description file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Builds a schema, rejecting duplicate or empty field names.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.name.is_empty() {
                return Err(Error::invalid_argument("field name must not be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::invalid_argument(format!(
                    "duplicate field name: {}",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Fields in declared order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Checks a tuple of values against this schema.
    ///
    /// Fails with `SchemaMismatch` on wrong arity, a null in a non-nullable
    /// field, a value of the wrong type, or an over-long `VARCHAR`.
    pub fn check(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(Error::schema_mismatch(format!(
                "expected {} values, got {}",
                self.fields.len(),
                values.len()
            )));
        }

        for (field, value) in self.fields.iter().zip(values) {
            match value.data_type() {
                None if field.nullable => {}
                None => {
                    return Err(Error::schema_mismatch(format!(
                        "field '{}' is not nullable",
                        field.name
                    )));
                }
                Some(actual) if actual != field.data_type => {
                    return Err(Error::schema_mismatch(format!(
                        "field '{}' expects {}, got {}",
                        field.name, field.data_type, actual
                    )));
                }
                Some(_) => {}
            }

            if let Value::Varchar(s) = value {
                if s.len() > MAX_VARCHAR_LEN {
                    return Err(Error::schema_mismatch(format!(
                        "field '{}' is {} bytes, max is {}",
                        field.name,
                        s.len(),
                        MAX_VARCHAR_LEN
                    )));
                }
            }
        }

        Ok(())
    }
}

impl TryFrom<Vec<Field>> for Schema {
    type Error = Error;

    fn try_from(fields: Vec<Field>) -> Result<Self> {
        Schema::new(fields)
    }
}

impl From<Schema> for Vec<Field> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

/// A single typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// The absent-value marker.
    Null,
    /// A `BOOLEAN` value.
    Boolean(bool),
    /// An `INTEGER` value.
    Integer(i64),
    /// A `FLOAT` value.
    Float(f64),
    /// A `VARCHAR` value.
    Varchar(String),
}

impl Value {
    /// The type of this value, or `None` for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::Varchar(_) => Some(DataType::Varchar),
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) => Some(s),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            // Non-finite floats have no JSON form and render as null.
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Varchar(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// An immutable tuple of values conforming to a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Row {
    /// Builds a row, type-checking `values` against `schema`.
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self> {
        schema.check(&values)?;
        Ok(Self { schema, values })
    }

    /// The schema this row was checked against.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Values in schema order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Value at a position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of a named field.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    /// `(field name, value)` pairs in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema.fields().iter().map(|f| f.name.as_str()).zip(self.values.iter())
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Renders the row as a JSON object keyed by field name, in schema order.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
