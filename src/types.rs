use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{FormulaError, FormulaResult};

//==============================================================================
// Values
//==============================================================================

/// A value flowing through the formula engine
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Array(Vec<Value>),
    /// A keyed record, e.g. one table row (column id -> cell)
    Object(BTreeMap<String, Value>),
    Date(DateTime<Utc>),
    Null,
    /// An error carried as a value. Never stored inside a container: reading
    /// one during evaluation turns it back into an `Err`.
    Error(FormulaError),
}

impl Value {
    /// Lowercase kind name used in type error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Date(_) => "date",
            Value::Null => "null",
            Value::Error(_) => "error",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean coercion used by conditions, `and`/`or`/`not` and predicates
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Date(_) => true,
            Value::Null | Value::Error(_) => false,
        }
    }

    /// What `empty()` considers empty. Zero and `false` count as empty.
    pub fn is_empty_value(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Number(n) => *n == 0.0,
            Value::Boolean(b) => !*b,
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            Value::Date(_) | Value::Error(_) => false,
        }
    }

    /// Turn an error value back into an `Err`
    pub fn into_result(self) -> FormulaResult<Value> {
        match self {
            Value::Error(err) => Err(err),
            other => Ok(other),
        }
    }
}

/// Format a number the way fields display it: integral values without decimals
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
            Value::Object(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Date(d) => write!(f, "{}", d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Value::Null => write!(f, "null"),
            Value::Error(err) => write!(f, "Error: {}", err),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

//==============================================================================
// Field metadata
//==============================================================================

/// Host field type, used to pick the blank value shown when a formula fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    #[default]
    Text,
    Textarea,
    Number,
    Date,
    Dropdown,
    MultiSelect,
    Table,
    Other,
}

impl FieldKind {
    pub fn default_value(&self) -> Value {
        match self {
            FieldKind::Text | FieldKind::Textarea | FieldKind::Dropdown => {
                Value::String(String::new())
            }
            FieldKind::Number => Value::Number(0.0),
            FieldKind::MultiSelect | FieldKind::Table => Value::Array(Vec::new()),
            FieldKind::Date | FieldKind::Other => Value::Null,
        }
    }
}

/// A table column: rows are keyed by `id`, references may use `id` or `title`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

impl ColumnDef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}
