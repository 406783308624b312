//! YAML-backed document model
//!
//! A document is a list of fields, each with a type, an optional stored value,
//! an optional formula and, for tables, column definitions.
//!
//! ```yaml
//! fields:
//!   - id: age
//!     type: number
//!     value: 20
//!   - id: adult
//!     formula: "{age} >= 18"
//! ```

use crate::core::formula::extract_date;
use crate::core::DocumentProvider;
use crate::error::{DocumentError, DocumentResult};
use crate::types::{format_number, ColumnDef, FieldKind, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// One field as written in the YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Deserialize)]
struct DocumentFile {
    #[serde(default)]
    fields: Vec<FieldSpec>,
}

/// A loaded field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: String,
    pub kind: FieldKind,
    pub value: Value,
    pub formula: Option<String>,
    pub columns: Vec<ColumnDef>,
}

/// In-memory document, fields kept in file order
#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(content: &str) -> DocumentResult<Self> {
        let file: DocumentFile = serde_yaml::from_str(content)?;
        let mut document = Document::new();
        for spec in file.fields {
            document.add_field(spec)?;
        }
        Ok(document)
    }

    pub fn load(path: &Path) -> DocumentResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Add a field. Ids must be unique and usable inside a reference.
    pub fn add_field(&mut self, spec: FieldSpec) -> DocumentResult<()> {
        validate_id(&spec.id)?;
        if self.index.contains_key(&spec.id) {
            return Err(DocumentError::Validation(format!(
                "Duplicate field id '{}'",
                spec.id
            )));
        }

        let value = match &spec.value {
            Some(yaml) => value_from_yaml(yaml, spec.kind).map_err(|e| {
                DocumentError::Validation(format!("Field '{}': {}", spec.id, e))
            })?,
            None => Value::Null,
        };

        self.index.insert(spec.id.clone(), self.fields.len());
        self.fields.push(Field {
            id: spec.id,
            kind: spec.kind,
            value,
            formula: spec.formula,
            columns: spec.columns,
        });
        Ok(())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.index.get(id).map(|&i| &self.fields[i])
    }

    fn field_mut(&mut self, id: &str) -> Option<&mut Field> {
        match self.index.get(id) {
            Some(&i) => self.fields.get_mut(i),
            None => None,
        }
    }

    /// Replace or clear the formula of an existing field
    pub fn set_formula(&mut self, id: &str, formula: Option<String>) -> DocumentResult<()> {
        let field = self
            .field_mut(id)
            .ok_or_else(|| DocumentError::Validation(format!("Unknown field '{}'", id)))?;
        field.formula = formula;
        Ok(())
    }

    /// Remove a field, returning it
    pub fn remove_field(&mut self, id: &str) -> Option<Field> {
        let position = self.index.remove(id)?;
        let field = self.fields.remove(position);
        for (i, f) in self.fields.iter().enumerate().skip(position) {
            self.index.insert(f.id.clone(), i);
        }
        Some(field)
    }
}

fn validate_id(id: &str) -> DocumentResult<()> {
    let invalid = id.is_empty()
        || id.chars().all(|c| c.is_ascii_digit())
        || id
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '.' | '{' | '}' | '(' | ')' | '"'));
    if invalid {
        return Err(DocumentError::Validation(format!(
            "Invalid field id '{}'",
            id
        )));
    }
    Ok(())
}

impl DocumentProvider for Document {
    fn field_value(&self, id: &str) -> Option<Value> {
        self.field(id).map(|f| f.value.clone())
    }

    fn field_formula(&self, id: &str) -> Option<String> {
        self.field(id).and_then(|f| f.formula.clone())
    }

    fn all_formula_field_identifiers(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.formula.is_some())
            .map(|f| f.id.clone())
            .collect()
    }

    fn push_computed_value(&mut self, id: &str, value: Value) {
        if let Some(field) = self.field_mut(id) {
            field.value = value;
        }
    }

    /// Writes to unknown ids create an untyped field
    fn set_field_value(&mut self, id: &str, value: Value) {
        match self.field_mut(id) {
            Some(field) => field.value = value,
            None => {
                self.index.insert(id.to_string(), self.fields.len());
                self.fields.push(Field {
                    id: id.to_string(),
                    kind: FieldKind::Other,
                    value,
                    formula: None,
                    columns: Vec::new(),
                });
            }
        }
    }

    fn field_kind(&self, id: &str) -> FieldKind {
        self.field(id).map(|f| f.kind).unwrap_or(FieldKind::Other)
    }

    fn field_columns(&self, id: &str) -> Vec<ColumnDef> {
        self.field(id).map(|f| f.columns.clone()).unwrap_or_default()
    }
}

/// Convert a YAML value. Strings in date fields become dates when they parse.
pub fn value_from_yaml(yaml: &serde_yaml::Value, kind: FieldKind) -> DocumentResult<Value> {
    use serde_yaml::Value as Yaml;

    let value = match yaml {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Boolean(*b),
        Yaml::Number(n) => match n.as_f64() {
            Some(n) => Value::Number(n),
            None => {
                return Err(DocumentError::Validation(format!(
                    "Number out of range: {}",
                    n
                )))
            }
        },
        Yaml::String(s) => {
            if kind == FieldKind::Date {
                match extract_date(&Value::String(s.clone())) {
                    Some(date) => Value::Date(date),
                    None => Value::String(s.clone()),
                }
            } else {
                Value::String(s.clone())
            }
        }
        Yaml::Sequence(items) => Value::Array(
            items
                .iter()
                .map(|item| value_from_yaml(item, FieldKind::Other))
                .collect::<DocumentResult<Vec<_>>>()?,
        ),
        Yaml::Mapping(map) => {
            let mut object = BTreeMap::new();
            for (key, value) in map {
                let key = match key {
                    Yaml::String(s) => s.clone(),
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    _ => {
                        return Err(DocumentError::Validation(
                            "Mapping keys must be scalars".to_string(),
                        ))
                    }
                };
                object.insert(key, value_from_yaml(value, FieldKind::Other)?);
            }
            Value::Object(object)
        }
        Yaml::Tagged(tagged) => value_from_yaml(&tagged.value, kind)?,
    };
    Ok(value)
}

/// Read a value typed on the command line: YAML scalars, flow sequences and
/// mappings. Anything that does not parse is taken as a plain string.
pub fn parse_value_text(text: &str) -> Value {
    serde_yaml::from_str::<serde_yaml::Value>(text)
        .ok()
        .and_then(|yaml| value_from_yaml(&yaml, FieldKind::Other).ok())
        .unwrap_or_else(|| Value::String(text.to_string()))
}

/// JSON rendering for machine-readable output
pub fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::String(s) => Json::String(s.clone()),
        Value::Boolean(b) => Json::Bool(*b),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Object(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
        Value::Date(_) => Json::String(value.to_string()),
        Value::Null => Json::Null,
        Value::Error(err) => serde_json::json!({ "error": err.to_string() }),
    }
}

/// Short human-readable rendering: strings quoted, arrays bracketed
pub fn describe_value(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        Value::String(s) => format!("{:?}", s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(describe_value).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, describe_value(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        other => other.to_string(),
    }
}
