//! Host document interface
//!
//! The engine never owns field storage. It reads values and formulas through
//! a `DocumentProvider` and hands computed values back to it.

use crate::types::{ColumnDef, FieldKind, Value};

/// Document model the engine computes against
pub trait DocumentProvider {
    /// Current stored value of a field.
    ///
    /// Known fields without a value return `Some(Value::Null)`; `None` means
    /// the field does not exist (unless it carries a formula).
    fn field_value(&self, id: &str) -> Option<Value>;

    /// Raw expression text if the field is a formula field
    fn field_formula(&self, id: &str) -> Option<String>;

    /// Every field that carries a formula
    fn all_formula_field_identifiers(&self) -> Vec<String>;

    /// Called once per recomputed formula field with its display value
    fn push_computed_value(&mut self, id: &str, value: Value);

    /// Store a raw value written by the host through the engine
    fn set_field_value(&mut self, id: &str, value: Value);

    /// Field type, used to pick the blank value shown for failed formulas
    fn field_kind(&self, _id: &str) -> FieldKind {
        FieldKind::Other
    }

    /// Table columns, so references may name a column by id or title
    fn field_columns(&self, _id: &str) -> Vec<ColumnDef> {
        Vec::new()
    }

    /// Whether the field exists at all
    fn has_field(&self, id: &str) -> bool {
        self.field_value(id).is_some() || self.field_formula(id).is_some()
    }
}
