//! Reference resolution
//!
//! `select_path` walks the segments of a reference path into a field value.
//! `DocumentResolver` looks up the root field in the host document and, when
//! that field is itself a formula, evaluates it first through the shared cache.

use super::cache::{ExpressionCache, FormulaCache};
use super::formula::{Evaluator, FieldResolver, PathSegment, ReferencePath, Scope};
use super::provider::DocumentProvider;
use crate::config::EngineConfig;
use crate::error::{FormulaError, FormulaResult};
use crate::types::{ColumnDef, Value};
use std::collections::BTreeMap;
use tracing::trace;

/// Select `segments` out of `value`.
///
/// - index on an array: that element (out of range is an invalid reference)
/// - key on an array: column projection, null for rows without the key
/// - key on an object: that entry, or null
/// - anything on null: null, except an index
/// - anything on a scalar: invalid reference
///
/// The first key is matched against `columns` by id or title when columns
/// are defined; an unknown column is then an invalid reference.
pub fn select_path(
    value: Value,
    segments: &[PathSegment],
    path: &ReferencePath,
    columns: &[ColumnDef],
) -> FormulaResult<Value> {
    let mut current = value.into_result()?;
    let mut columns = columns;

    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Index(index), Value::Array(items)) => items
                .into_iter()
                .nth(*index)
                .ok_or_else(|| FormulaError::invalid_reference(path.to_string()))?,
            (PathSegment::Index(_), _) => {
                return Err(FormulaError::invalid_reference(path.to_string()))
            }
            (PathSegment::Key(key), Value::Array(rows)) => {
                let key = column_key(key, columns, path)?;
                Value::Array(
                    rows.into_iter()
                        .map(|row| match row {
                            Value::Object(mut map) => take_key(&mut map, &key),
                            _ => Value::Null,
                        })
                        .collect(),
                )
            }
            (PathSegment::Key(key), Value::Object(mut map)) => {
                let key = column_key(key, columns, path)?;
                take_key(&mut map, &key)
            }
            (PathSegment::Key(_), Value::Null) => Value::Null,
            (PathSegment::Key(_), _) => {
                return Err(FormulaError::invalid_reference(path.to_string()))
            }
        };
        if matches!(segment, PathSegment::Key(_)) {
            columns = &[];
        }
    }

    Ok(current)
}

/// Map a column id or title to the key rows are stored under
fn column_key(key: &str, columns: &[ColumnDef], path: &ReferencePath) -> FormulaResult<String> {
    if columns.is_empty() {
        return Ok(key.to_string());
    }
    columns
        .iter()
        .find(|c| c.id == key)
        .or_else(|| {
            columns
                .iter()
                .find(|c| c.id.eq_ignore_ascii_case(key) || c.title.eq_ignore_ascii_case(key))
        })
        .map(|c| c.id.clone())
        .ok_or_else(|| FormulaError::invalid_reference(path.to_string()))
}

/// Exact key first, then a case-insensitive match
fn take_key(map: &mut BTreeMap<String, Value>, key: &str) -> Value {
    if let Some(value) = map.remove(key) {
        return value;
    }
    let found = map.keys().find(|k| k.eq_ignore_ascii_case(key)).cloned();
    found
        .and_then(|k| map.remove(&k))
        .unwrap_or(Value::Null)
}

/// Resolver backed by a host document and the engine's caches.
///
/// Tracks the chain of formula fields currently being evaluated, so a field
/// that reaches itself again reports the cycle instead of recursing. Nested
/// formulas share one expression depth budget with the evaluation that
/// reached them.
///
/// A result shaped by a nesting limit depends on where evaluation started,
/// so neither it nor any result built from it is cached.
pub struct DocumentResolver<'a, P: DocumentProvider + ?Sized> {
    provider: &'a P,
    cache: &'a mut FormulaCache,
    expressions: &'a mut ExpressionCache,
    config: &'a EngineConfig,
    in_progress: Vec<String>,
    limited: bool,
}

impl<'a, P: DocumentProvider + ?Sized> DocumentResolver<'a, P> {
    pub fn new(
        provider: &'a P,
        cache: &'a mut FormulaCache,
        expressions: &'a mut ExpressionCache,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            expressions,
            config,
            in_progress: Vec::new(),
            limited: false,
        }
    }

    /// Result of a formula field: cached, or evaluated and then cached
    pub fn evaluate_field(&mut self, id: &str) -> FormulaResult<Value> {
        self.evaluate_field_at(id, 0)
    }

    fn evaluate_field_at(&mut self, id: &str, depth: usize) -> FormulaResult<Value> {
        if let Some(result) = self.cache.get(id) {
            return result;
        }

        if let Some(start) = self.in_progress.iter().position(|f| f == id) {
            let mut cycle = self.in_progress[start..].to_vec();
            cycle.push(id.to_string());
            return Err(FormulaError::CircularReference { cycle });
        }

        if self.in_progress.len() >= self.config.max_reference_depth {
            self.limited = true;
            return Err(FormulaError::type_error(
                id,
                format!(
                    "formula references nested deeper than {} fields",
                    self.config.max_reference_depth
                ),
            ));
        }

        let formula = match self.provider.field_formula(id) {
            Some(formula) => formula,
            None => return Err(FormulaError::invalid_reference(id)),
        };

        trace!(field = id, formula = %formula, "evaluating");
        let parsed = self
            .expressions
            .get_or_parse(id, &formula, self.config.max_depth);

        let outer_limited = std::mem::take(&mut self.limited);
        self.in_progress.push(id.to_string());
        let result = match parsed {
            Ok(expr) => {
                let max_depth = self.config.max_depth;
                let mut evaluator = Evaluator::with_depth(self, max_depth, depth);
                let result = evaluator.evaluate(&expr, &Scope::root());
                let exceeded = evaluator.depth_exceeded();
                // Past the top level the budget was partly spent by the caller
                if exceeded && depth > 0 {
                    self.limited = true;
                }
                result
            }
            Err(err) => Err(err),
        };
        self.in_progress.pop();

        self.cache.record_evaluation();
        if self.limited {
            trace!(field = id, "nesting limit hit, result not cached");
        } else {
            self.cache.store(id, result.clone());
        }
        self.limited |= outer_limited;
        result
    }

    /// Evaluate an ad-hoc expression against the document, without caching it
    pub fn evaluate_expression(&mut self, expression: &str) -> FormulaResult<Value> {
        let expr = super::formula::parse_with_depth(expression, self.config.max_depth)?;
        let max_depth = self.config.max_depth;
        Evaluator::new(self, max_depth).evaluate(&expr, &Scope::root())
    }
}

impl<P: DocumentProvider + ?Sized> FieldResolver for DocumentResolver<'_, P> {
    fn resolve_field(&mut self, path: &ReferencePath, depth: usize) -> FormulaResult<Value> {
        let id = path.root.as_str();
        let value = if self.provider.field_formula(id).is_some() {
            self.evaluate_field_at(id, depth)?
        } else {
            self.provider
                .field_value(id)
                .ok_or_else(|| FormulaError::invalid_reference(path.to_string()))?
        };

        if path.segments.is_empty() {
            return value.into_result();
        }
        let columns = self.provider.field_columns(id);
        select_path(value, &path.segments, path, &columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(cells: &[(&str, Value)]) -> Value {
        Value::Object(
            cells
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn table() -> Value {
        Value::Array(vec![
            row(&[("c1", Value::from("Pen")), ("c2", Value::from(2.0))]),
            row(&[("c1", Value::from("Ink"))]),
        ])
    }

    fn select(value: Value, path: &str, columns: &[ColumnDef]) -> FormulaResult<Value> {
        let path = ReferencePath::parse(path).unwrap();
        select_path(value, &path.segments, &path, columns)
    }

    #[test]
    fn test_whole_row_and_cell() {
        assert_eq!(
            select(table(), "t.1", &[]).unwrap(),
            row(&[("c1", Value::from("Ink"))])
        );
        assert_eq!(select(table(), "t.0.c2", &[]).unwrap(), Value::from(2.0));
    }

    #[test]
    fn test_column_projection_fills_null() {
        assert_eq!(
            select(table(), "t.c2", &[]).unwrap(),
            Value::Array(vec![Value::from(2.0), Value::Null])
        );
    }

    #[test]
    fn test_columns_by_title() {
        let columns = vec![ColumnDef::new("c1", "Item"), ColumnDef::new("c2", "Qty")];
        assert_eq!(
            select(table(), "t.0.qty", &columns).unwrap(),
            Value::from(2.0)
        );
        assert_eq!(
            select(table(), "t.Item", &columns).unwrap(),
            Value::Array(vec![Value::from("Pen"), Value::from("Ink")])
        );
        assert!(matches!(
            select(table(), "t.price", &columns),
            Err(FormulaError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_invalid_paths() {
        assert!(matches!(
            select(table(), "t.5", &[]),
            Err(FormulaError::InvalidReference { .. })
        ));
        assert!(matches!(
            select(Value::from(3.0), "n.x", &[]),
            Err(FormulaError::InvalidReference { .. })
        ));
        assert_eq!(select(Value::Null, "t.x", &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_error_value_is_returned_as_err() {
        let err = FormulaError::invalid_reference("gone");
        assert_eq!(select(Value::Error(err.clone()), "t", &[]), Err(err));
    }
}
