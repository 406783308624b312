//! Array functions
//!
//! Higher-order: MAP, FILTER, FIND, SOME, EVERY, REDUCE, FLATMAP, COUNTIF
//! Plain: FLAT, UNIQUE, SORT
//!
//! Each closure call gets a child scope binding the lambda parameters to the
//! current item (and index, or accumulator for REDUCE). The caller's scope is
//! never touched, so a parameter may shadow a document field of the same name.

use super::evaluator::{
    operand_error, require_args, require_args_range, values_equal, Evaluator, Scope,
};
use super::parser::Expr;
use crate::error::{FormulaError, FormulaResult};
use crate::types::Value;
use std::cmp::Ordering;

/// A lambda argument split into its parts
struct Lambda<'e> {
    params: &'e [String],
    body: &'e Expr,
}

fn lambda_arg<'e>(func: &str, arg: &'e Expr, available: usize) -> FormulaResult<Lambda<'e>> {
    match arg {
        Expr::Closure { params, body } => {
            if params.len() > available {
                return Err(FormulaError::type_error(
                    func,
                    format!(
                        "lambda takes at most {} parameter(s), got {}",
                        available,
                        params.len()
                    ),
                ));
            }
            Ok(Lambda { params, body })
        }
        _ => Err(FormulaError::type_error(func, "expected a lambda argument")),
    }
}

impl Evaluator<'_> {
    /// Evaluate the collection argument; null counts as an empty array
    fn collection_arg(
        &mut self,
        func: &str,
        arg: &Expr,
        scope: &Scope<'_>,
    ) -> FormulaResult<Vec<Value>> {
        match self.evaluate(arg, scope)? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(operand_error(func, &[&other])),
        }
    }

    /// Invoke a lambda with positional arguments; extra arguments are dropped
    fn call_lambda(
        &mut self,
        lambda: &Lambda<'_>,
        values: Vec<Value>,
        scope: &Scope<'_>,
    ) -> FormulaResult<Value> {
        let bindings = lambda
            .params
            .iter()
            .cloned()
            .zip(values)
            .collect::<Vec<_>>();
        let child = scope.child(bindings);
        self.evaluate(lambda.body, &child)
    }

    /// Shared driver for the (item, index) lambda functions
    fn each_with_lambda<F>(
        &mut self,
        func: &str,
        args: &[Expr],
        scope: &Scope<'_>,
        mut visit: F,
    ) -> FormulaResult<()>
    where
        F: FnMut(Value, Value) -> FormulaResult<bool>,
    {
        require_args(func, args, 2)?;
        let items = self.collection_arg(func, &args[0], scope)?;
        let lambda = lambda_arg(func, &args[1], 2)?;
        for (index, item) in items.into_iter().enumerate() {
            let result = self.call_lambda(
                &lambda,
                vec![item.clone(), Value::Number(index as f64)],
                scope,
            )?;
            if !visit(item, result)? {
                break;
            }
        }
        Ok(())
    }

    /// MAP(array, (item[, index]) -> expr)
    pub(super) fn eval_map(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        let mut mapped = Vec::new();
        self.each_with_lambda("map", args, scope, |_, result| {
            mapped.push(result);
            Ok(true)
        })?;
        Ok(Value::Array(mapped))
    }

    /// FILTER(array, (item[, index]) -> condition)
    pub(super) fn eval_filter(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        let mut kept = Vec::new();
        self.each_with_lambda("filter", args, scope, |item, result| {
            if result.is_truthy() {
                kept.push(item);
            }
            Ok(true)
        })?;
        Ok(Value::Array(kept))
    }

    /// FIND(array, predicate): first match, or null
    pub(super) fn eval_find(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        let mut found = Value::Null;
        self.each_with_lambda("find", args, scope, |item, result| {
            if result.is_truthy() {
                found = item;
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found)
    }

    pub(super) fn eval_some(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        let mut any = false;
        self.each_with_lambda("some", args, scope, |_, result| {
            any = result.is_truthy();
            Ok(!any)
        })?;
        Ok(Value::Boolean(any))
    }

    /// EVERY(array, predicate): true for an empty array
    pub(super) fn eval_every(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        let mut all = true;
        self.each_with_lambda("every", args, scope, |_, result| {
            all = result.is_truthy();
            Ok(all)
        })?;
        Ok(Value::Boolean(all))
    }

    /// REDUCE(array, (acc, item[, index]) -> expr, initial)
    pub(super) fn eval_reduce(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("reduce", args, 3)?;
        let items = self.collection_arg("reduce", &args[0], scope)?;
        let lambda = lambda_arg("reduce", &args[1], 3)?;
        let mut acc = self.evaluate(&args[2], scope)?;
        for (index, item) in items.into_iter().enumerate() {
            acc = self.call_lambda(
                &lambda,
                vec![acc, item, Value::Number(index as f64)],
                scope,
            )?;
        }
        Ok(acc)
    }

    /// FLATMAP(array, lambda): array results are spliced in, scalars appended
    pub(super) fn eval_flat_map(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        let mut flattened = Vec::new();
        self.each_with_lambda("flatMap", args, scope, |_, result| {
            match result {
                Value::Array(items) => flattened.extend(items),
                other => flattened.push(other),
            }
            Ok(true)
        })?;
        Ok(Value::Array(flattened))
    }

    /// COUNTIF(array, criterion | predicate)
    ///
    /// A string criterion matches strings containing it (case-insensitive);
    /// numbers, booleans and null match exactly; mixed pairs compare their
    /// text forms.
    pub(super) fn eval_count_if(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        if matches!(args.get(1), Some(Expr::Closure { .. })) {
            let mut count = 0usize;
            self.each_with_lambda("countIf", args, scope, |_, result| {
                if result.is_truthy() {
                    count += 1;
                }
                Ok(true)
            })?;
            return Ok(Value::Number(count as f64));
        }

        require_args("countIf", args, 2)?;
        let items = self.collection_arg("countIf", &args[0], scope)?;
        let criterion = self.evaluate(&args[1], scope)?;
        let count = items
            .iter()
            .filter(|item| criterion_matches(item, &criterion))
            .count();
        Ok(Value::Number(count as f64))
    }

    /// FLAT(array, [depth = 1])
    pub(super) fn eval_flat(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args_range("flat", args, 1, 2)?;
        let items = self.collection_arg("flat", &args[0], scope)?;
        let depth = if args.len() > 1 {
            self.number_arg("flat", &args[1], scope)?
        } else {
            1.0
        };
        if depth < 0.0 || depth.fract() != 0.0 {
            return Err(FormulaError::domain("flat", "Depth must be a non-negative integer"));
        }
        let mut out = Vec::new();
        flatten_into(items, depth as usize, &mut out);
        Ok(Value::Array(out))
    }

    /// UNIQUE(array): first occurrence of each value, order preserved
    pub(super) fn eval_unique(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("unique", args, 1)?;
        let items = self.collection_arg("unique", &args[0], scope)?;
        let mut seen: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !seen.iter().any(|kept| values_equal(kept, &item)) {
                seen.push(item);
            }
        }
        Ok(Value::Array(seen))
    }

    /// SORT(array, [ascending = true]): numbers, strings or dates, not mixed
    pub(super) fn eval_sort(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args_range("sort", args, 1, 2)?;
        let mut items = self.collection_arg("sort", &args[0], scope)?;
        let ascending = if args.len() > 1 {
            self.evaluate(&args[1], scope)?.is_truthy()
        } else {
            true
        };

        if let Some(first) = items.first() {
            let kind = first.kind();
            let sortable = matches!(first, Value::Number(_) | Value::String(_) | Value::Date(_));
            if let Some(odd) = items.iter().find(|v| !sortable || v.kind() != kind) {
                return Err(operand_error("sort", &[first, odd]));
            }
        }

        items.sort_by(|a, b| {
            let ord = compare_sortable(a, b);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        Ok(Value::Array(items))
    }
}

fn criterion_matches(item: &Value, criterion: &Value) -> bool {
    match (item, criterion) {
        (Value::String(item), Value::String(needle)) => {
            item.to_lowercase().contains(&needle.to_lowercase())
        }
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Null, Value::Null) => true,
        (item, criterion) => item.to_string() == criterion.to_string(),
    }
}

fn flatten_into(items: Vec<Value>, depth: usize, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => flatten_into(inner, depth - 1, out),
            other => out.push(other),
        }
    }
}

fn compare_sortable(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::super::evaluator::tests::{eval, eval_with, num, text, MapResolver};
    use crate::error::FormulaError;
    use crate::types::Value;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn nums(values: &[f64]) -> Value {
        Value::Array(values.iter().map(|n| num(*n)).collect())
    }

    fn row(name: &str, qty: f64) -> Value {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), text(name));
        map.insert("qty".to_string(), num(qty));
        Value::Object(map)
    }

    #[test]
    fn test_map_filter() {
        assert_eq!(eval("map([1, 2, 3], (x) -> x * 2)").unwrap(), nums(&[2.0, 4.0, 6.0]));
        assert_eq!(eval("filter([1, 5, 8], x -> x > 4)").unwrap(), nums(&[5.0, 8.0]));
        assert_eq!(
            eval("map([10, 20], (item, i) -> item + i)").unwrap(),
            nums(&[10.0, 21.0])
        );
    }

    #[test]
    fn test_find_some_every() {
        assert_eq!(eval("find([1, 5, 8], (x) -> x > 4)").unwrap(), num(5.0));
        assert_eq!(eval("find([1, 2], (x) -> x > 4)").unwrap(), Value::Null);
        assert_eq!(eval("some([1, 2], (x) -> x == 2)").unwrap(), Value::Boolean(true));
        assert_eq!(eval("every([1, 2], (x) -> x > 1)").unwrap(), Value::Boolean(false));
        assert_eq!(eval("every([], (x) -> false)").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_find_short_circuits() {
        // The second element would divide by zero if visited
        assert_eq!(eval("find([1, 0], (x) -> 1 / x > 0)").unwrap(), num(1.0));
    }

    #[test]
    fn test_reduce() {
        assert_eq!(
            eval("reduce([1, 2, 3], (acc, x) -> acc + x, 0)").unwrap(),
            num(6.0)
        );
        assert_eq!(
            eval("reduce([\"a\", \"b\"], (acc, x, i) -> acc + x + i, \"\")").unwrap(),
            text("a0b1")
        );
        assert!(matches!(
            eval("reduce([1], (acc, x) -> acc + x)"),
            Err(FormulaError::Type { .. })
        ));
    }

    #[test]
    fn test_flat_map_and_flat() {
        assert_eq!(
            eval("flatMap([1, 2], (x) -> [x, x * 10])").unwrap(),
            nums(&[1.0, 10.0, 2.0, 20.0])
        );
        assert_eq!(eval("flat([1, [2, [3]]])").unwrap().to_string(), "1, 2, 3");
        assert_eq!(
            eval("flat([1, [2, [3]]], 1)").unwrap(),
            Value::Array(vec![num(1.0), num(2.0), nums(&[3.0])])
        );
        assert_eq!(eval("flat([1, [2, [3]]], 2)").unwrap(), nums(&[1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_count_if_criterion() {
        assert_eq!(
            eval("countIf([\"Apple\", \"pineapple\", \"kiwi\"], \"apple\")").unwrap(),
            num(2.0)
        );
        assert_eq!(eval("countIf([1, 2, 2, \"2\"], 2)").unwrap(), num(3.0));
        assert_eq!(eval("countIf([true, false, true], true)").unwrap(), num(2.0));
        assert_eq!(eval("countIf([null, 1], null)").unwrap(), num(1.0));
    }

    #[test]
    fn test_count_if_lambda() {
        assert_eq!(eval("countIf([1, 5, 9], (x) -> x > 3)").unwrap(), num(2.0));
    }

    #[test]
    fn test_unique_and_sort() {
        assert_eq!(eval("unique([3, 1, 3, 2, 1])").unwrap(), nums(&[3.0, 1.0, 2.0]));
        assert_eq!(eval("sort([3, 1, 2])").unwrap(), nums(&[1.0, 2.0, 3.0]));
        assert_eq!(eval("sort([3, 1, 2], false)").unwrap(), nums(&[3.0, 2.0, 1.0]));
        assert_eq!(
            eval("sort([\"b\", \"a\"])").unwrap(),
            Value::Array(vec![text("a"), text("b")])
        );
        assert!(matches!(eval("sort([1, \"a\"])"), Err(FormulaError::Type { .. })));
    }

    #[test]
    fn test_null_collection_is_empty() {
        let mut resolver = MapResolver::with(&[("tags", Value::Null)]);
        assert_eq!(
            eval_with("map({tags}, (t) -> t)", &mut resolver).unwrap(),
            Value::Array(vec![])
        );
        assert!(matches!(eval("map(5, (x) -> x)"), Err(FormulaError::Type { .. })));
    }

    #[test]
    fn test_lambda_argument_checks() {
        assert!(matches!(eval("map([1], 2)"), Err(FormulaError::Type { .. })));
        assert!(matches!(
            eval("map([1], (a, b, c) -> a)"),
            Err(FormulaError::Type { .. })
        ));
    }

    #[test]
    fn test_lambda_parameter_shadows_field() {
        let mut resolver = MapResolver::with(&[("x", num(100.0)), ("items", nums(&[1.0, 2.0]))]);
        assert_eq!(
            eval_with("map({items}, (x) -> x + 1)", &mut resolver).unwrap(),
            nums(&[2.0, 3.0])
        );
        // Outside the lambda the field is visible again
        assert_eq!(
            eval_with("sum(map({items}, (x) -> x)) + x", &mut resolver).unwrap(),
            num(103.0)
        );
    }

    #[test]
    fn test_nested_lambdas_see_outer_parameters() {
        assert_eq!(
            eval("map([1, 2], (a) -> sum(map([10, 20], (b) -> a * b)))").unwrap(),
            nums(&[30.0, 60.0])
        );
    }

    #[test]
    fn test_table_rows_in_lambdas() {
        let mut resolver = MapResolver::with(&[(
            "products",
            Value::Array(vec![row("Pen", 3.0), row("Ink", 0.0)]),
        )]);
        assert_eq!(
            eval_with("map(filter({products}, (r) -> r.qty > 0), (r) -> r.name)", &mut resolver)
                .unwrap(),
            Value::Array(vec![text("Pen")])
        );
    }
}
