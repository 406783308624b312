//! Formula evaluator
//!
//! Walks an AST and produces a `Value` or the first `FormulaError` raised in
//! evaluation order. Field lookups go through a `FieldResolver`; closure
//! parameters live in a chain of `Scope`s that borrow their parent.

use super::dates::add_millis;
use super::parser::{Expr, InfixOp, PrefixOp, ReferencePath};
use crate::core::resolver::select_path;
use crate::error::{FormulaError, FormulaResult};
use crate::types::Value;

/// Source of document field values for reference nodes
pub trait FieldResolver {
    /// Resolve a reference whose root is not bound in any scope.
    ///
    /// `depth` is the evaluator's nesting depth at the reference; a resolver
    /// that evaluates another formula continues from it.
    fn resolve_field(&mut self, path: &ReferencePath, depth: usize) -> FormulaResult<Value>;
}

/// Closure parameter bindings, chained to the enclosing scope.
///
/// Child scopes shadow their parent without copying or mutating it.
#[derive(Debug, Default)]
pub struct Scope<'p> {
    parent: Option<&'p Scope<'p>>,
    bindings: Vec<(String, Value)>,
}

impl<'p> Scope<'p> {
    /// The root scope has no bindings; every name resolves against the document
    pub fn root() -> Self {
        Self {
            parent: None,
            bindings: Vec::new(),
        }
    }

    pub fn child(&'p self, bindings: Vec<(String, Value)>) -> Scope<'p> {
        Scope {
            parent: Some(self),
            bindings,
        }
    }

    /// Innermost binding for `name`
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }
}

/// Tree-walking evaluator
pub struct Evaluator<'r> {
    resolver: &'r mut dyn FieldResolver,
    max_depth: usize,
    depth: usize,
    depth_exceeded: bool,
}

impl<'r> Evaluator<'r> {
    pub fn new(resolver: &'r mut dyn FieldResolver, max_depth: usize) -> Self {
        Self::with_depth(resolver, max_depth, 0)
    }

    /// Evaluator that starts `depth` levels deep, sharing `max_depth` with
    /// the evaluation that referenced it
    pub fn with_depth(
        resolver: &'r mut dyn FieldResolver,
        max_depth: usize,
        depth: usize,
    ) -> Self {
        Self {
            resolver,
            max_depth,
            depth,
            depth_exceeded: false,
        }
    }

    /// Whether an evaluation ran into `max_depth`
    pub fn depth_exceeded(&self) -> bool {
        self.depth_exceeded
    }

    /// Evaluate an expression in the given scope
    pub fn evaluate(&mut self, expr: &Expr, scope: &Scope<'_>) -> FormulaResult<Value> {
        if self.depth >= self.max_depth {
            self.depth_exceeded = true;
            return Err(FormulaError::type_error(
                "evaluate",
                format!("expression nested deeper than {} levels", self.max_depth),
            ));
        }
        self.depth += 1;
        let result = self.evaluate_node(expr, scope);
        self.depth -= 1;
        result
    }

    fn evaluate_node(&mut self, expr: &Expr, scope: &Scope<'_>) -> FormulaResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),

            Expr::Reference(path) => self.evaluate_reference(path, scope),

            Expr::Prefix { op, operand } => {
                let value = self.evaluate(operand, scope)?;
                evaluate_prefix_op(*op, &value)
            }

            Expr::Infix { op, left, right } => match op {
                InfixOp::And => {
                    let l = self.evaluate(left, scope)?;
                    if !l.is_truthy() {
                        return Ok(Value::Boolean(false));
                    }
                    Ok(Value::Boolean(self.evaluate(right, scope)?.is_truthy()))
                }
                InfixOp::Or => {
                    let l = self.evaluate(left, scope)?;
                    if l.is_truthy() {
                        return Ok(Value::Boolean(true));
                    }
                    Ok(Value::Boolean(self.evaluate(right, scope)?.is_truthy()))
                }
                _ => {
                    let l = self.evaluate(left, scope)?;
                    let r = self.evaluate(right, scope)?;
                    evaluate_infix_op(*op, &l, &r)
                }
            },

            Expr::FunctionCall { name, args } => self.call_function(name, args, scope),

            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|item| self.evaluate(item, scope))
                    .collect::<FormulaResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }

            Expr::Index { target, index } => {
                let target = self.evaluate(target, scope)?;
                let index = self.evaluate(index, scope)?;
                evaluate_index(target, &index)
            }

            Expr::Closure { .. } => Err(FormulaError::type_error(
                "lambda",
                "a lambda can only be passed to an array function",
            )),
        }
    }

    /// Closure bindings win over document fields of the same name
    fn evaluate_reference(
        &mut self,
        path: &ReferencePath,
        scope: &Scope<'_>,
    ) -> FormulaResult<Value> {
        if let Some(bound) = scope.lookup(&path.root) {
            return select_path(bound.clone(), &path.segments, path, &[]);
        }
        self.resolver.resolve_field(path, self.depth)?.into_result()
    }

    /// Evaluate a function call. Names are case-insensitive.
    fn call_function(
        &mut self,
        name: &str,
        args: &[Expr],
        scope: &Scope<'_>,
    ) -> FormulaResult<Value> {
        let lower_name = name.to_lowercase();

        match lower_name.as_str() {
            // ═══════════════════════════════════════════════════════════════════
            // LOGICAL FUNCTIONS
            // ═══════════════════════════════════════════════════════════════════
            "and" => self.eval_and(args, scope),
            "or" => self.eval_or(args, scope),
            "not" => self.eval_not(args, scope),
            "if" => self.eval_if(args, scope),
            "empty" => self.eval_empty(args, scope),

            // ═══════════════════════════════════════════════════════════════════
            // TEXT FUNCTIONS
            // ═══════════════════════════════════════════════════════════════════
            "concat" => self.eval_concat(args, scope),
            "contains" => self.eval_contains(args, scope),
            "length" => self.eval_length(args, scope),
            "upper" | "lower" => self.eval_case(&lower_name, args, scope),
            "trim" => self.eval_trim(args, scope),
            "join" => self.eval_join(args, scope),
            "tonumber" => self.eval_to_number(args, scope),
            "tostring" => self.eval_to_string(args, scope),
            "equals" => self.eval_equals(args, scope),

            // ═══════════════════════════════════════════════════════════════════
            // MATH FUNCTIONS
            // ═══════════════════════════════════════════════════════════════════
            "sum" => self.eval_sum(args, scope),
            "max" | "min" => self.eval_extremum(&lower_name, args, scope),
            "avg" | "average" => self.eval_average(&lower_name, args, scope),
            "count" => self.eval_count(args, scope),
            "pow" => self.eval_pow(args, scope),
            "sqrt" => self.eval_sqrt(args, scope),
            "mod" => self.eval_mod(args, scope),
            "ceil" | "floor" => self.eval_ceil_floor(&lower_name, args, scope),
            "round" => self.eval_round(args, scope),

            // ═══════════════════════════════════════════════════════════════════
            // DATE FUNCTIONS
            // ═══════════════════════════════════════════════════════════════════
            "date" => self.eval_date(args, scope),
            "now" => self.eval_now(args),
            "year" | "month" | "day" => self.eval_date_part(&lower_name, args, scope),
            "dateadd" => self.eval_date_add(args, scope, 1.0),
            "datesubtract" => self.eval_date_add(args, scope, -1.0),
            "timestamp" => self.eval_timestamp(args, scope),

            // ═══════════════════════════════════════════════════════════════════
            // ARRAY FUNCTIONS
            // ═══════════════════════════════════════════════════════════════════
            "map" => self.eval_map(args, scope),
            "filter" => self.eval_filter(args, scope),
            "find" => self.eval_find(args, scope),
            "some" => self.eval_some(args, scope),
            "every" => self.eval_every(args, scope),
            "reduce" => self.eval_reduce(args, scope),
            "flatmap" => self.eval_flat_map(args, scope),
            "countif" => self.eval_count_if(args, scope),
            "flat" => self.eval_flat(args, scope),
            "unique" => self.eval_unique(args, scope),
            "sort" => self.eval_sort(args, scope),

            _ => Err(FormulaError::type_error(name, "unknown function")),
        }
    }

    /// Evaluate every argument in order, stopping at the first error
    pub(super) fn evaluate_args(
        &mut self,
        args: &[Expr],
        scope: &Scope<'_>,
    ) -> FormulaResult<Vec<Value>> {
        args.iter().map(|arg| self.evaluate(arg, scope)).collect()
    }

    /// Evaluate an argument that must be a number
    pub(super) fn number_arg(
        &mut self,
        func: &str,
        arg: &Expr,
        scope: &Scope<'_>,
    ) -> FormulaResult<f64> {
        match self.evaluate(arg, scope)? {
            Value::Number(n) => Ok(n),
            other => Err(operand_error(func, &[&other])),
        }
    }

    /// Evaluate an argument that must be a string
    pub(super) fn string_arg(
        &mut self,
        func: &str,
        arg: &Expr,
        scope: &Scope<'_>,
    ) -> FormulaResult<String> {
        match self.evaluate(arg, scope)? {
            Value::String(s) => Ok(s),
            other => Err(operand_error(func, &[&other])),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATORS
// ═══════════════════════════════════════════════════════════════════════════════

fn evaluate_prefix_op(op: PrefixOp, operand: &Value) -> FormulaResult<Value> {
    match (op, operand) {
        (PrefixOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (PrefixOp::Neg, other) => Err(operand_error("-", &[other])),
        (PrefixOp::Not, value) => Ok(Value::Boolean(!value.is_truthy())),
    }
}

fn evaluate_infix_op(op: InfixOp, left: &Value, right: &Value) -> FormulaResult<Value> {
    let symbol = op.symbol();
    match op {
        InfixOp::Add => match (left, right) {
            (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", left, right)))
            }
            (Value::Date(d), Value::Number(ms)) | (Value::Number(ms), Value::Date(d)) => {
                Ok(Value::Date(add_millis(symbol, *d, *ms)?))
            }
            _ => Err(operand_error(symbol, &[left, right])),
        },
        InfixOp::Sub => match (left, right) {
            (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l - r)),
            (Value::Date(l), Value::Date(r)) => {
                Ok(Value::Number((*l - *r).num_milliseconds() as f64))
            }
            (Value::Date(d), Value::Number(ms)) => Ok(Value::Date(add_millis(symbol, *d, -ms)?)),
            _ => Err(operand_error(symbol, &[left, right])),
        },
        InfixOp::Mul => match (left, right) {
            (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l * r)),
            _ => Err(operand_error(symbol, &[left, right])),
        },
        InfixOp::Div => match (left, right) {
            (Value::Number(_), Value::Number(r)) if *r == 0.0 => {
                Err(FormulaError::domain(symbol, "Division by zero"))
            }
            (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l / r)),
            _ => Err(operand_error(symbol, &[left, right])),
        },
        InfixOp::Eq => Ok(Value::Boolean(equals_operator(left, right))),
        InfixOp::NotEq => Ok(Value::Boolean(!equals_operator(left, right))),
        InfixOp::Lt | InfixOp::Gt | InfixOp::LtEq | InfixOp::GtEq => {
            let ordering = match (left, right) {
                (Value::Number(l), Value::Number(r)) => l.partial_cmp(r),
                (Value::Date(l), Value::Date(r)) => Some(l.cmp(r)),
                _ => None,
            };
            let result = match ordering {
                None => false,
                Some(ord) => match op {
                    InfixOp::Lt => ord.is_lt(),
                    InfixOp::Gt => ord.is_gt(),
                    InfixOp::LtEq => ord.is_le(),
                    _ => ord.is_ge(),
                },
            };
            Ok(Value::Boolean(result))
        }
        // Short-circuited in `evaluate_node`; this arm covers direct callers
        InfixOp::And => Ok(Value::Boolean(left.is_truthy() && right.is_truthy())),
        InfixOp::Or => Ok(Value::Boolean(left.is_truthy() || right.is_truthy())),
    }
}

/// `==` semantics: a multi-value left side against a scalar tests membership
fn equals_operator(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Array(items), scalar) if !matches!(scalar, Value::Array(_) | Value::Object(_)) => {
            items.iter().any(|item| values_equal(item, scalar))
        }
        _ => values_equal(left, right),
    }
}

/// Strict, type-aware equality. Containers never compare equal.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => (l - r).abs() < 1e-10,
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::Date(l), Value::Date(r)) => l == r,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}

fn evaluate_index(target: Value, index: &Value) -> FormulaResult<Value> {
    match (target, index) {
        (Value::Array(items), Value::Number(n)) => {
            let len = items.len();
            if *n < 0.0 || n.fract() != 0.0 {
                return Err(FormulaError::invalid_reference(format!("[{}]", n)));
            }
            items
                .into_iter()
                .nth(*n as usize)
                .ok_or_else(|| {
                    FormulaError::invalid_reference(format!("[{}] of {} items", n, len))
                })
        }
        (Value::Object(mut map), Value::String(key)) => {
            Ok(map.remove(key).unwrap_or(Value::Null))
        }
        (target, index) => Err(operand_error("[]", &[&target, index])),
    }
}

/// Type error naming the operand kinds, e.g. `Type error in +: number, boolean`
pub(super) fn operand_error(operation: &str, operands: &[&Value]) -> FormulaError {
    let kinds: Vec<&str> = operands.iter().map(|v| v.kind()).collect();
    FormulaError::type_error(operation, kinds.join(", "))
}

/// Check argument count
pub(super) fn require_args(func: &str, args: &[Expr], count: usize) -> FormulaResult<()> {
    if args.len() != count {
        return Err(FormulaError::type_error(
            func,
            format!("expected {} argument(s), got {}", count, args.len()),
        ));
    }
    Ok(())
}

/// Check argument count range
pub(super) fn require_args_range(
    func: &str,
    args: &[Expr],
    min: usize,
    max: usize,
) -> FormulaResult<()> {
    if args.len() < min || args.len() > max {
        return Err(FormulaError::type_error(
            func,
            format!(
                "expected {} to {} arguments, got {}",
                min,
                max,
                args.len()
            ),
        ));
    }
    Ok(())
}

/// Check minimum argument count
pub(super) fn require_min_args(func: &str, args: &[Expr], min: usize) -> FormulaResult<()> {
    if args.len() < min {
        return Err(FormulaError::type_error(
            func,
            format!("expected at least {} argument(s), got {}", min, args.len()),
        ));
    }
    Ok(())
}
