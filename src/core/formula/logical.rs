//! Logical functions: AND, OR, NOT, IF, EMPTY

use super::evaluator::{require_args, require_min_args, Evaluator, Scope};
use super::parser::Expr;
use crate::error::FormulaResult;
use crate::types::Value;

impl Evaluator<'_> {
    /// AND(cond1, cond2, ...): true only if every argument is truthy
    pub(super) fn eval_and(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_min_args("and", args, 1)?;
        for arg in args {
            if !self.evaluate(arg, scope)?.is_truthy() {
                return Ok(Value::Boolean(false));
            }
        }
        Ok(Value::Boolean(true))
    }

    /// OR(cond1, cond2, ...): true if any argument is truthy
    pub(super) fn eval_or(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_min_args("or", args, 1)?;
        for arg in args {
            if self.evaluate(arg, scope)?.is_truthy() {
                return Ok(Value::Boolean(true));
            }
        }
        Ok(Value::Boolean(false))
    }

    pub(super) fn eval_not(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("not", args, 1)?;
        let value = self.evaluate(&args[0], scope)?;
        Ok(Value::Boolean(!value.is_truthy()))
    }

    /// IF(cond, when_true, when_false): only the chosen branch is evaluated
    pub(super) fn eval_if(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("if", args, 3)?;
        if self.evaluate(&args[0], scope)?.is_truthy() {
            self.evaluate(&args[1], scope)
        } else {
            self.evaluate(&args[2], scope)
        }
    }

    pub(super) fn eval_empty(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("empty", args, 1)?;
        let value = self.evaluate(&args[0], scope)?;
        Ok(Value::Boolean(value.is_empty_value()))
    }
}
