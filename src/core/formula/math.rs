//! Math functions
//! SUM, MAX, MIN, AVG, COUNT, POW, SQRT, MOD, CEIL, FLOOR, ROUND

use super::evaluator::{require_args, require_args_range, require_min_args, Evaluator, Scope};
use super::parser::Expr;
use crate::error::{FormulaError, FormulaResult, SQRT_NEGATIVE_MESSAGE};
use crate::types::Value;

/// Numbers found in `values`, flattening arrays. Numeric strings count;
/// null and every other value are skipped.
fn collect_numbers(values: &[Value], out: &mut Vec<f64>) {
    for value in values {
        match value {
            Value::Number(n) => out.push(*n),
            Value::String(s) => {
                if let Ok(n) = s.trim().parse::<f64>() {
                    out.push(n);
                }
            }
            Value::Array(items) => collect_numbers(items, out),
            _ => {}
        }
    }
}

fn count_values(values: &[Value]) -> usize {
    values
        .iter()
        .map(|value| match value {
            Value::Array(items) => count_values(items),
            Value::Null => 0,
            _ => 1,
        })
        .sum()
}

impl Evaluator<'_> {
    fn numeric_args(
        &mut self,
        func: &str,
        args: &[Expr],
        scope: &Scope<'_>,
    ) -> FormulaResult<Vec<f64>> {
        require_min_args(func, args, 1)?;
        let values = self.evaluate_args(args, scope)?;
        let mut numbers = Vec::new();
        collect_numbers(&values, &mut numbers);
        Ok(numbers)
    }

    pub(super) fn eval_sum(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        let numbers = self.numeric_args("sum", args, scope)?;
        Ok(Value::Number(numbers.iter().sum()))
    }

    /// MAX(...) / MIN(...): at least one number is required
    pub(super) fn eval_extremum(
        &mut self,
        func: &str,
        args: &[Expr],
        scope: &Scope<'_>,
    ) -> FormulaResult<Value> {
        let numbers = self.numeric_args(func, args, scope)?;
        let pick = if func == "max" { f64::max } else { f64::min };
        numbers
            .into_iter()
            .reduce(pick)
            .map(Value::Number)
            .ok_or_else(|| FormulaError::type_error(func, "no numeric values"))
    }

    pub(super) fn eval_average(
        &mut self,
        func: &str,
        args: &[Expr],
        scope: &Scope<'_>,
    ) -> FormulaResult<Value> {
        let numbers = self.numeric_args(func, args, scope)?;
        if numbers.is_empty() {
            return Err(FormulaError::type_error(func, "no numeric values"));
        }
        Ok(Value::Number(
            numbers.iter().sum::<f64>() / numbers.len() as f64,
        ))
    }

    /// COUNT(...): non-null values, flattening arrays
    pub(super) fn eval_count(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_min_args("count", args, 1)?;
        let values = self.evaluate_args(args, scope)?;
        Ok(Value::Number(count_values(&values) as f64))
    }

    /// POW(base, exponent): non-real results are domain errors
    pub(super) fn eval_pow(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("pow", args, 2)?;
        let base = self.number_arg("pow", &args[0], scope)?;
        let exponent = self.number_arg("pow", &args[1], scope)?;
        let result = base.powf(exponent);
        if result.is_nan() {
            return Err(FormulaError::domain("pow", "Result is not a real number"));
        }
        if result.is_infinite() {
            return Err(FormulaError::domain("pow", "Result is too large"));
        }
        Ok(Value::Number(result))
    }

    pub(super) fn eval_sqrt(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("sqrt", args, 1)?;
        let value = self.number_arg("sqrt", &args[0], scope)?;
        if value < 0.0 {
            return Err(FormulaError::domain("sqrt", SQRT_NEGATIVE_MESSAGE));
        }
        Ok(Value::Number(value.sqrt()))
    }

    /// MOD(a, b): truncated remainder, the result takes the sign of `a`
    pub(super) fn eval_mod(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("mod", args, 2)?;
        let value = self.number_arg("mod", &args[0], scope)?;
        let divisor = self.number_arg("mod", &args[1], scope)?;
        if divisor == 0.0 {
            return Err(FormulaError::domain("mod", "Division by zero"));
        }
        Ok(Value::Number(value % divisor))
    }

    /// CEIL(x) / FLOOR(x)
    pub(super) fn eval_ceil_floor(
        &mut self,
        func: &str,
        args: &[Expr],
        scope: &Scope<'_>,
    ) -> FormulaResult<Value> {
        require_args(func, args, 1)?;
        let value = self.number_arg(func, &args[0], scope)?;
        let result = if func == "ceil" {
            value.ceil()
        } else {
            value.floor()
        };
        Ok(Value::Number(result))
    }

    /// ROUND(x, [places]): half away from zero; places <= 0 gives a whole number
    pub(super) fn eval_round(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args_range("round", args, 1, 2)?;
        let value = self.number_arg("round", &args[0], scope)?;
        let places = if args.len() > 1 {
            self.number_arg("round", &args[1], scope)?.trunc() as i32
        } else {
            0
        };
        if places <= 0 {
            return Ok(Value::Number(value.round()));
        }
        let multiplier = 10_f64.powi(places);
        Ok(Value::Number((value * multiplier).round() / multiplier))
    }
}

#[cfg(test)]
mod tests {
    use super::super::evaluator::tests::{eval, eval_with, num, MapResolver};
    use crate::error::{FormulaError, SQRT_NEGATIVE_MESSAGE};
    use crate::types::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sum_flattens_and_skips() {
        assert_eq!(eval("sum(1, [2, 3], \"4\", null)").unwrap(), num(10.0));
        assert_eq!(eval("sum([])").unwrap(), num(0.0));
    }

    #[test]
    fn test_max_min() {
        assert_eq!(eval("max(1, [7, 3], 5)").unwrap(), num(7.0));
        assert_eq!(eval("min([4, -2], 0)").unwrap(), num(-2.0));
        assert!(matches!(eval("max([])"), Err(FormulaError::Type { .. })));
    }

    #[test]
    fn test_avg_and_count() {
        assert_eq!(eval("avg([2, 4, 6])").unwrap(), num(4.0));
        assert_eq!(eval("average(1, 2)").unwrap(), num(1.5));
        assert_eq!(eval("count([1, 2], null, \"x\")").unwrap(), num(3.0));
        assert_eq!(eval("count([1, [null, 2]])").unwrap(), num(2.0));
    }

    #[test]
    fn test_pow() {
        assert_eq!(eval("pow(-2, 3)").unwrap(), num(-8.0));
        assert_eq!(eval("pow(2, 10)").unwrap(), num(1024.0));
        assert!(matches!(eval("pow(-4, 0.5)"), Err(FormulaError::Domain { .. })));
    }

    #[test]
    fn test_sqrt_negative_has_display_message() {
        assert_eq!(eval("sqrt(16)").unwrap(), num(4.0));
        let err = eval("sqrt(-4)").unwrap_err();
        assert_eq!(err.display_message(), Some(SQRT_NEGATIVE_MESSAGE));
    }

    #[test]
    fn test_mod_truncates() {
        assert_eq!(eval("mod(19, 12)").unwrap(), num(7.0));
        assert_eq!(eval("mod(-7, 3)").unwrap(), num(-1.0));
        assert_eq!(eval("mod(7, -3)").unwrap(), num(1.0));
        assert!(matches!(eval("mod(1, 0)"), Err(FormulaError::Domain { .. })));
    }

    #[test]
    fn test_ceil_floor() {
        assert_eq!(eval("ceil(4.2)").unwrap(), num(5.0));
        assert_eq!(eval("floor(-4.3)").unwrap(), num(-5.0));
    }

    #[test]
    fn test_round() {
        assert_eq!(eval("round(2.5)").unwrap(), num(3.0));
        assert_eq!(eval("round(-2.5)").unwrap(), num(-3.0));
        assert_eq!(eval("round(3.14159, 2)").unwrap(), num(3.14));
        // No rounding to tens or hundreds
        assert_eq!(eval("round(1234.6, -2)").unwrap(), num(1235.0));
        assert_eq!(eval("round(7.49, 0)").unwrap(), num(7.0));
    }

    #[test]
    fn test_math_type_errors() {
        assert!(matches!(eval("ceil(\"x\")"), Err(FormulaError::Type { .. })));
        assert!(matches!(eval("pow(2)"), Err(FormulaError::Type { .. })));
    }

    #[test]
    fn test_sum_of_field_array() {
        let mut resolver = MapResolver::with(&[(
            "scores",
            Value::Array(vec![num(90.0), num(85.5)]),
        )]);
        assert_eq!(eval_with("sum({scores})", &mut resolver).unwrap(), num(175.5));
    }
}
