//! Text functions: CONCAT, CONTAINS, LENGTH, UPPER, LOWER, TRIM, JOIN, TONUMBER, TOSTRING, EQUALS

use super::evaluator::{operand_error, require_args, require_min_args, Evaluator, Scope};
use super::parser::Expr;
use crate::error::{FormulaError, FormulaResult};
use crate::types::{format_number, Value};

impl Evaluator<'_> {
    /// CONCAT(a, b, ...)
    ///
    /// All-array arguments concatenate into one array, except that a single
    /// array of strings joins into a string. Otherwise every argument is
    /// stringified and arrays are joined with ", ".
    pub(super) fn eval_concat(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_min_args("concat", args, 1)?;
        let values = self.evaluate_args(args, scope)?;

        if values.iter().all(|v| matches!(v, Value::Array(_))) {
            if let [Value::Array(items)] = values.as_slice() {
                if items.iter().all(|v| matches!(v, Value::String(_))) {
                    let joined: String = items.iter().filter_map(Value::as_str).collect();
                    return Ok(Value::String(joined));
                }
            }
            let mut merged = Vec::new();
            for value in values {
                if let Value::Array(items) = value {
                    merged.extend(items);
                }
            }
            return Ok(Value::Array(merged));
        }

        let mut result = String::new();
        for value in &values {
            if let Value::Object(_) = value {
                return Err(operand_error("concat", &[value]));
            }
            result.push_str(&value.to_string());
        }
        Ok(Value::String(result))
    }

    /// CONTAINS(text, search): case-insensitive substring test
    pub(super) fn eval_contains(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("contains", args, 2)?;
        let haystack = match self.evaluate(&args[0], scope)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => return Err(operand_error("contains", &[&other])),
        };
        let needle = self.string_arg("contains", &args[1], scope)?;
        Ok(Value::Boolean(
            haystack.to_lowercase().contains(&needle.to_lowercase()),
        ))
    }

    /// LENGTH(text | array): characters or elements
    pub(super) fn eval_length(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("length", args, 1)?;
        let len = match self.evaluate(&args[0], scope)? {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            Value::Null => 0,
            other => return Err(operand_error("length", &[&other])),
        };
        Ok(Value::Number(len as f64))
    }

    /// UPPER(text) / LOWER(text)
    pub(super) fn eval_case(
        &mut self,
        func: &str,
        args: &[Expr],
        scope: &Scope<'_>,
    ) -> FormulaResult<Value> {
        require_args(func, args, 1)?;
        let text = self.string_arg(func, &args[0], scope)?;
        let folded = if func == "upper" {
            text.to_uppercase()
        } else {
            text.to_lowercase()
        };
        Ok(Value::String(folded))
    }

    pub(super) fn eval_trim(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("trim", args, 1)?;
        let text = self.string_arg("trim", &args[0], scope)?;
        Ok(Value::String(text.trim().to_string()))
    }

    /// JOIN(array, separator)
    pub(super) fn eval_join(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("join", args, 2)?;
        let items = match self.evaluate(&args[0], scope)? {
            Value::Array(items) => items,
            other => return Err(operand_error("join", &[&other])),
        };
        let separator = self.string_arg("join", &args[1], scope)?;
        let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
        Ok(Value::String(parts.join(&separator)))
    }

    /// TONUMBER(value): numeric strings (surrounding whitespace ignored), numbers, booleans
    pub(super) fn eval_to_number(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("toNumber", args, 1)?;
        match self.evaluate(&args[0], scope)? {
            Value::Number(n) => Ok(Value::Number(n)),
            Value::Boolean(b) => Ok(Value::Number(if b { 1.0 } else { 0.0 })),
            Value::String(s) => {
                let trimmed = s.trim();
                match trimmed.parse::<f64>() {
                    Ok(n) if n.is_finite() => Ok(Value::Number(n)),
                    _ => Err(FormulaError::Conversion {
                        input: trimmed.to_string(),
                    }),
                }
            }
            other => Err(operand_error("toNumber", &[&other])),
        }
    }

    pub(super) fn eval_to_string(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("toString", args, 1)?;
        let text = match self.evaluate(&args[0], scope)? {
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Date(d) => d.format("%Y-%m-%d %H:%M:%S").to_string(),
            other => other.to_string(),
        };
        Ok(Value::String(text))
    }

    /// EQUALS(a, b)
    ///
    /// Same-kind strings, numbers and booleans compare exactly. A string
    /// against a number or boolean compares with its text form. Null equals
    /// only null; every other pairing is false.
    pub(super) fn eval_equals(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("equals", args, 2)?;
        let left = self.evaluate(&args[0], scope)?;
        let right = self.evaluate(&args[1], scope)?;

        let equal = match (&left, &right) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
                *s == format_number(*n)
            }
            (Value::String(s), Value::Boolean(b)) | (Value::Boolean(b), Value::String(s)) => {
                *s == b.to_string()
            }
            (Value::Null, Value::Null) => true,
            _ => false,
        };
        Ok(Value::Boolean(equal))
    }
}

#[cfg(test)]
mod tests {
    use super::super::evaluator::tests::{eval, eval_with, num, text, MapResolver};
    use crate::error::FormulaError;
    use crate::types::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_concat_strings_and_numbers() {
        assert_eq!(eval("concat(\"joy\", \"fill\")").unwrap(), text("joyfill"));
        assert_eq!(eval("concat(\"a \", 1, \" \", 2.5)").unwrap(), text("a 1 2.5"));
        assert_eq!(eval("concat(\"x\", true, null)").unwrap(), text("xtruenull"));
    }

    #[test]
    fn test_concat_flattens_arrays_into_strings() {
        assert_eq!(
            eval("concat(\"Tags: \", [\"a\", \"b\"])").unwrap(),
            text("Tags: a, b")
        );
    }

    #[test]
    fn test_concat_all_arrays() {
        assert_eq!(
            eval("concat([1, 2], [3])").unwrap(),
            Value::Array(vec![num(1.0), num(2.0), num(3.0)])
        );
        assert_eq!(eval("concat([\"a\", \"b\"])").unwrap(), text("ab"));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        assert_eq!(
            eval("contains(\"Joyfill Rocks\", \"rock\")").unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            eval("contains(\"Joyfill\", \"xyz\")").unwrap(),
            Value::Boolean(false)
        );
        assert!(matches!(
            eval("contains(1, \"1\")"),
            Err(FormulaError::Type { .. })
        ));
    }

    #[test]
    fn test_length() {
        assert_eq!(eval("length(\"héllo\")").unwrap(), num(5.0));
        assert_eq!(eval("length([1, 2, 3])").unwrap(), num(3.0));
        assert!(eval("length(3)").is_err());
    }

    #[test]
    fn test_upper_lower_preserve_non_alphabetic() {
        assert_eq!(eval("upper(\"straße 12!\")").unwrap(), text("STRASSE 12!"));
        assert_eq!(eval("lower(\"ÀB-c\")").unwrap(), text("àb-c"));
    }

    #[test]
    fn test_trim_and_join() {
        assert_eq!(eval("trim(\"  hi  \")").unwrap(), text("hi"));
        assert_eq!(eval("join([1, \"b\"], \"-\")").unwrap(), text("1-b"));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(eval("toNumber(\" 42.5 \")").unwrap(), num(42.5));
        assert_eq!(eval("toNumber(true)").unwrap(), num(1.0));
        assert_eq!(
            eval("toNumber(\"abc\")"),
            Err(FormulaError::Conversion {
                input: "abc".to_string()
            })
        );
    }

    #[test]
    fn test_to_string() {
        assert_eq!(eval("toString(3)").unwrap(), text("3"));
        assert_eq!(eval("toString([1, \"a\"])").unwrap(), text("[1, a]"));
        assert_eq!(eval("toString(false)").unwrap(), text("false"));
    }

    #[test]
    fn test_text_functions_on_fields() {
        let mut resolver = MapResolver::with(&[("name", text("Ada"))]);
        assert_eq!(
            eval_with("concat(\"Hello, \", upper({name}))", &mut resolver).unwrap(),
            text("Hello, ADA")
        );
    }

    #[test]
    fn test_equals_same_kinds() {
        assert_eq!(eval("equals(\"a\", \"a\")").unwrap(), Value::Boolean(true));
        assert_eq!(eval("equals(\"a\", \"A\")").unwrap(), Value::Boolean(false));
        assert_eq!(eval("equals(2, 2)").unwrap(), Value::Boolean(true));
        assert_eq!(eval("equals(true, false)").unwrap(), Value::Boolean(false));
        assert_eq!(eval("equals(null, null)").unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_equals_mixed_kinds_use_text() {
        assert_eq!(eval("EQUALS(\"5\", 5)").unwrap(), Value::Boolean(true));
        assert_eq!(eval("equals(2.5, \"2.5\")").unwrap(), Value::Boolean(true));
        assert_eq!(eval("equals(\"true\", true)").unwrap(), Value::Boolean(true));
        assert_eq!(eval("equals(false, \"no\")").unwrap(), Value::Boolean(false));
        assert_eq!(eval("equals(null, 0)").unwrap(), Value::Boolean(false));
        assert_eq!(eval("equals([1], [1])").unwrap(), Value::Boolean(false));
    }

    #[test]
    fn test_equals_arity() {
        assert!(matches!(eval("equals(1)"), Err(FormulaError::Type { .. })));
    }
}
