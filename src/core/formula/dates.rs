//! Date functions: DATE, NOW, YEAR, MONTH, DAY, DATEADD, DATESUBTRACT, TIMESTAMP
//!
//! All calendar arithmetic is done in UTC.

use super::evaluator::{operand_error, require_args, Evaluator, Scope};
use super::parser::Expr;
use crate::error::{FormulaError, FormulaResult};
use crate::types::Value;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Epoch numbers above this are milliseconds, below it seconds
const MILLIS_THRESHOLD: f64 = 1e12;

/// Largest millisecond offset accepted for date arithmetic
const MAX_OFFSET_MS: f64 = 8.64e18;

/// Calendar unit for DATEADD/DATESUBTRACT
#[derive(Debug, Clone, Copy, PartialEq)]
enum DateUnit {
    Years,
    Months,
    /// Fixed-length unit, in milliseconds
    Fixed(f64),
}

impl DateUnit {
    fn parse(unit: &str) -> Option<Self> {
        let unit = match unit.trim().to_lowercase().as_str() {
            "years" | "year" | "y" => DateUnit::Years,
            "months" | "month" | "m" => DateUnit::Months,
            "weeks" | "week" | "w" => DateUnit::Fixed(7.0 * 86_400_000.0),
            "days" | "day" | "d" => DateUnit::Fixed(86_400_000.0),
            "hours" | "hour" | "h" => DateUnit::Fixed(3_600_000.0),
            "minutes" | "minute" | "min" => DateUnit::Fixed(60_000.0),
            "seconds" | "second" | "sec" | "s" => DateUnit::Fixed(1_000.0),
            "milliseconds" | "millisecond" | "ms" => DateUnit::Fixed(1.0),
            _ => return None,
        };
        Some(unit)
    }
}

/// Shift a date by a (possibly negative) number of milliseconds
pub(super) fn add_millis(
    operation: &str,
    date: DateTime<Utc>,
    ms: f64,
) -> FormulaResult<DateTime<Utc>> {
    if !ms.is_finite() || ms.abs() > MAX_OFFSET_MS {
        return Err(FormulaError::domain(operation, "Date offset out of range"));
    }
    date.checked_add_signed(Duration::milliseconds(ms as i64))
        .ok_or_else(|| FormulaError::domain(operation, "Date out of range"))
}

fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let ms = if value.abs() > MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    Utc.timestamp_millis_opt(ms as i64).single()
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Read a date out of a value: dates, epoch numbers, numeric strings,
/// RFC 3339 strings and `YYYY-MM-DD` strings
pub fn extract_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Number(n) => from_epoch(*n),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<f64>() {
                return from_epoch(n);
            }
            if let Ok(d) = DateTime::parse_from_rfc3339(s) {
                return Some(d.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(midnight)
        }
        _ => None,
    }
}

impl Evaluator<'_> {
    fn date_arg(&mut self, func: &str, arg: &Expr, scope: &Scope<'_>) -> FormulaResult<DateTime<Utc>> {
        let value = self.evaluate(arg, scope)?;
        extract_date(&value).ok_or_else(|| operand_error(func, &[&value]))
    }

    /// DATE(year, month, day) at midnight UTC
    pub(super) fn eval_date(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("date", args, 3)?;
        let year = self.number_arg("date", &args[0], scope)?;
        let month = self.number_arg("date", &args[1], scope)?;
        let day = self.number_arg("date", &args[2], scope)?;

        let invalid = || {
            FormulaError::domain(
                "date",
                format!("Invalid date: {}-{}-{}", year, month, day),
            )
        };
        if year.fract() != 0.0 || month < 1.0 || day < 1.0 || year.abs() > 200_000.0 {
            return Err(invalid());
        }
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .and_then(midnight)
            .map(Value::Date)
            .ok_or_else(invalid)
    }

    pub(super) fn eval_now(&mut self, args: &[Expr]) -> FormulaResult<Value> {
        require_args("now", args, 0)?;
        Ok(Value::Date(Utc::now()))
    }

    /// YEAR(date) / MONTH(date) / DAY(date)
    pub(super) fn eval_date_part(
        &mut self,
        func: &str,
        args: &[Expr],
        scope: &Scope<'_>,
    ) -> FormulaResult<Value> {
        require_args(func, args, 1)?;
        let date = self.date_arg(func, &args[0], scope)?;
        let part = match func {
            "year" => date.year() as f64,
            "month" => date.month() as f64,
            _ => date.day() as f64,
        };
        Ok(Value::Number(part))
    }

    /// DATEADD(date, amount, unit); DATESUBTRACT passes `sign = -1`.
    /// Month and year steps clamp to the end of shorter months.
    pub(super) fn eval_date_add(
        &mut self,
        args: &[Expr],
        scope: &Scope<'_>,
        sign: f64,
    ) -> FormulaResult<Value> {
        let func = if sign < 0.0 { "dateSubtract" } else { "dateAdd" };
        require_args(func, args, 3)?;
        let date = self.date_arg(func, &args[0], scope)?;
        let amount = self.number_arg(func, &args[1], scope)? * sign;
        let unit_text = self.string_arg(func, &args[2], scope)?;
        let unit = DateUnit::parse(&unit_text)
            .ok_or_else(|| FormulaError::domain(func, format!("Unknown unit '{}'", unit_text)))?;

        let shifted = match unit {
            DateUnit::Years | DateUnit::Months => {
                let per = if unit == DateUnit::Years { 12.0 } else { 1.0 };
                let months = (amount.trunc() * per).abs();
                if months > u32::MAX as f64 {
                    return Err(FormulaError::domain(func, "Date offset out of range"));
                }
                let months = Months::new(months as u32);
                if amount < 0.0 {
                    date.checked_sub_months(months)
                } else {
                    date.checked_add_months(months)
                }
                .ok_or_else(|| FormulaError::domain(func, "Date out of range"))?
            }
            DateUnit::Fixed(unit_ms) => add_millis(func, date, amount * unit_ms)?,
        };

        Ok(Value::Date(shifted))
    }

    /// TIMESTAMP(ms): date from epoch milliseconds
    pub(super) fn eval_timestamp(&mut self, args: &[Expr], scope: &Scope<'_>) -> FormulaResult<Value> {
        require_args("timestamp", args, 1)?;
        let ms = self.number_arg("timestamp", &args[0], scope)?;
        let epoch = Utc.timestamp_millis_opt(0).single().ok_or_else(|| {
            FormulaError::domain("timestamp", "Date out of range")
        })?;
        Ok(Value::Date(add_millis("timestamp", epoch, ms)?))
    }
}

#[cfg(test)]
mod tests {
    use super::super::evaluator::tests::{eval, eval_with, num, MapResolver};
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc(y: i32, m: u32, d: u32) -> Value {
        Value::Date(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_date_constructor_and_parts() {
        assert_eq!(eval("date(2024, 2, 29)").unwrap(), utc(2024, 2, 29));
        assert_eq!(eval("year(date(2024, 3, 15))").unwrap(), num(2024.0));
        assert_eq!(eval("month(date(2024, 3, 15))").unwrap(), num(3.0));
        assert_eq!(eval("day(date(2024, 3, 15))").unwrap(), num(15.0));
        assert!(matches!(eval("date(2023, 2, 29)"), Err(FormulaError::Domain { .. })));
    }

    #[test]
    fn test_date_parts_from_strings_and_epochs() {
        assert_eq!(eval("year(\"2021-07-04\")").unwrap(), num(2021.0));
        assert_eq!(eval("month(\"2021-07-04T10:00:00Z\")").unwrap(), num(7.0));
        // 2021-01-01T00:00:00Z in milliseconds and in seconds
        assert_eq!(eval("year(1609459200000)").unwrap(), num(2021.0));
        assert_eq!(eval("year(1609459200)").unwrap(), num(2021.0));
        assert!(matches!(eval("year(\"soon\")"), Err(FormulaError::Type { .. })));
    }

    #[test]
    fn test_now_is_a_date() {
        assert!(matches!(eval("now()").unwrap(), Value::Date(_)));
        assert!(eval("now(1)").is_err());
    }

    #[test]
    fn test_date_add_calendar_units() {
        assert_eq!(
            eval("dateAdd(date(2024, 1, 31), 1, \"months\")").unwrap(),
            utc(2024, 2, 29)
        );
        assert_eq!(
            eval("dateAdd(date(2024, 2, 29), 1, \"years\")").unwrap(),
            utc(2025, 2, 28)
        );
        assert_eq!(
            eval("dateAdd(date(2024, 12, 30), 3, \"days\")").unwrap(),
            utc(2025, 1, 2)
        );
        assert_eq!(
            eval("dateAdd(date(2024, 1, 1), 2, \"w\")").unwrap(),
            utc(2024, 1, 15)
        );
    }

    #[test]
    fn test_date_subtract() {
        assert_eq!(
            eval("dateSubtract(date(2024, 3, 31), 1, \"month\")").unwrap(),
            utc(2024, 2, 29)
        );
        assert_eq!(
            eval("dateSubtract(date(2024, 1, 1), 1, \"d\")").unwrap(),
            utc(2023, 12, 31)
        );
    }

    #[test]
    fn test_date_add_unknown_unit() {
        assert!(matches!(
            eval("dateAdd(date(2024, 1, 1), 1, \"fortnights\")"),
            Err(FormulaError::Domain { .. })
        ));
    }

    #[test]
    fn test_date_arithmetic_operators() {
        assert_eq!(
            eval("date(2024, 1, 2) - date(2024, 1, 1)").unwrap(),
            num(86_400_000.0)
        );
        assert_eq!(
            eval("date(2024, 1, 1) + 86400000").unwrap(),
            utc(2024, 1, 2)
        );
        assert_eq!(
            eval("date(2024, 1, 2) > date(2024, 1, 1)").unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_timestamp() {
        assert_eq!(eval("timestamp(1609459200000)").unwrap(), utc(2021, 1, 1));
    }

    #[test]
    fn test_date_field_reference() {
        let mut resolver = MapResolver::with(&[("due", Value::from("2024-05-10"))]);
        assert_eq!(
            eval_with("dateAdd({due}, 10, \"days\")", &mut resolver).unwrap(),
            utc(2024, 5, 20)
        );
    }
}
