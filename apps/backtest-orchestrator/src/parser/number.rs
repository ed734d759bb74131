//! Tolerant numeric token parsing.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;

/// A parsed numeric token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Numeric {
    /// Numeric value with separators and suffix removed.
    pub value: Decimal,
    /// Whether the token carried a `%` suffix.
    pub percent: bool,
}

#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn thousands_regex() -> &'static Regex {
    static THOUSANDS: OnceLock<Regex> = OnceLock::new();
    THOUSANDS.get_or_init(|| {
        Regex::new(r"^[+-]?\d{1,3}(?:,\d{3})+(?:\.\d+)?$").expect("thousands regex is valid")
    })
}

/// Parse a numeric token such as `25.00`, `-3.5%` or `1,234.56`.
///
/// Returns `None` for anything malformed, including misplaced separators.
#[must_use]
pub fn parse_numeric(token: &str) -> Option<Numeric> {
    let token = token.trim();
    let (body, percent) = match token.strip_suffix('%') {
        Some(body) => (body.trim_end(), true),
        None => (token, false),
    };
    if body.is_empty() {
        return None;
    }

    let normalized = if body.contains(',') {
        if !thousands_regex().is_match(body) {
            return None;
        }
        body.replace(',', "")
    } else {
        body.to_string()
    };
    let normalized = normalized.strip_prefix('+').unwrap_or(&normalized);

    if !normalized
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'))
    {
        return None;
    }

    let value = if normalized.contains(['e', 'E']) {
        Decimal::from_scientific(&normalized).ok()?
    } else {
        Decimal::from_str(&normalized).ok()?
    };

    Some(Numeric { value, percent })
}

/// Parse a trade count: a bare, non-negative whole number.
#[must_use]
pub fn parse_count(token: &str) -> Option<u64> {
    let numeric = parse_numeric(token)?;
    if numeric.percent {
        return None;
    }
    decimal_to_count(numeric.value)
}

/// Convert a whole, non-negative decimal to a count.
#[must_use]
pub fn decimal_to_count(value: Decimal) -> Option<u64> {
    if value.is_sign_negative() && !value.is_zero() {
        return None;
    }
    if !value.fract().is_zero() {
        return None;
    }
    value.to_u64()
}

/// Read a JSON number (or numeric string) as a decimal.
#[must_use]
pub fn json_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(Decimal::from(u))
            } else {
                parse_numeric(&n.to_string()).map(|num| num.value)
            }
        }
        Value::String(s) => parse_numeric(s).map(|num| num.value),
        _ => None,
    }
}

/// Read a JSON number as a count.
#[must_use]
pub fn json_count(value: &Value) -> Option<u64> {
    json_decimal(value).and_then(decimal_to_count)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;

    #[test_case("25.00", dec!(25.00), false ; "plain")]
    #[test_case("-3.5%", dec!(-3.5), true ; "negative percent")]
    #[test_case("+4", dec!(4), false ; "explicit plus")]
    #[test_case("1,234.56", dec!(1234.56), false ; "thousands")]
    #[test_case("12,345,678", dec!(12345678), false ; "millions")]
    #[test_case("15.05 %", dec!(15.05), true ; "spaced percent")]
    #[test_case("1e-3", dec!(0.001), false ; "scientific")]
    fn test_parse_numeric_accepts(token: &str, value: Decimal, percent: bool) {
        assert_eq!(parse_numeric(token), Some(Numeric { value, percent }));
    }

    #[test_case("" ; "empty")]
    #[test_case("%" ; "bare percent")]
    #[test_case("12,34" ; "bad grouping")]
    #[test_case("1,2345.0" ; "long group")]
    #[test_case("abc" ; "letters")]
    #[test_case("1.2.3" ; "two points")]
    #[test_case("NaN" ; "nan")]
    #[test_case("1_000" ; "underscores")]
    fn test_parse_numeric_rejects(token: &str) {
        assert_eq!(parse_numeric(token), None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("15"), Some(15));
        assert_eq!(parse_count("1,024"), Some(1024));
        assert_eq!(parse_count("15.0"), Some(15));
        assert_eq!(parse_count("15.5"), None);
        assert_eq!(parse_count("-2"), None);
        assert_eq!(parse_count("15%"), None);
    }

    #[test]
    fn test_json_decimal() {
        assert_eq!(json_decimal(&serde_json::json!(12)), Some(dec!(12)));
        assert_eq!(json_decimal(&serde_json::json!(0.1523)), Some(dec!(0.1523)));
        assert_eq!(json_decimal(&serde_json::json!("2.5")), Some(dec!(2.5)));
        assert_eq!(json_decimal(&serde_json::json!(null)), None);
        assert_eq!(json_count(&serde_json::json!(7)), Some(7));
        assert_eq!(json_count(&serde_json::json!(7.5)), None);
    }
}
