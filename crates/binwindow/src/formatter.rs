//! SQL literal rendering for decoded column values
//!
//! Long textual values are cut so a single wide column cannot swamp the
//! report: anything over [`MAX_LITERAL_CHARS`] characters keeps its first
//! [`TRUNCATED_PREFIX_CHARS`] characters followed by `...`.

use crate::common::{Value, TIME_FORMAT};

/// Longest textual value printed in full.
pub const MAX_LITERAL_CHARS: usize = 50;
/// Characters kept from a value that is too long.
pub const TRUNCATED_PREFIX_CHARS: usize = 47;

/// Render a value as a SQL literal.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => format_float(*v),
        Value::Bool(v) => (if *v { "1" } else { "0" }).to_string(),
        Value::Text(s) => quote(&truncate(&escape(s))),
        Value::Bytes(b) => quote(&truncate(&escape(&String::from_utf8_lossy(b)))),
        Value::Timestamp(t) => quote(&t.format(TIME_FORMAT).to_string()),
        Value::Decimal(s) => quote(&truncate(s)),
    }
}

fn escape(s: &str) -> String {
    s.replace('\'', "''")
}

fn quote(s: &str) -> String {
    format!("'{}'", s)
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_LITERAL_CHARS {
        return s.to_string();
    }
    let mut out: String = s.chars().take(TRUNCATED_PREFIX_CHARS).collect();
    out.push_str("...");
    out
}

/// Render a float like C's `%.6g`: six significant digits, exponent form
/// for very small or large magnitudes, trailing zeros dropped.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return (if v > 0.0 { "+Inf" } else { "-Inf" }).to_string();
    }
    if v == 0.0 {
        return (if v.is_sign_negative() { "-0" } else { "0" }).to_string();
    }

    // The exponent decides the notation and must come from the rounded value.
    let sci = format!("{:.5e}", v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return v.to_string();
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return v.to_string();
    };

    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exp.unsigned_abs()
        )
    } else {
        let decimals = (5 - exp) as usize;
        trim_fraction(&format!("{:.*}", decimals, v)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Render a row as a comma-separated literal list.
pub fn format_row(values: &[Value]) -> String {
    values
        .iter()
        .map(format_value)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    #[test]
    fn test_null() {
        assert_eq!(format_value(&Value::Null), "NULL");
    }

    #[test]
    fn test_integers_and_bools() {
        assert_eq!(format_value(&Value::Int(-42)), "-42");
        assert_eq!(format_value(&Value::UInt(u64::MAX)), "18446744073709551615");
        assert_eq!(format_value(&Value::Bool(true)), "1");
        assert_eq!(format_value(&Value::Bool(false)), "0");
    }

    #[test]
    fn test_text_escapes_quotes() {
        assert_eq!(format_value(&Value::Text("O'Brien".into())), "'O''Brien'");
        assert_eq!(format_value(&Value::Text(String::new())), "''");
    }

    #[test]
    fn test_long_text_truncated() {
        let long = "x".repeat(51);
        let expected = format!("'{}...'", "x".repeat(47));
        assert_eq!(format_value(&Value::Text(long)), expected);

        // Exactly at the limit stays intact.
        let edge = "y".repeat(50);
        assert_eq!(format_value(&Value::Text(edge.clone())), format!("'{}'", edge));
    }

    #[test]
    fn test_truncation_counts_escaped_quotes() {
        // 26 quotes double to 52 characters, which crosses the limit.
        let quotes = "'".repeat(26);
        let rendered = format_value(&Value::Text(quotes));
        assert_eq!(rendered, format!("'{}...'", "'".repeat(47)));
    }

    #[test]
    fn test_truncation_is_char_based() {
        let text = "é".repeat(60);
        let rendered = format_value(&Value::Text(text));
        assert_eq!(rendered, format!("'{}...'", "é".repeat(47)));
    }

    #[test]
    fn test_bytes_render_as_text() {
        assert_eq!(format_value(&Value::Bytes(b"a'b".to_vec())), "'a''b'");
    }

    #[test]
    fn test_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(23, 59, 1)
            .unwrap();
        assert_eq!(
            format_value(&Value::Timestamp(ts)),
            "'2024-02-29 23:59:01'"
        );
    }

    #[test]
    fn test_decimal_quoted_not_escaped() {
        assert_eq!(format_value(&Value::Decimal("-12.50".into())), "'-12.50'");
    }

    #[test]
    fn test_format_float_fixed() {
        assert_eq!(format_float(3.0), "3");
        assert_eq!(format_float(3.14159265), "3.14159");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(123456.0), "123456");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(100.0), "100");
    }

    #[test]
    fn test_format_float_exponent() {
        assert_eq!(format_float(1234567.0), "1.23457e+06");
        assert_eq!(format_float(1e6), "1e+06");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(1.5e-10), "1.5e-10");
        assert_eq!(format_float(1e100), "1e+100");
        // Rounding can push the value into exponent form.
        assert_eq!(format_float(999999.7), "1e+06");
    }

    #[test]
    fn test_format_float_special() {
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(f64::NAN), "NaN");
        assert_eq!(format_float(f64::INFINITY), "+Inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn test_format_row() {
        let row = vec![Value::Int(1), Value::Null, Value::Text("a".into())];
        assert_eq!(format_row(&row), "1, NULL, 'a'");
        assert_eq!(format_row(&[]), "");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_text_literal_is_bounded(s in ".{0,200}") {
            let rendered = format_value(&Value::Text(s));
            let inner = rendered.chars().count() - 2;
            prop_assert!(inner <= MAX_LITERAL_CHARS);
            prop_assert!(rendered.starts_with('\''));
            prop_assert!(rendered.ends_with('\''));
        }

        #[test]
        fn prop_short_text_round_trips(s in "[a-zA-Z0-9 ]{0,50}") {
            let rendered = format_value(&Value::Text(s.clone()));
            prop_assert_eq!(rendered, format!("'{}'", s));
        }

        #[test]
        fn prop_float_has_at_most_six_significant_digits(v in -1.0e12f64..1.0e12f64) {
            let rendered = format_float(v);
            let mantissa = rendered.split('e').next().unwrap_or_default();
            let digits = mantissa
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect::<String>();
            let significant = digits.trim_start_matches('0').len();
            prop_assert!(significant <= 6, "{} -> {}", v, rendered);
        }
    }
}
