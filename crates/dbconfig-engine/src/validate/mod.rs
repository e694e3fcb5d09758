//! Value validation against name definitions
//!
//! A value is checked against its declared `(value_type, value_type_sub,
//! value_allowed)` triple. The accepted subtypes per type form a closed matrix:
//!
//! | type                 | subtypes                                                             |
//! |----------------------|----------------------------------------------------------------------|
//! | STRING               | ∅ STRING ENUM ENUMS BYTES REGEX JSON MAP DURATION GOVALIDATE LIST    |
//! | INT / FLOAT / NUMBER | ∅ ENUM RANGE                                                         |
//! | BOOL                 | ∅ ENUM FLAG                                                          |

pub mod govalidate;

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use dbconfig_common::DbConfigError;
use dbconfig_common::units::{parse_bytes, parse_duration_secs};

static RANGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([\[(])\s*([^,\[\]()]*?)\s*,\s*([^,\[\]()]*?)\s*([\])])\s*$")
        .expect("Invalid regex pattern")
});

const BOOL_LITERALS: [&str; 8] = ["true", "false", "1", "0", "on", "off", "yes", "no"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidateError {
    #[error("unknown value_type {0}")]
    UnknownType(String),

    #[error("value_type {value_type} does not support value_type_sub {sub_type}")]
    UnsupportedSubType { value_type: String, sub_type: String },

    #[error("value {value} is not a valid {expected}")]
    InvalidValue { value: String, expected: String },

    #[error("value {value} is out of range {range}")]
    OutOfRange { value: String, range: String },

    #[error("value {value} is not in {allowed}")]
    NotInEnum { value: String, allowed: String },

    #[error("illegal range definition {0}")]
    InvalidRange(String),

    #[error("illegal regex {pattern}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("value {value} does not match {pattern}")]
    RegexMismatch { value: String, pattern: String },

    #[error("value {value} fails rule {rule}")]
    RuleFailed { value: String, rule: String },

    #[error("unknown validate rule {0}")]
    UnknownRule(String),
}

impl From<ValidateError> for DbConfigError {
    fn from(err: ValidateError) -> Self {
        DbConfigError::InputValidation(err.to_string())
    }
}

/// Declared value type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    String,
    Int,
    Float,
    Number,
    Bool,
}

impl ValueType {
    pub fn parse(s: &str) -> Result<Self, ValidateError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "STRING" => Ok(ValueType::String),
            "INT" => Ok(ValueType::Int),
            "FLOAT" => Ok(ValueType::Float),
            "NUMBER" => Ok(ValueType::Number),
            "BOOL" => Ok(ValueType::Bool),
            _ => Err(ValidateError::UnknownType(s.to_string())),
        }
    }
}

/// Declared value subtype
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubType {
    Empty,
    String,
    Enum,
    Enums,
    Bytes,
    Regex,
    Json,
    Map,
    Duration,
    GoValidate,
    List,
    Range,
    Flag,
}

impl SubType {
    fn parse(s: &str) -> Option<Self> {
        let sub = match s.trim().to_ascii_uppercase().as_str() {
            "" => SubType::Empty,
            "STRING" => SubType::String,
            "ENUM" => SubType::Enum,
            "ENUMS" => SubType::Enums,
            "BYTES" => SubType::Bytes,
            "REGEX" => SubType::Regex,
            "JSON" => SubType::Json,
            "MAP" => SubType::Map,
            "DURATION" => SubType::Duration,
            "GOVALIDATE" => SubType::GoValidate,
            "LIST" => SubType::List,
            "RANGE" => SubType::Range,
            "FLAG" => SubType::Flag,
            _ => return None,
        };
        Some(sub)
    }

    fn allowed_for(value_type: ValueType) -> &'static [SubType] {
        match value_type {
            ValueType::String => &[
                SubType::Empty,
                SubType::String,
                SubType::Enum,
                SubType::Enums,
                SubType::Bytes,
                SubType::Regex,
                SubType::Json,
                SubType::Map,
                SubType::Duration,
                SubType::GoValidate,
                SubType::List,
            ],
            ValueType::Int | ValueType::Float | ValueType::Number => {
                &[SubType::Empty, SubType::Enum, SubType::Range]
            }
            ValueType::Bool => &[SubType::Empty, SubType::Enum, SubType::Flag],
        }
    }
}

/// Validate a value against its declared type, subtype and allowed spec
pub fn validate_value(
    value: &str,
    value_type: &str,
    sub_type: &str,
    allowed: &str,
) -> Result<(), ValidateError> {
    let vtype = ValueType::parse(value_type)?;
    let sub = SubType::parse(sub_type)
        .filter(|s| SubType::allowed_for(vtype).contains(s))
        .ok_or_else(|| ValidateError::UnsupportedSubType {
            value_type: value_type.to_string(),
            sub_type: sub_type.to_string(),
        })?;

    // an undeclared subtype is inferred from the shape of the allowed spec
    let sub = match sub {
        SubType::Empty if is_range(allowed) => SubType::Range,
        SubType::Empty if allowed.contains(['|', ',']) => SubType::Enum,
        other => other,
    };

    match vtype {
        ValueType::Int => {
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| invalid(value, "INT"))?;
        }
        ValueType::Float | ValueType::Number => {
            parse_number(value).map_err(|_| invalid(value, "NUMBER"))?;
        }
        ValueType::Bool => {
            let empty_flag = sub == SubType::Flag && value.trim().is_empty();
            if !empty_flag && !is_bool_literal(value) {
                return Err(invalid(value, "BOOL"));
            }
        }
        ValueType::String => {}
    }

    match sub {
        SubType::Empty | SubType::String | SubType::Flag => Ok(()),
        SubType::Enum => check_in_enums(value, allowed, false),
        SubType::Enums => check_in_enums(value, allowed, true),
        SubType::Range => check_in_range(value, allowed),
        SubType::Bytes => check_measured(value, allowed, "BYTES", |s| {
            parse_bytes(s).map_err(|_| ())
        }),
        SubType::Duration => check_measured(value, allowed, "DURATION", |s| {
            parse_duration_secs(s).map_err(|_| ())
        }),
        SubType::Regex => check_regex(value, allowed),
        SubType::Json => serde_json::from_str::<serde_json::Value>(value)
            .map(|_| ())
            .map_err(|_| invalid(value, "JSON")),
        SubType::Map => match serde_json::from_str::<serde_json::Value>(value) {
            Ok(serde_json::Value::Object(_)) => Ok(()),
            _ => Err(invalid(value, "MAP")),
        },
        SubType::List => check_list(value, allowed),
        SubType::GoValidate => govalidate::check(value, allowed),
    }
}

fn invalid(value: &str, expected: &str) -> ValidateError {
    ValidateError::InvalidValue {
        value: value.to_string(),
        expected: expected.to_string(),
    }
}

fn is_bool_literal(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    BOOL_LITERALS.contains(&lower.as_str())
}

fn parse_number(s: &str) -> Result<f64, ()> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or(())
}

fn is_range(allowed: &str) -> bool {
    RANGE_REGEX.is_match(allowed)
}

/// Split an enum spec on `|` or `,`, trimming blanks and quotes
fn enum_members(allowed: &str) -> Vec<String> {
    allowed
        .split(['|', ','])
        .map(|m| m.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string())
        .collect()
}

/// Check membership of `value` in an enum spec such as `A|B|C|`.
///
/// A trailing separator admits the empty value. With `multi`, `value` is a
/// comma list and every member must be allowed; an empty member mixed with
/// non-empty ones is rejected.
pub fn check_in_enums(value: &str, allowed: &str, multi: bool) -> Result<(), ValidateError> {
    let members = enum_members(allowed);
    let not_in = || ValidateError::NotInEnum {
        value: value.to_string(),
        allowed: allowed.to_string(),
    };

    if !multi {
        return if members.iter().any(|m| m == value.trim()) {
            Ok(())
        } else {
            Err(not_in())
        };
    }

    let values: Vec<&str> = value.split(',').map(str::trim).collect();
    let empties = values.iter().filter(|v| v.is_empty()).count();
    if empties > 0 && empties < values.len() {
        return Err(not_in());
    }
    if values.iter().all(|v| members.iter().any(|m| m == v)) {
        Ok(())
    } else {
        Err(not_in())
    }
}

/// Check a numeric value against a range such as `(0,2]`.
///
/// Parentheses are open bounds, brackets closed; an empty bound is unbounded.
pub fn check_in_range(value: &str, range: &str) -> Result<(), ValidateError> {
    let number = parse_number(value).map_err(|_| invalid(value, "NUMBER"))?;
    check_number_in_range(value, number, range, parse_number)
}

fn check_number_in_range(
    value: &str,
    number: f64,
    range: &str,
    parse_bound: impl Fn(&str) -> Result<f64, ()>,
) -> Result<(), ValidateError> {
    let caps = RANGE_REGEX
        .captures(range)
        .ok_or_else(|| ValidateError::InvalidRange(range.to_string()))?;

    let bound = |s: &str| -> Result<Option<f64>, ValidateError> {
        if s.is_empty() {
            Ok(None)
        } else {
            parse_bound(s)
                .map(Some)
                .map_err(|_| ValidateError::InvalidRange(range.to_string()))
        }
    };
    let lower = bound(&caps[2])?;
    let upper = bound(&caps[3])?;
    let lower_closed = &caps[1] == "[";
    let upper_closed = &caps[4] == "]";

    let above = match lower {
        None => true,
        Some(l) if lower_closed => number >= l,
        Some(l) => number > l,
    };
    let below = match upper {
        None => true,
        Some(u) if upper_closed => number <= u,
        Some(u) => number < u,
    };

    if above && below {
        Ok(())
    } else {
        Err(ValidateError::OutOfRange {
            value: value.to_string(),
            range: range.to_string(),
        })
    }
}

/// BYTES / DURATION: parse to a number, then RANGE or ENUM over that number
fn check_measured(
    value: &str,
    allowed: &str,
    expected: &str,
    parse: impl Fn(&str) -> Result<f64, ()>,
) -> Result<(), ValidateError> {
    let number = parse(value).map_err(|_| invalid(value, expected))?;
    if allowed.trim().is_empty() {
        return Ok(());
    }
    if is_range(allowed) {
        return check_number_in_range(value, number, allowed, &parse);
    }

    let matched = enum_members(allowed)
        .iter()
        .filter(|m| !m.is_empty())
        .any(|m| parse(m).is_ok_and(|n| n == number));
    if matched {
        Ok(())
    } else {
        Err(ValidateError::NotInEnum {
            value: value.to_string(),
            allowed: allowed.to_string(),
        })
    }
}

fn check_regex(value: &str, pattern: &str) -> Result<(), ValidateError> {
    let re = Regex::new(pattern).map_err(|e| ValidateError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    if re.is_match(value) {
        Ok(())
    } else {
        Err(ValidateError::RegexMismatch {
            value: value.to_string(),
            pattern: pattern.to_string(),
        })
    }
}

fn check_list(value: &str, allowed: &str) -> Result<(), ValidateError> {
    let members: Vec<&str> = value.split(',').map(str::trim).collect();
    if members.iter().any(|m| m.is_empty()) && !value.trim().is_empty() {
        return Err(invalid(value, "LIST"));
    }
    if allowed.trim().is_empty() || value.trim().is_empty() {
        return Ok(());
    }
    check_in_enums(value, allowed, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_check_in_range_boundaries() {
        assert!(check_in_range("0", "(0,2]").is_err());
        assert!(check_in_range("2", "(0,2]").is_ok());
        assert!(check_in_range("1.5", "(0,2]").is_ok());
        assert!(check_in_range("2", "(0,2)").is_err());
        assert!(check_in_range("0", "[0,2)").is_ok());
        assert!(check_in_range("-1", "[0,2)").is_err());
    }

    #[test]
    fn test_check_in_range_unbounded() {
        assert!(check_in_range("999999", "[1,]").is_ok());
        assert!(check_in_range("-5", "(,0)").is_ok());
        assert!(check_in_range("0", "(,0)").is_err());
    }

    #[test]
    fn test_check_in_range_bad_input() {
        assert!(matches!(
            check_in_range("1", "0-2"),
            Err(ValidateError::InvalidRange(_))
        ));
        assert!(matches!(
            check_in_range("abc", "(0,2]"),
            Err(ValidateError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_check_in_enums() {
        assert!(check_in_enums("D", "A|B|C|", false).is_err());
        assert!(check_in_enums("B", "A|B|C|", false).is_ok());
        assert!(check_in_enums("", "A|B|C|", false).is_ok());
        assert!(check_in_enums("", "A|B|C", false).is_err());
        assert!(check_in_enums("A", "'A', 'B'", false).is_ok());
    }

    #[test]
    fn test_check_in_enums_multi() {
        assert!(check_in_enums("A,D", "A|B|C|", true).is_err());
        assert!(check_in_enums("A,C", "A|B|C|", true).is_ok());
        assert!(check_in_enums("A,,C", "A|B|C|", true).is_err());
        assert!(check_in_enums("", "A|B|C|", true).is_ok());
    }

    #[test]
    fn test_bytes_scenarios() {
        assert!(validate_value("1024", "STRING", "BYTES", "(0,2048)").is_ok());
        assert!(validate_value("2g", "STRING", "BYTES", "(0,2048k)").is_err());
        assert!(validate_value("1m", "STRING", "BYTES", "(0,2048k)").is_ok());
        assert!(validate_value("64m", "STRING", "BYTES", "32m|64m|128m").is_ok());
        assert!(validate_value("65536k", "STRING", "BYTES", "32m|64m").is_ok());
        assert!(validate_value("100m", "STRING", "BYTES", "32m|64m").is_err());
        assert!(validate_value("lots", "STRING", "BYTES", "").is_err());
    }

    #[test]
    fn test_duration() {
        assert!(validate_value("1h", "STRING", "DURATION", "[60,86400]").is_ok());
        assert!(validate_value("2d", "STRING", "DURATION", "[60,86400]").is_err());
        assert!(validate_value("30", "STRING", "DURATION", "(0,1m]").is_ok());
        assert!(validate_value("1w2d3m1s", "STRING", "DURATION", "").is_ok());
    }

    #[test]
    fn test_type_subtype_matrix() {
        assert!(matches!(
            validate_value("1", "INT", "BYTES", ""),
            Err(ValidateError::UnsupportedSubType { .. })
        ));
        assert!(matches!(
            validate_value("x", "STRING", "RANGE", "(0,1)"),
            Err(ValidateError::UnsupportedSubType { .. })
        ));
        assert!(matches!(
            validate_value("x", "STRING", "NOPE", ""),
            Err(ValidateError::UnsupportedSubType { .. })
        ));
        assert!(matches!(
            validate_value("x", "BLOB", "", ""),
            Err(ValidateError::UnknownType(_))
        ));
    }

    #[test]
    fn test_numeric_types() {
        assert!(validate_value("42", "INT", "", "").is_ok());
        assert!(validate_value("4.2", "INT", "", "").is_err());
        assert!(validate_value("4.2", "FLOAT", "RANGE", "[0,5]").is_ok());
        assert!(validate_value("3", "NUMBER", "ENUM", "1|2|3").is_ok());
        assert!(validate_value("x", "NUMBER", "", "").is_err());
    }

    #[test]
    fn test_bool_and_flag() {
        assert!(validate_value("ON", "BOOL", "", "").is_ok());
        assert!(validate_value("maybe", "BOOL", "", "").is_err());
        assert!(validate_value("", "BOOL", "", "").is_err());
        assert!(validate_value("", "BOOL", "FLAG", "").is_ok());
        assert!(validate_value("true", "BOOL", "ENUM", "true|false").is_ok());
    }

    #[test]
    fn test_auto_detect() {
        assert!(validate_value("5", "INT", "", "[1,3]").is_err());
        assert!(validate_value("2", "INT", "", "[1,3]").is_ok());
        assert!(validate_value("ROW", "STRING", "", "ROW|MIXED|STATEMENT").is_ok());
        assert!(validate_value("XX", "STRING", "", "ROW|MIXED|STATEMENT").is_err());
        assert!(validate_value("anything", "STRING", "", "").is_ok());
    }

    #[test]
    fn test_regex_json_map_list() {
        assert!(validate_value("abc123", "STRING", "REGEX", "^[a-z]+[0-9]+$").is_ok());
        assert!(validate_value("123abc", "STRING", "REGEX", "^[a-z]+[0-9]+$").is_err());
        assert!(matches!(
            validate_value("x", "STRING", "REGEX", "(unclosed"),
            Err(ValidateError::InvalidRegex { .. })
        ));

        assert!(validate_value("[1,2]", "STRING", "JSON", "").is_ok());
        assert!(validate_value("{bad", "STRING", "JSON", "").is_err());
        assert!(validate_value(r#"{"a":1}"#, "STRING", "MAP", "").is_ok());
        assert!(validate_value("[1,2]", "STRING", "MAP", "").is_err());

        assert!(validate_value("a,b", "STRING", "LIST", "").is_ok());
        assert!(validate_value("a,,b", "STRING", "LIST", "").is_err());
        assert!(validate_value("a,b", "STRING", "LIST", "a|b|c").is_ok());
        assert!(validate_value("a,d", "STRING", "LIST", "a|b|c").is_err());
    }

    proptest! {
        #[test]
        fn prop_closed_range_contains_bounds(lo in -1000i64..1000, width in 0i64..1000) {
            let hi = lo + width;
            let range = format!("[{},{}]", lo, hi);
            prop_assert!(check_in_range(&lo.to_string(), &range).is_ok());
            prop_assert!(check_in_range(&hi.to_string(), &range).is_ok());
            prop_assert!(check_in_range(&(hi + 1).to_string(), &range).is_err());
        }

        #[test]
        fn prop_open_range_excludes_bounds(lo in -1000i64..1000, width in 1i64..1000) {
            let hi = lo + width;
            let range = format!("({},{})", lo, hi);
            prop_assert!(check_in_range(&lo.to_string(), &range).is_err());
            prop_assert!(check_in_range(&hi.to_string(), &range).is_err());
        }
    }
}
