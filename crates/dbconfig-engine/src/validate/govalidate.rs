//! Tag-style rule checks for GOVALIDATE values
//!
//! Rules are comma separated, e.g. `required,email` or `omitempty,min=3,max=16`.

use validator::{ValidateEmail, ValidateIp, ValidateUrl};

use super::ValidateError;

/// Check `value` against a comma separated rule list
pub fn check(value: &str, rules: &str) -> Result<(), ValidateError> {
    let rules: Vec<&str> = rules
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .collect();

    if value.is_empty() && rules.contains(&"omitempty") {
        return Ok(());
    }
    let numeric = rules.iter().any(|r| *r == "number" || *r == "numeric");

    for rule in &rules {
        check_rule(value, rule, numeric)?;
    }
    Ok(())
}

fn check_rule(value: &str, rule: &str, numeric: bool) -> Result<(), ValidateError> {
    let (name, param) = match rule.split_once('=') {
        Some((n, p)) => (n.trim(), Some(p.trim())),
        None => (rule, None),
    };

    let passed = match (name, param) {
        ("omitempty", None) => true,
        ("required", None) => !value.is_empty(),
        ("email", None) => value.validate_email(),
        ("url", None) => value.validate_url(),
        ("ip", None) => value.validate_ip(),
        ("ipv4", None) => value.validate_ipv4(),
        ("ipv6", None) => value.validate_ipv6(),
        ("number" | "numeric", None) => value.trim().parse::<f64>().is_ok(),
        ("alpha", None) => !value.is_empty() && value.chars().all(|c| c.is_ascii_alphabetic()),
        ("alphanum", None) => {
            !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric())
        }
        ("min" | "max" | "len", Some(p)) => {
            let bound = parse_param(rule, p)?;
            let measured = if numeric {
                parse_value(value, rule)?
            } else {
                value.chars().count() as f64
            };
            match name {
                "min" => measured >= bound,
                "max" => measured <= bound,
                _ => measured == bound,
            }
        }
        ("gt" | "gte" | "lt" | "lte", Some(p)) => {
            let bound = parse_param(rule, p)?;
            let measured = parse_value(value, rule)?;
            match name {
                "gt" => measured > bound,
                "gte" => measured >= bound,
                "lt" => measured < bound,
                _ => measured <= bound,
            }
        }
        ("oneof", Some(p)) => p.split_whitespace().any(|m| m == value),
        _ => return Err(ValidateError::UnknownRule(rule.to_string())),
    };

    if passed {
        Ok(())
    } else {
        Err(ValidateError::RuleFailed {
            value: value.to_string(),
            rule: rule.to_string(),
        })
    }
}

fn parse_param(rule: &str, param: &str) -> Result<f64, ValidateError> {
    param
        .parse::<f64>()
        .map_err(|_| ValidateError::UnknownRule(rule.to_string()))
}

fn parse_value(value: &str, rule: &str) -> Result<f64, ValidateError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ValidateError::RuleFailed {
            value: value.to_string(),
            rule: rule.to_string(),
        })
}
