//! Human-readable size and duration parsing
//!
//! Sizes are 1024-based (`64m`, `1G`, `512KiB`, `2048kb`); a bare number is a
//! byte count. Durations are composite strings such as `1w2d3m1s` with units
//! `w`, `d`, `h`, `m`, `s` and `ms`; a bare number is a count of seconds.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static BYTES_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)\s*(\d+(?:\.\d+)?)\s*([kmgtp]?)(i?b)?\s*$").expect("Invalid regex pattern")
});

static DURATION_PART_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)(ms|w|d|h|m|s)").expect("Invalid regex pattern")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit.to_ascii_lowercase().as_str() {
        "k" => 1024_f64,
        "m" => 1024_f64.powi(2),
        "g" => 1024_f64.powi(3),
        "t" => 1024_f64.powi(4),
        "p" => 1024_f64.powi(5),
        _ => 1_f64,
    }
}

/// Parse a human-readable size into a byte count.
pub fn parse_bytes(input: &str) -> Result<f64, UnitError> {
    let caps = BYTES_REGEX
        .captures(input)
        .ok_or_else(|| UnitError::InvalidSize(input.to_string()))?;

    let number: f64 = caps[1]
        .parse()
        .map_err(|_| UnitError::InvalidSize(input.to_string()))?;
    let unit = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    // "ib" only makes sense after a unit letter: "kib" is fine, "10ib" is not
    if unit.is_empty()
        && caps
            .get(3)
            .is_some_and(|m| m.as_str().eq_ignore_ascii_case("ib"))
    {
        return Err(UnitError::InvalidSize(input.to_string()));
    }

    Ok((number * unit_multiplier(unit)).floor())
}

/// Parse an extended duration string into seconds.
pub fn parse_duration_secs(input: &str) -> Result<f64, UnitError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UnitError::InvalidDuration(input.to_string()));
    }

    if let Ok(secs) = trimmed.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            return Ok(secs);
        }
        return Err(UnitError::InvalidDuration(input.to_string()));
    }

    let mut total = 0_f64;
    let mut consumed = 0;
    for caps in DURATION_PART_REGEX.captures_iter(trimmed) {
        let whole = caps.get(0).ok_or_else(|| UnitError::InvalidDuration(input.to_string()))?;
        if whole.start() != consumed {
            return Err(UnitError::InvalidDuration(input.to_string()));
        }
        consumed = whole.end();

        let amount: f64 = caps[1]
            .parse()
            .map_err(|_| UnitError::InvalidDuration(input.to_string()))?;
        let factor = match &caps[2] {
            "w" => 7.0 * 86400.0,
            "d" => 86400.0,
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            _ => 0.001,
        };
        total += amount * factor;
    }

    if consumed != trimmed.len() {
        return Err(UnitError::InvalidDuration(input.to_string()));
    }
    Ok(total)
}
