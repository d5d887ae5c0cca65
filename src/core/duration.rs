// src/core/duration.rs

//! Human-friendly durations for TTL settings: `500ms`, `60s`, `15m`, `6h`,
//! `1d`, compounds such as `1h30m`, and a bare `0`.

use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

lazy_static! {
    static ref DURATION_RE: Regex = Regex::new(r"^(?:\d+(?:ms|s|m|h|d))+$").expect("valid duration pattern");
    static ref COMPONENT_RE: Regex = Regex::new(r"(\d+)(ms|s|m|h|d)").expect("valid component pattern");
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration '{0}' (expected e.g. 500ms, 60s, 15m, 6h, 1d or 1h30m)")]
    Invalid(String),
    #[error("duration '{0}' is too large")]
    Overflow(String),
}

/// Parses a duration such as `6h` or `1h30m`.
pub fn parse_duration(raw: &str) -> Result<Duration, DurationError> {
    let text = raw.trim().to_lowercase();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if !DURATION_RE.is_match(&text) {
        return Err(DurationError::Invalid(raw.trim().to_string()));
    }

    let mut total_ms: u64 = 0;
    for caps in COMPONENT_RE.captures_iter(&text) {
        let (Some(amount), Some(unit)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let amount: u64 = amount
            .as_str()
            .parse()
            .map_err(|_| DurationError::Overflow(raw.trim().to_string()))?;
        let unit_ms: u64 = match unit.as_str() {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            _ => 86_400_000,
        };
        total_ms = amount
            .checked_mul(unit_ms)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(|| DurationError::Overflow(raw.trim().to_string()))?;
    }
    Ok(Duration::from_millis(total_ms))
}

/// Renders a duration in the same notation [`parse_duration`] accepts.
pub fn format_duration(duration: Duration) -> String {
    let mut ms = duration.as_millis();
    if ms == 0 {
        return "0".to_string();
    }
    let mut out = String::new();
    for (unit, size) in [("d", 86_400_000u128), ("h", 3_600_000), ("m", 60_000), ("s", 1_000), ("ms", 1)] {
        let amount = ms / size;
        if amount > 0 {
            out.push_str(&format!("{}{}", amount, unit));
            ms %= size;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("60s"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration(" 6H "), Ok(Duration::from_secs(21_600)));
        assert_eq!(parse_duration("1d"), Ok(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5_400)));
        assert_eq!(parse_duration("1m500ms"), Ok(Duration::from_millis(60_500)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "10", "-5s", "1x", "h", "1h 30m", "1.5h"] {
            assert!(
                matches!(parse_duration(bad), Err(DurationError::Invalid(_))),
                "accepted '{}'",
                bad
            );
        }
        assert!(matches!(
            parse_duration("99999999999999999999d"),
            Err(DurationError::Overflow(_))
        ));
    }

    #[test]
    fn test_format_round_trips_defaults() {
        assert_eq!(format_duration(Duration::from_secs(21_600)), "6h");
        assert_eq!(format_duration(Duration::from_secs(86_400)), "1d");
        assert_eq!(format_duration(Duration::from_secs(5_400)), "1h30m");
        assert_eq!(format_duration(Duration::from_secs(60)), "1m");
        assert_eq!(format_duration(Duration::ZERO), "0");
    }
}
