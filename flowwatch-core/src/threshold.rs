//! Threshold parsing, evaluation and compact formatting.
//!
//! Thresholds are typed by hand ("100m", "-20m", "2b"), so parsing never fails:
//! anything unreadable resolves to zero and the display layer decides whether
//! to flag it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::OnceLock};

/// `sign? digits (.digits)? unit?`
fn unit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([+-]?\d*\.?\d+)([kmb]?)$").expect("built-in threshold pattern must compile")
    })
}

/// Leading float, used when the unit pattern does not match (e.g. "1e6", "12 m").
fn float_prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?")
            .expect("built-in float pattern must compile")
    })
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "k" => 1e3,
        "m" => 1e6,
        "b" => 1e9,
        _ => 1.0,
    }
}

/// Parse a human-entered threshold, resolving unreadable input to `0.0`.
pub fn parse_threshold(input: &str) -> f64 {
    let normalised = input.trim().to_lowercase();

    if let Some(captures) = unit_pattern().captures(&normalised) {
        let number = captures
            .get(1)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0);
        let unit = captures.get(2).map(|m| m.as_str()).unwrap_or("");
        return number * unit_multiplier(unit);
    }

    parse_leading_float(&normalised).unwrap_or(0.0)
}

/// Parse the longest numeric prefix of `input`, ignoring trailing text.
pub fn parse_leading_float(input: &str) -> Option<f64> {
    float_prefix_pattern()
        .find(input.trim_start())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

/// Threshold value accepted by the alarm engine, from either text or a number.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct Threshold(pub f64);

impl Threshold {
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Threshold {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<&str> for Threshold {
    fn from(value: &str) -> Self {
        Self(parse_threshold(value))
    }
}

impl From<String> for Threshold {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_compact(self.0))
    }
}

/// Whether `value` breaches `threshold`.
///
/// Absolute rules compare magnitudes only. Directional rules use the sign of the
/// threshold to pick the breached side: non-negative thresholds trigger at or
/// above, negative thresholds at or below.
pub fn evaluate_threshold(value: f64, threshold: f64, is_absolute: bool) -> bool {
    if is_absolute {
        value.abs() >= threshold.abs()
    } else if threshold >= 0.0 {
        value >= threshold
    } else {
        value <= threshold
    }
}

/// Compact display form: `1.5m`, `-2.0b`, `12.3k`, or the plain number below 1000.
pub fn format_compact(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1e9 {
        format!("{:.1}b", value / 1e9)
    } else if magnitude >= 1e6 {
        format!("{:.1}m", value / 1e6)
    } else if magnitude >= 1e3 {
        format!("{:.1}k", value / 1e3)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threshold() {
        struct TestCase {
            input: &'static str,
            expected: f64,
        }

        let tests = vec![
            TestCase { input: "2.5m", expected: 2_500_000.0 },   // TC0
            TestCase { input: "-10k", expected: -10_000.0 },     // TC1
            TestCase { input: "garbage", expected: 0.0 },        // TC2
            TestCase { input: "100M", expected: 100_000_000.0 }, // TC3: case-insensitive
            TestCase { input: "  -20m ", expected: -20_000_000.0 }, // TC4: trimmed
            TestCase { input: "2b", expected: 2_000_000_000.0 }, // TC5
            TestCase { input: "+.5k", expected: 500.0 },         // TC6
            TestCase { input: "750", expected: 750.0 },          // TC7: no unit
            TestCase { input: "1e6", expected: 1_000_000.0 },    // TC8: float fallback
            TestCase { input: "12 m", expected: 12.0 },          // TC9: prefix fallback
            TestCase { input: "", expected: 0.0 },               // TC10
            TestCase { input: "m", expected: 0.0 },              // TC11
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = parse_threshold(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_threshold_from_text_and_number() {
        assert_eq!(Threshold::from("3k").value(), 3000.0);
        assert_eq!(Threshold::from(-42.0).value(), -42.0);
        assert_eq!(Threshold::from(String::from("nope")).value(), 0.0);
    }

    #[test]
    fn test_evaluate_directional() {
        assert!(evaluate_threshold(105.0, 100.0, false));
        assert!(evaluate_threshold(100.0, 100.0, false));
        assert!(!evaluate_threshold(95.0, 100.0, false));
        assert!(!evaluate_threshold(-500.0, 100.0, false));

        assert!(evaluate_threshold(-25.0, -20.0, false));
        assert!(evaluate_threshold(-20.0, -20.0, false));
        assert!(!evaluate_threshold(-10.0, -20.0, false));
        assert!(!evaluate_threshold(30.0, -20.0, false));
    }

    #[test]
    fn test_evaluate_absolute_is_sign_agnostic() {
        assert!(evaluate_threshold(60.0, -50.0, true));
        assert!(evaluate_threshold(-60.0, -50.0, true));
        assert!(evaluate_threshold(60.0, 50.0, true));
        assert!(evaluate_threshold(-60.0, 50.0, true));
        assert!(!evaluate_threshold(-40.0, -50.0, true));
        assert!(!evaluate_threshold(40.0, 50.0, true));
    }

    #[test]
    fn test_zero_threshold_always_breached_directionally() {
        assert!(evaluate_threshold(0.0, 0.0, false));
        assert!(evaluate_threshold(1.0, 0.0, false));
        assert!(evaluate_threshold(0.0, 0.0, true));
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_compact(2_500_000.0), "2.5m");
        assert_eq!(format_compact(-2_000_000_000.0), "-2.0b");
        assert_eq!(format_compact(12_345.0), "12.3k");
        assert_eq!(format_compact(105.0), "105");
        assert_eq!(format_compact(-0.5), "-0.5");
        assert_eq!(Threshold(100_000_000.0).to_string(), "100.0m");
    }
}
