//! Measured values with unit normalization
//!
//! Lab results and vitals are compared on their numeric value after
//! converting to a common unit. Values that do not parse as numbers are
//! compared on their compact key.

use medrecon_domain::normalize::compact_key;
use medrecon_domain::VitalKind;

/// A parsed value
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    /// Single number in a canonical unit
    Scalar {
        /// Value after unit conversion
        value: f64,
        /// Canonical unit key, if any unit was given
        unit: Option<String>,
    },
    /// Systolic / diastolic pair
    Pair {
        /// Systolic
        systolic: f64,
        /// Diastolic
        diastolic: f64,
    },
    /// Non-numeric value, compact key
    Text(String),
}

/// Split a leading number off `s`, returning it and the remainder
fn leading_number(s: &str) -> Option<(f64, &str)> {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    let number = s[..end].trim_end_matches('.').parse::<f64>().ok()?;
    Some((number, &s[end..]))
}

/// Convert a value to its canonical unit
fn canonical_unit(value: f64, unit: &str) -> (f64, Option<String>) {
    let key: String = compact_key(unit).chars().filter(|c| *c != '.').collect();
    match key.as_str() {
        "" => (value, None),
        "°f" | "f" | "degf" | "fahrenheit" => ((value - 32.0) * 5.0 / 9.0, Some("c".to_string())),
        "°c" | "c" | "degc" | "celsius" => (value, Some("c".to_string())),
        "lb" | "lbs" | "pound" | "pounds" => (value * 0.453_592_37, Some("kg".to_string())),
        "kg" | "kgs" => (value, Some("kg".to_string())),
        "in" | "inch" | "inches" => (value * 2.54, Some("cm".to_string())),
        "cm" => (value, Some("cm".to_string())),
        "m" => (value * 100.0, Some("cm".to_string())),
        "bpm" | "beats/min" | "/min" | "breaths/min" => (value, Some("/min".to_string())),
        other => (value, Some(other.to_string())),
    }
}

/// Parse a raw value, using `unit` when the value carries none
pub fn parse_measurement(value: &str, unit: Option<&str>, kind: Option<VitalKind>) -> Measurement {
    let trimmed = value.trim();

    if let Some((left, right)) = trimmed.split_once('/') {
        if let (Some((systolic, _)), Some((diastolic, _))) =
            (leading_number(left), leading_number(right))
        {
            if kind == Some(VitalKind::BloodPressure) || left.trim().parse::<f64>().is_ok() {
                return Measurement::Pair { systolic, diastolic };
            }
        }
    }

    match leading_number(trimmed) {
        Some((number, rest)) => {
            let rest = rest.trim();
            let unit = if rest.is_empty() { unit.unwrap_or("") } else { rest };
            let (value, unit) = canonical_unit(number, unit);
            Measurement::Scalar { value, unit }
        }
        None => Measurement::Text(compact_key(trimmed)),
    }
}

fn within(a: f64, b: f64, tolerance: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= tolerance * a.abs().max(b.abs())
}

/// Whether two measurements agree within a relative tolerance
pub fn equivalent(a: &Measurement, b: &Measurement, tolerance: f64) -> bool {
    match (a, b) {
        (
            Measurement::Scalar { value: va, unit: ua },
            Measurement::Scalar { value: vb, unit: ub },
        ) => {
            let units_compatible = match (ua, ub) {
                (Some(x), Some(y)) => x == y,
                _ => true,
            };
            units_compatible && within(*va, *vb, tolerance)
        }
        (
            Measurement::Pair { systolic: sa, diastolic: da },
            Measurement::Pair { systolic: sb, diastolic: db },
        ) => within(*sa, *sb, tolerance) && within(*da, *db, tolerance),
        (Measurement::Text(x), Measurement::Text(y)) => x == y,
        _ => false,
    }
}
