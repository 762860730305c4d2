//! Coerces whatever the reasoning service put in a calorie field into one
//! non-negative integer. Total by construction: garbage yields
//! [`DEFAULT_CALORIES`], never an error.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

pub const DEFAULT_CALORIES: u32 = 200;

lazy_static! {
    static ref NOISE: Regex = Regex::new(r"[^0-9.,\-–—]").unwrap();
    static ref RANGE: Regex = Regex::new(r"^(\d+(?:\.\d+)?)[-–—](\d+(?:\.\d+)?)$").unwrap();
    static ref LEADING: Regex = Regex::new(r"^(\d+(?:\.\d+)?)").unwrap();
    static ref GROUPED: Regex = Regex::new(r"^\d{1,3}(?:,\d{3})+$").unwrap();
}

pub fn normalize(value: &Value) -> u32 {
    match value {
        Value::Number(n) => n.as_f64().map(normalize_number).unwrap_or(DEFAULT_CALORIES),
        Value::String(s) => normalize_text(s),
        other => {
            warn!(value = %other, "calorie value is not numeric; using default");
            DEFAULT_CALORIES
        }
    }
}

pub fn normalize_number(value: f64) -> u32 {
    if !value.is_finite() {
        return DEFAULT_CALORIES;
    }
    value.round().clamp(0.0, u32::MAX as f64) as u32
}

/// `"200-300"` is the mean of the range, `"~450 ккал"` is 450. Commas are
/// decimal separators unless they group thousands, as in `"1,200"`.
pub fn normalize_text(raw: &str) -> u32 {
    let stripped = NOISE.replace_all(raw, "");
    // "прим. 320" leaves a dangling dot in front of the number.
    let stripped = stripped.trim_start_matches(|c: char| c == '.' || c == ',');
    let cleaned = if GROUPED.is_match(stripped) {
        stripped.replace(',', "")
    } else {
        stripped.replace(',', ".")
    };

    if let Some(caps) = RANGE.captures(&cleaned) {
        if let (Ok(low), Ok(high)) = (caps[1].parse::<f64>(), caps[2].parse::<f64>()) {
            return normalize_number((low + high) / 2.0);
        }
    }

    if let Some(caps) = LEADING.captures(&cleaned) {
        if let Ok(v) = caps[1].parse::<f64>() {
            return normalize_number(v);
        }
    }

    warn!(value = raw, "could not parse calorie value; using default");
    DEFAULT_CALORIES
}
