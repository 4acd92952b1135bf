//! Exposure settings: candidate lists, current values, shutter parsing.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{CameraError, Result};

/// Exposure parameters with a `get`/`getAvailable`/`set` method triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureSetting {
    FNumber,
    ShutterSpeed,
    IsoSpeedRate,
    ExposureCompensation,
}

impl ExposureSetting {
    pub const ALL: [ExposureSetting; 4] = [
        ExposureSetting::FNumber,
        ExposureSetting::ShutterSpeed,
        ExposureSetting::IsoSpeedRate,
        ExposureSetting::ExposureCompensation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::FNumber => "FNumber",
            Self::ShutterSpeed => "ShutterSpeed",
            Self::IsoSpeedRate => "IsoSpeedRate",
            Self::ExposureCompensation => "ExposureCompensation",
        }
    }

    pub fn get_method(self) -> String {
        format!("get{}", self.name())
    }

    pub fn available_method(self) -> String {
        format!("getAvailable{}", self.name())
    }

    pub fn set_method(self) -> String {
        format!("set{}", self.name())
    }

    /// Wire form of a value. Exposure compensation is an integer step
    /// index; everything else is sent as the camera's own string.
    pub fn param(self, value: &str) -> Value {
        match self {
            Self::ExposureCompensation => value
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::from(value)),
            _ => Value::from(value),
        }
    }

    /// Parse a `getAvailable*` result into (current, candidates).
    ///
    /// ```text
    /// getAvailableFNumber                 ["5.6", ["3.5", "4.0", "5.6"]]
    /// getAvailableExposureCompensation    [0, 9, -9, 1]   (current, max, min, step)
    /// ```
    pub fn parse_available(self, result: &Value) -> Result<(Option<String>, Vec<String>)> {
        let method = self.available_method();
        let slots = result
            .as_array()
            .ok_or_else(|| CameraError::unexpected(&method, "result is not an array"))?;
        let current = slots.first().and_then(value_to_string);

        let candidates = match self {
            Self::ExposureCompensation => {
                let max = slots.get(1).and_then(Value::as_i64);
                let min = slots.get(2).and_then(Value::as_i64);
                match (min, max) {
                    (Some(min), Some(max)) => exposure_compensation_candidates(min, max),
                    _ => return Err(CameraError::unexpected(&method, "missing min/max")),
                }
            }
            _ => slots
                .get(1)
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(value_to_string).collect())
                .unwrap_or_default(),
        };

        Ok((current, candidates))
    }
}

/// Every index from `min` to `max`.
///
/// Some firmware reports the bounds swapped; they are put back in order
/// and the anomaly is logged.
pub fn exposure_compensation_candidates(min: i64, max: i64) -> Vec<String> {
    let (lo, hi) = if min > max {
        tracing::warn!(min, max, "exposure compensation bounds reported swapped");
        (max, min)
    } else {
        (min, max)
    };
    (lo..=hi).map(|v| v.to_string()).collect()
}

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Candidate lists and current values, owned by the session.
#[derive(Debug, Default, Clone)]
pub struct CameraSettingSet {
    available: HashMap<ExposureSetting, Vec<String>>,
    current: HashMap<ExposureSetting, String>,
}

impl CameraSettingSet {
    pub fn available(&self, setting: ExposureSetting) -> &[String] {
        self.available
            .get(&setting)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_available(&self, setting: ExposureSetting) -> bool {
        self.available.contains_key(&setting)
    }

    pub fn set_available(&mut self, setting: ExposureSetting, values: Vec<String>) {
        self.available.insert(setting, values);
    }

    pub fn current(&self, setting: ExposureSetting) -> Option<&str> {
        self.current.get(&setting).map(String::as_str)
    }

    pub fn set_current(&mut self, setting: ExposureSetting, value: String) {
        self.current.insert(setting, value);
    }
}

/// Reject `value` unless it is one of `valid_values`.
pub fn validate_choice(method: &str, value: &str, valid_values: &[String]) -> Result<()> {
    if valid_values.iter().any(|v| v == value) {
        return Ok(());
    }
    Err(CameraError::Validation(format!(
        "{method}: {value:?} is not one of {} available values",
        valid_values.len()
    )))
}

/// Shutter speed string to milliseconds.
///
/// - `"BULB"` is `None`.
/// - `"1/250\""` is 4 (rounded), `"4\""` is 4000, `"0.8\""` is 800.
/// - Anything unparseable is `Some(0)` so a capture is never blocked on a
///   display string the camera invented.
pub fn parse_shutter_speed_ms(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("BULB") {
        return None;
    }

    let body = raw.trim_end_matches('"').trim();
    let ms = match body.split_once('/') {
        Some((num, den)) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
            (Ok(num), Ok(den)) if den > 0.0 => num / den * 1000.0,
            _ => 0.0,
        },
        None => body.parse::<f64>().map(|secs| secs * 1000.0).unwrap_or(0.0),
    };

    if ms.is_finite() && ms > 0.0 {
        Some(ms.round() as u64)
    } else {
        Some(0)
    }
}
