//! Argument and payload normalization for the command surface.
//!
//! The miniserver sends arguments as path segments, JSON bodies, URL-encoded
//! strings, or single-element arrays wrapping any of those. Everything is
//! normalized here before a handler sees it.

use serde_json::{Map, Value};

use crate::error::ServerError;

/// Parse a signed integer argument. Overflow clamps, NaN and garbage are
/// rejected with a config-kind error the router maps to a wire error.
pub fn parse_i64(raw: &str) -> Result<i64, ServerError> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(v);
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_nan() => Err(ServerError::Config(format!("not a number: '{raw}'"))),
        Ok(f) => Ok(f.clamp(i64::MIN as f64, i64::MAX as f64) as i64),
        Err(_) => Err(ServerError::Config(format!("not a number: '{raw}'"))),
    }
}

/// Unsigned variant; negatives clamp to zero.
pub fn parse_u32(raw: &str) -> Result<u32, ServerError> {
    Ok(parse_i64(raw)?.clamp(0, u32::MAX as i64) as u32)
}

/// Seconds/position argument. NaN is rejected, negatives clamp to zero.
pub fn parse_seconds(raw: &str) -> Result<f64, ServerError> {
    match raw.trim().parse::<f64>() {
        Ok(f) if f.is_nan() => Err(ServerError::Config(format!("not a number: '{raw}'"))),
        Ok(f) => Ok(f.max(0.0)),
        Err(_) => Err(ServerError::Config(format!("not a number: '{raw}'"))),
    }
}

/// Comma-separated id list with set semantics: duplicates collapse, first
/// occurrence keeps its position, non-numeric entries are skipped.
pub fn parse_id_set(raw: &str) -> Vec<u32> {
    let mut out = Vec::new();
    for part in raw.split(',') {
        let Ok(id) = part.trim().parse::<u32>() else {
            continue;
        };
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Shuffle argument coercion. `None` means "toggle current state".
pub fn coerce_shuffle(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "enable" | "true" | "1" | "yes" | "on" => Some(true),
        "disable" | "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Normalize a command payload to a flat record. Accepted spellings:
/// a JSON object, a URL-encoded string (`a=1&b=2`), a bare scalar (kept
/// under `"value"`), or a single-element array wrapping any of those.
pub fn normalize_payload(raw: &str) -> Map<String, Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Map::new();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return normalize_value(value);
    }

    if trimmed.contains('=') {
        return parse_urlencoded(trimmed);
    }

    let mut map = Map::new();
    map.insert("value".to_string(), Value::String(trimmed.to_string()));
    map
}

fn normalize_value(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Array(items) if items.len() == 1 => {
            normalize_value(items.into_iter().next().unwrap_or(Value::Null))
        }
        Value::String(s) => normalize_payload(&s),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

fn parse_urlencoded(raw: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for pair in raw.split('&') {
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        if key.is_empty() {
            continue;
        }
        let key = urlencoding::decode(key)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| value.to_string());
        map.insert(key, Value::String(value));
    }
    map
}

/// Pull a string-ish field out of a normalized payload.
pub fn payload_str<'a>(payload: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    for key in keys {
        if let Some(value) = payload.get(*key).and_then(Value::as_str) {
            return Some(value);
        }
    }
    None
}
