//! Lenient parsing of classifier answers.
//!
//! Models wrap JSON in markdown fences, quote booleans and numbers, or leave
//! fields out. None of that is fatal; only a reply with no JSON object at
//! all is rejected.

use serde_json::{Map, Value};

use crate::llm::LlmError;
use crate::models::ClassifierVerdict;

/// Confidence used when the answer has none or an unreadable one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Parse a classifier reply into a verdict plus the raw JSON object.
pub fn parse_verdict(raw: &str) -> Result<(ClassifierVerdict, Value), LlmError> {
    let body = extract_object(raw)
        .ok_or_else(|| LlmError::Parse(format!("no JSON object in reply: {}", preview(raw))))?;
    let value: Value =
        serde_json::from_str(body).map_err(|e| LlmError::Parse(e.to_string()))?;
    let fields = value
        .as_object()
        .ok_or_else(|| LlmError::Parse("reply is not a JSON object".to_string()))?;

    let verdict = ClassifierVerdict {
        match_found: field(fields, "match_found").and_then(as_bool).unwrap_or(false),
        registration_number: field(fields, "registration_number").and_then(as_text),
        suggested_name: field(fields, "suggested_name")
            .and_then(as_text)
            .unwrap_or_default(),
        confidence: field(fields, "confidence")
            .and_then(as_confidence)
            .unwrap_or(DEFAULT_CONFIDENCE),
        reason: field(fields, "reason").and_then(as_text).unwrap_or_default(),
    };

    Ok((verdict, value))
}

/// Slice from the first `{` to the last `}`.
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

fn field<'v>(fields: &'v Map<String, Value>, name: &str) -> Option<&'v Value> {
    fields.get(name).filter(|v| !v.is_null())
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "si" | "sí" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match text.to_lowercase().as_str() {
        "" | "null" | "none" | "n/a" => None,
        _ => Some(text),
    }
}

/// Read a confidence as a fraction in [0, 1].
///
/// `"85%"` and a bare `85` both mean 0.85. Anything above 100 is unreadable.
fn as_confidence(value: &Value) -> Option<f64> {
    let (n, percent) = match value {
        Value::Number(n) => (n.as_f64()?, false),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(digits) => (digits.trim().parse::<f64>().ok()?, true),
                None => (s.parse::<f64>().ok()?, false),
            }
        }
        _ => return None,
    };
    if !n.is_finite() || n > 100.0 {
        return None;
    }
    let fraction = if percent || n > 1.0 { n / 100.0 } else { n };
    Some(fraction.clamp(0.0, 1.0))
}

fn preview(raw: &str) -> String {
    raw.chars().take(80).collect()
}
