//! Decoding of model replies.
//!
//! Every structured step goes through [`parse_structured_reply`]: a direct
//! parse when the service honoured structured-output mode, then a best-effort
//! recovery that takes the text between the first `{` and the last `}`.
//! Nothing here invents data for a required field.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::WizardError;
use crate::wire::{GenerationReply, ImprovedContent, Improvement};

pub const DEFAULT_RATIONALE: &str = "Millora pedagògica aplicada.";

fn malformed(reason: impl Into<String>, raw: &str) -> WizardError {
    WizardError::MalformedResponse { reason: reason.into(), raw: raw.to_string() }
}

/// Slice from the first `{` to the last `}` (inclusive), if both exist in order.
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Decode a reply into a JSON object without committing to a shape yet.
pub fn decode_object(reply: &GenerationReply) -> Result<Map<String, Value>, WizardError> {
    let text = reply.text.as_deref().unwrap_or_default();
    if text.trim().is_empty() {
        return Err(malformed("empty reply", text));
    }

    if reply.structured {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(_) => tracing::debug!("structured reply is not an object; trying span recovery"),
            Err(e) => tracing::debug!(error = %e, "structured reply did not parse; trying span recovery"),
        }
    }

    let span = extract_json_span(text).ok_or_else(|| malformed("no JSON object in reply", text))?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(malformed("reply span is not a JSON object", text)),
        Err(e) => Err(malformed(format!("reply span is not valid JSON: {e}"), text)),
    }
}

/// Parse a structured reply into `T`.
pub fn parse_structured_reply<T: DeserializeOwned>(reply: &GenerationReply) -> Result<T, WizardError> {
    let map = decode_object(reply)?;
    serde_json::from_value(Value::Object(map)).map_err(|e| {
        malformed(
            format!("unexpected reply shape: {e}"),
            reply.text.as_deref().unwrap_or_default(),
        )
    })
}

/// Improve-proposal replies get two allowances: the lesson fields may sit at
/// the top level instead of under `improved`, and a missing rationale becomes
/// [`DEFAULT_RATIONALE`].
pub fn parse_improvement(reply: &GenerationReply) -> Result<Improvement, WizardError> {
    let raw = reply.text.as_deref().unwrap_or_default();
    let mut map = decode_object(reply)?;

    let rationale = match map.remove("improvementSuggestion") {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::String(_)) | Some(Value::Null) | None => DEFAULT_RATIONALE.to_string(),
        Some(other) => return Err(malformed(format!("improvementSuggestion is not text: {other}"), raw)),
    };

    let improved_value = match map.remove("improved") {
        Some(v) => v,
        None if map.contains_key("titol") => Value::Object(map),
        None => return Err(malformed("reply has no improved lesson", raw)),
    };

    let improved: ImprovedContent = serde_json::from_value(improved_value)
        .map_err(|e| malformed(format!("improved lesson has unexpected shape: {e}"), raw))?;

    Ok(Improvement { rationale, improved })
}

/// Free-text steps keep the reply verbatim; an empty reply becomes `placeholder`.
pub fn free_text(reply: &GenerationReply, placeholder: &str) -> String {
    match reply.text.as_deref() {
        Some(t) if !t.trim().is_empty() => t.to_string(),
        _ => placeholder.to_string(),
    }
}
