use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::Provider;
use crate::wire::{GenerationReply, GenerationRequest};

pub const DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Generative Language `generateContent` adapter.
pub struct Gemini {
    client: Client,
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl Gemini {
    pub fn new(api_key: String, api_base: String, timeout: Duration) -> Self {
        Self { client: Client::new(), api_key, api_base, timeout }
    }
}

/// Gemini's schema dialect spells types in upper case ("OBJECT", "STRING").
pub(crate) fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                let converted = match (k.as_str(), v) {
                    ("type", Value::String(t)) => Value::String(t.to_uppercase()),
                    _ => to_gemini_schema(v),
                };
                out.insert(k.clone(), converted);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

pub(crate) fn build_body(req: &GenerationRequest) -> Value {
    let mut generation_config = Map::new();
    if let Some(t) = req.temperature {
        generation_config.insert("temperature".into(), json!(t));
    }
    if let Some(schema) = &req.schema {
        generation_config.insert("responseMimeType".into(), json!("application/json"));
        generation_config.insert("responseSchema".into(), to_gemini_schema(&schema.schema));
    }

    json!({
        "systemInstruction": { "parts": [{ "text": req.system }] },
        "contents": [{ "role": "user", "parts": [{ "text": req.prompt }] }],
        "generationConfig": Value::Object(generation_config),
    })
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// Concatenated text of the first candidate; `None` when there is none.
pub(crate) fn extract_text(body: &str) -> Result<Option<String>> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| anyhow!("failed to parse Gemini response: {e}\nRaw: {body}"))?;
    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    Ok(if text.is_empty() { None } else { Some(text) })
}

#[async_trait]
impl Provider for Gemini {
    async fn send(&self, req: &GenerationRequest) -> Result<GenerationReply> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            req.model
        );
        let body = build_body(req);
        tracing::debug!(%url, stage = req.stage.as_str(), "gemini request");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("gemini request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("gemini read body failed")?;
        tracing::debug!(%status, bytes = text.len(), "gemini response");

        if !status.is_success() {
            return Err(anyhow!("Gemini API error ({}): {}", status, text));
        }

        Ok(GenerationReply { text: extract_text(&text)?, structured: req.schema.is_some() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ResponseSchema, Stage};

    fn request(schema: Option<ResponseSchema>) -> GenerationRequest {
        GenerationRequest {
            stage: Stage::Summary,
            model: "gemini-3-flash-preview".into(),
            system: "sys".into(),
            prompt: "hola".into(),
            temperature: Some(0.5),
            schema,
        }
    }

    #[test]
    fn schema_types_are_upper_cased_recursively() {
        let s = json!({"type": "object", "properties": {"a": {"type": "array", "items": {"type": "string"}}}});
        let g = to_gemini_schema(&s);
        assert_eq!(g["type"], "OBJECT");
        assert_eq!(g["properties"]["a"]["items"]["type"], "STRING");
    }

    #[test]
    fn property_named_type_is_not_mangled() {
        let s = json!({"type": "object", "properties": {"type": {"type": "string"}}});
        let g = to_gemini_schema(&s);
        assert_eq!(g["properties"]["type"]["type"], "STRING");
    }

    #[test]
    fn body_requests_json_only_with_schema() {
        let plain = build_body(&request(None));
        assert!(plain["generationConfig"].get("responseMimeType").is_none());
        assert_eq!(plain["contents"][0]["parts"][0]["text"], "hola");

        let schema = ResponseSchema { name: "x".into(), schema: json!({"type": "object"}) };
        let structured = build_body(&request(Some(schema)));
        assert_eq!(structured["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(structured["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert_eq!(structured["systemInstruction"]["parts"][0]["text"], "sys");
    }

    #[test]
    fn text_is_joined_across_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hola, "},{"text":"món"}]}}]}"#;
        assert_eq!(extract_text(body).unwrap().as_deref(), Some("Hola, món"));
    }

    #[test]
    fn blocked_prompt_yields_no_text() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert_eq!(extract_text(body).unwrap(), None);
    }
}
