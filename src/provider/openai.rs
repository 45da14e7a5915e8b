use async_trait::async_trait;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::wire::{GenerationReply, GenerationRequest};

pub const DEFAULT_BASE: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions adapter. The system instruction and the step
/// prompt go out as two messages; structured steps ask for a JSON object.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl OpenAIProvider {
    pub fn new(api_key: String, api_base: String, timeout: Duration) -> Self {
        Self { client: Client::new(), api_key, api_base, timeout }
    }
}

pub(crate) fn build_body(req: &GenerationRequest) -> Value {
    let mut body = json!({
        "model": req.model,
        "messages": [
            { "role": "system", "content": req.system },
            { "role": "user", "content": req.prompt }
        ],
    });
    if let Some(t) = req.temperature {
        body["temperature"] = json!(t);
    }
    if req.schema.is_some() {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

// Minimal structs to parse the chat response
#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

pub(crate) fn extract_text(body: &str) -> Result<Option<String>> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| anyhow!("Failed to parse OpenAI response: {e}\nRaw: {body}"))?;
    Ok(parsed.choices.into_iter().next().and_then(|c| c.message.content))
}

#[async_trait]
impl super::Provider for OpenAIProvider {
    async fn send(&self, req: &GenerationRequest) -> Result<GenerationReply> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let body = build_body(req);
        tracing::debug!(%url, model = %req.model, stage = req.stage.as_str(), "openai request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("openai read body failed")?;
        tracing::debug!(%status, bytes = text.len(), "openai response");

        if !status.is_success() {
            return Err(anyhow!("OpenAI API error ({}): {}", status, text));
        }

        Ok(GenerationReply { text: extract_text(&text)?, structured: req.schema.is_some() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ResponseSchema, Stage};

    #[test]
    fn json_mode_follows_schema_request() {
        let mut req = GenerationRequest {
            stage: Stage::Guide,
            model: "gpt-4.1-mini".into(),
            system: "sys".into(),
            prompt: "fitxa".into(),
            temperature: None,
            schema: None,
        };
        let body = build_body(&req);
        assert!(body.get("response_format").is_none());
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"][1]["content"], "fitxa");

        req.schema = Some(ResponseSchema { name: "s".into(), schema: json!({}) });
        req.temperature = Some(0.2);
        let body = build_body(&req);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body["temperature"].as_f64().is_some());
    }

    #[test]
    fn null_content_is_no_text() {
        let body = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert_eq!(extract_text(body).unwrap(), None);
    }
}
