use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::Provider;
use crate::wire::{GenerationReply, GenerationRequest};

pub const DEFAULT_URL: &str = "http://localhost:11434";

pub struct Ollama {
    pub url: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: MsgOut,
}

#[derive(Deserialize)]
struct MsgOut {
    #[serde(default)]
    content: String,
}

fn to_request(req: &GenerationRequest) -> ChatRequest<'_> {
    ChatRequest {
        model: &req.model,
        messages: vec![
            Msg { role: "system", content: &req.system },
            Msg { role: "user", content: &req.prompt },
        ],
        stream: false,
        format: req.schema.as_ref().map(|s| &s.schema),
        options: req.temperature.map(|temperature| OllamaOptions { temperature }),
    }
}

#[async_trait]
impl Provider for Ollama {
    async fn send(&self, req: &GenerationRequest) -> Result<GenerationReply> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let client = Client::builder().timeout(self.timeout).build()?;
        tracing::debug!(%url, model = %req.model, stage = req.stage.as_str(), "ollama request");

        let resp = client
            .post(&url)
            .json(&to_request(req))
            .send()
            .await
            .context("ollama request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("ollama read body failed")?;
        tracing::debug!(%status, bytes = text.len(), "ollama response");

        if !status.is_success() {
            return Err(anyhow!("Ollama error ({}): {}", status, text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("ollama response parse error: {e}"))?;
        let content = parsed.message.content;

        Ok(GenerationReply {
            text: if content.is_empty() { None } else { Some(content) },
            structured: req.schema.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{ResponseSchema, Stage};
    use serde_json::json;

    #[test]
    fn schema_is_sent_as_format() {
        let req = GenerationRequest {
            stage: Stage::Products,
            model: "llama3".into(),
            system: "sys".into(),
            prompt: "p".into(),
            temperature: Some(0.3),
            schema: Some(ResponseSchema { name: "s".into(), schema: json!({"type": "object"}) }),
        };
        let body = serde_json::to_value(to_request(&req)).unwrap();
        assert_eq!(body["format"]["type"], "object");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
    }
}
