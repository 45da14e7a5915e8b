use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::cli::ProviderKind;
use crate::wire::{GenerationRequest, GenerationReply};

pub mod gemini;
pub mod openai;
pub mod ollama;

/// One outbound call to a text-generation service. No retries.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn send(&self, req: &GenerationRequest) -> Result<GenerationReply>;
}

pub type DynProvider = Box<dyn Provider + Send + Sync>;

fn api_key(vars: &[&str]) -> Result<String> {
    vars.iter()
        .find_map(|v| std::env::var(v).ok().filter(|k| !k.trim().is_empty()))
        .ok_or_else(|| anyhow!("{} env var is not set", vars.join(" / ")))
}

pub fn make_provider(
    kind: ProviderKind,
    timeout_secs: u64,
    api_base: Option<String>,
) -> Result<DynProvider> {
    let timeout = Duration::from_secs(timeout_secs);
    match kind {
        ProviderKind::Gemini => Ok(Box::new(gemini::Gemini::new(
            api_key(&["GEMINI_API_KEY", "API_KEY"])?,
            api_base.unwrap_or_else(|| gemini::DEFAULT_BASE.into()),
            timeout,
        ))),
        ProviderKind::OpenAI => Ok(Box::new(openai::OpenAIProvider::new(
            api_key(&["OPENAI_API_KEY"])?,
            api_base.unwrap_or_else(|| openai::DEFAULT_BASE.into()),
            timeout,
        ))),
        ProviderKind::Ollama => Ok(Box::new(ollama::Ollama {
            url: api_base.unwrap_or_else(|| ollama::DEFAULT_URL.into()),
            timeout,
        })),
    }
}

#[cfg(test)]
pub(crate) mod fake;
