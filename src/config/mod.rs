use anyhow::{Context, Result};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::catalog;
use crate::cli::{Args, ProviderKind};
use crate::prompt::PromptOverrides;
use crate::wizard::{Choices, FlowVariant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    /// Falls back to the provider's default model when unset.
    pub model: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Overrides the provider's default endpoint.
    pub api_base: Option<String>,
    pub flow: FlowVariant,
    pub artifacts_dir: String,
    pub export_dir: Option<String>,
    pub save_request: bool,
    pub save_response: bool,
    pub prompts: PromptOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: None,
            temperature: catalog::DEFAULT_TEMPERATURE,
            timeout_secs: 300,
            api_base: None,
            flow: FlowVariant::Full,
            artifacts_dir: ".lesson_wizard/sessions".into(),
            export_dir: None,
            save_request: false,
            save_response: false,
            prompts: PromptOverrides::default(),
        }
    }
}

impl Config {
    /// Defaults, overlaid with the TOML file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Command-line flags win over file values.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(p) = args.provider {
            self.provider = p;
        }
        if let Some(m) = &args.model {
            self.model = Some(m.clone());
        }
        if let Some(t) = args.temperature {
            self.temperature = t;
        }
        if let Some(f) = args.flow {
            self.flow = f;
        }
        if let Some(t) = args.timeout_secs {
            self.timeout_secs = t;
        }
        if let Some(d) = &args.export_dir {
            self.export_dir = Some(d.to_string_lossy().into_owned());
        }
        self.save_request |= args.save_request;
        self.save_response |= args.save_response;
        self.temperature = if self.temperature.is_finite() {
            self.temperature.clamp(0.0, 1.0)
        } else {
            catalog::DEFAULT_TEMPERATURE
        };
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Starting choices for every new session.
    pub fn choices(&self) -> Choices {
        Choices {
            model: self.model(),
            temperature: self.temperature,
            ..Choices::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_values_are_merged_over_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
provider = "ollama"
model = "llama3.1"
flow = "short"

[prompts]
evaluation = "Fes una {{{{ instrument }}}} breu per a: {{{{ guide }}}}"
"#
        )
        .unwrap();

        let cfg = Config::load(Some(f.path())).unwrap();

        assert_eq!(cfg.provider, ProviderKind::Ollama);
        assert_eq!(cfg.model(), "llama3.1");
        assert_eq!(cfg.flow, FlowVariant::Short);
        assert_eq!(cfg.timeout_secs, 300);
        assert!(cfg.prompts.evaluation.unwrap().contains("{{ guide }}"));
        assert!(cfg.prompts.summary.is_none());
    }

    #[test]
    fn flags_override_and_temperature_is_clamped() {
        let mut cfg = Config::default();
        let args = Args {
            model: Some("gemini-3-pro-preview".into()),
            temperature: Some(1.8),
            save_response: true,
            ..Args::default()
        };
        cfg.apply_args(&args);
        assert_eq!(cfg.model(), "gemini-3-pro-preview");
        assert_eq!(cfg.temperature, 1.0);
        assert!(cfg.save_response);
        assert!(!cfg.save_request);
        assert_eq!(cfg.choices().model, "gemini-3-pro-preview");
    }

    #[test]
    fn each_provider_gets_its_own_default_model() {
        let mut cfg = Config::default();
        assert_eq!(cfg.choices().model, "gemini-3-flash-preview");

        cfg.apply_args(&Args { provider: Some(ProviderKind::OpenAI), ..Args::default() });
        assert_eq!(cfg.choices().model, ProviderKind::OpenAI.default_model());
        assert_ne!(cfg.choices().model, "gemini-3-flash-preview");

        cfg.apply_args(&Args { provider: Some(ProviderKind::Ollama), ..Args::default() });
        assert_eq!(cfg.model(), ProviderKind::Ollama.default_model());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/lesson_wizard.toml"))).is_err());
    }
}
