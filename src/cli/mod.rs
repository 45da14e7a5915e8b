use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::{self, Grouping, LearningPhase};
use crate::wizard::FlowVariant;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    #[value(alias = "google")]
    Gemini,
    #[value(name = "openai", alias = "open-ai")]
    OpenAI,
    Ollama,
}

impl ProviderKind {
    /// Model used when neither the config file nor `--model` names one.
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Gemini => catalog::GEMINI_MODELS[0].id,
            ProviderKind::OpenAI => "gpt-4.1-mini",
            ProviderKind::Ollama => "llama3.1",
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "lesson_wizard", version, about = "Turns a lesson proposal into a curriculum-aligned student packet")]
pub struct Args {
    /// Proposal text file (.txt / .md)
    #[arg(long)]
    pub proposal_file: Option<PathBuf>,

    /// Proposal text given inline
    #[arg(long, conflicts_with = "proposal_file")]
    pub proposal: Option<String>,

    #[arg(long, value_enum)]
    pub phase: Option<LearningPhase>,

    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    #[arg(long)]
    pub model: Option<String>,

    /// Creativity, 0.0 (sober) to 1.0 (creative)
    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long, value_enum)]
    pub flow: Option<FlowVariant>,

    #[arg(long, value_enum)]
    pub grouping: Option<Grouping>,

    #[arg(long)]
    pub group_size: Option<u8>,

    #[arg(long)]
    pub comments: Option<String>,

    /// Evaluation instrument name from the catalog
    #[arg(long)]
    pub instrument: Option<String>,

    /// Product id (full flow) or output descriptor (short flow)
    #[arg(long)]
    pub product: Option<String>,

    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[arg(long, default_value_t = false)]
    pub save_request: bool,

    #[arg(long, default_value_t = false)]
    pub save_response: bool,

    /// Write the finished packet here
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Never prompt; fail when a choice is missing
    #[arg(long, default_value_t = false)]
    pub non_interactive: bool,

    #[arg(long, default_value_t = false)]
    pub debug: bool,

    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_non_interactive_run() {
        let args = Args::try_parse_from([
            "lesson_wizard",
            "--proposal", "Lesson on free fall",
            "--phase", "inicial",
            "--provider", "openai",
            "--grouping", "group",
            "--group-size", "3",
            "--instrument", "Rúbriques",
            "--flow", "short",
            "--non-interactive",
        ])
        .unwrap();
        assert_eq!(args.phase, Some(LearningPhase::Initial));
        assert_eq!(args.provider, Some(ProviderKind::OpenAI));
        assert_eq!(args.grouping, Some(Grouping::Group));
        assert_eq!(args.flow, Some(FlowVariant::Short));
        assert!(args.non_interactive);
    }

    #[test]
    fn inline_proposal_and_file_conflict() {
        let res = Args::try_parse_from([
            "lesson_wizard", "--proposal", "x", "--proposal-file", "a.md",
        ]);
        assert!(res.is_err());
    }
}
