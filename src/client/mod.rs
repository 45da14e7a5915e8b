//! Generation Client: turns session data into one request per wizard step
//! and decodes the reply.

use minijinja::{context, Value as TplValue};

use crate::catalog::{Grouping, LearningPhase};
use crate::errors::WizardError;
use crate::parse;
use crate::prompt::{self, PromptSet};
use crate::provider::DynProvider;
use crate::wire::{
    CurriculumSummary, GenerationReply, GenerationRequest, ImprovedContent, Improvement,
    ProductProposal, ProductProposals, ResponseSchema, Stage,
};

pub const GUIDE_PLACEHOLDER: &str = "No s'ha pogut generar la fitxa de l'alumne.";
pub const EVALUATION_PLACEHOLDER: &str = "No s'ha pogut generar l'instrument.";

#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    pub model: String,
    pub temperature: Option<f32>,
}

/// Everything the student-guide prompt needs.
#[derive(Debug, Clone, Copy)]
pub struct GuideInput<'a> {
    pub improved: &'a ImprovedContent,
    pub product: &'a ProductProposal,
    pub grouping: Grouping,
    pub group_size: u8,
    pub comments: &'a str,
    pub instrument: &'a str,
}

pub struct GenerationClient {
    provider: DynProvider,
    prompts: PromptSet,
}

fn lesson_json(improved: &ImprovedContent) -> Result<String, WizardError> {
    serde_json::to_string_pretty(improved)
        .map_err(|e| WizardError::Config(format!("cannot serialize lesson: {e}")))
}

impl GenerationClient {
    pub fn new(provider: DynProvider, prompts: PromptSet) -> Self {
        Self { provider, prompts }
    }

    async fn call(
        &self,
        stage: Stage,
        prompt: String,
        opts: &ModelOptions,
        schema: Option<ResponseSchema>,
    ) -> Result<GenerationReply, WizardError> {
        let req = GenerationRequest {
            stage,
            model: opts.model.clone(),
            system: self.prompts.system().to_string(),
            prompt,
            temperature: opts.temperature,
            schema,
        };
        tracing::info!(stage = stage.as_str(), model = %req.model, "calling generation service");
        self.provider.send(&req).await.map_err(|e| {
            tracing::warn!(stage = stage.as_str(), error = %e, "generation call failed");
            WizardError::ServiceCall(format!("{e:#}"))
        })
    }

    pub async fn improve_proposal(
        &self,
        proposal: &str,
        phase: LearningPhase,
        opts: &ModelOptions,
    ) -> Result<Improvement, WizardError> {
        let prompt = self.prompts.render(
            Stage::Improve,
            context! { proposal => proposal, phase => phase.label() },
        )?;
        let reply = self
            .call(Stage::Improve, prompt, opts, Some(prompt::improvement_schema()))
            .await?;
        parse::parse_improvement(&reply)
    }

    pub async fn propose_products(
        &self,
        improved: &ImprovedContent,
        instrument: &str,
        grouping: Grouping,
        phase: LearningPhase,
        opts: &ModelOptions,
    ) -> Result<Vec<ProductProposal>, WizardError> {
        let prompt = self.prompts.render(
            Stage::Products,
            context! {
                improved => lesson_json(improved)?,
                instrument => instrument,
                grouping => grouping.label(),
                phase => phase.label(),
            },
        )?;
        let reply = self
            .call(Stage::Products, prompt, opts, Some(prompt::products_schema()))
            .await?;
        let parsed: ProductProposals = parse::parse_structured_reply(&reply)?;
        if parsed.proposals.is_empty() {
            return Err(WizardError::MalformedResponse {
                reason: "reply lists no product proposals".into(),
                raw: reply.text.unwrap_or_default(),
            });
        }
        Ok(parsed.proposals)
    }

    pub async fn student_guide(
        &self,
        input: &GuideInput<'_>,
        opts: &ModelOptions,
    ) -> Result<String, WizardError> {
        let group_size = match input.grouping {
            Grouping::Group => TplValue::from(input.group_size),
            Grouping::Individual => TplValue::from(()),
        };
        let prompt = self.prompts.render(
            Stage::Guide,
            context! {
                improved => lesson_json(input.improved)?,
                product_title => &input.product.title,
                product_description => &input.product.description,
                product_format => &input.product.format,
                grouping => input.grouping.label(),
                group_size => group_size,
                comments => input.comments.trim(),
                instrument => input.instrument,
            },
        )?;
        let reply = self.call(Stage::Guide, prompt, opts, None).await?;
        Ok(parse::free_text(&reply, GUIDE_PLACEHOLDER))
    }

    pub async fn evaluation_instrument(
        &self,
        guide: &str,
        instrument: &str,
        opts: &ModelOptions,
    ) -> Result<String, WizardError> {
        let prompt = self.prompts.render(
            Stage::Evaluation,
            context! { guide => guide, instrument => instrument },
        )?;
        let reply = self.call(Stage::Evaluation, prompt, opts, None).await?;
        Ok(parse::free_text(&reply, EVALUATION_PLACEHOLDER))
    }

    pub async fn curriculum_summary(
        &self,
        guide: &str,
        opts: &ModelOptions,
    ) -> Result<CurriculumSummary, WizardError> {
        let prompt = self.prompts.render(Stage::Summary, context! { guide => guide })?;
        let reply = self
            .call(Stage::Summary, prompt, opts, Some(prompt::summary_schema()))
            .await?;
        parse::parse_structured_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::Scripted;
    use crate::wire::ActivityPhase;

    fn opts() -> ModelOptions {
        ModelOptions { model: "gemini-3-flash-preview".into(), temperature: Some(0.7) }
    }

    fn lesson() -> ImprovedContent {
        ImprovedContent {
            title: "Caiguda lliure".into(),
            context: String::new(),
            objectives: vec!["Mesurar g".into()],
            phases: vec![ActivityPhase { name: "Inici".into(), description: "Pregunta".into() }],
            outputs: vec!["Informe".into()],
        }
    }

    #[tokio::test]
    async fn improvement_request_carries_phase_schema_and_temperature() {
        let script = Scripted::new(vec![Ok(r#"{"improvementSuggestion":"ok","improved":{"titol":"T","objectius":[],"desenvolupament":[]}}"#.into())]);
        let client = GenerationClient::new(script.boxed(), PromptSet::default());

        let imp = client
            .improve_proposal("Lliçó sobre caiguda lliure", LearningPhase::Initial, &opts())
            .await
            .unwrap();
        assert_eq!(imp.improved.title, "T");

        let sent = script.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].stage, Stage::Improve);
        assert!(sent[0].prompt.contains("Inicials (Què en sé?)"));
        assert!(sent[0].prompt.contains("Lliçó sobre caiguda lliure"));
        assert_eq!(sent[0].temperature, Some(0.7));
        assert_eq!(sent[0].schema.as_ref().map(|s| s.name.as_str()), Some("improvement"));
    }

    #[tokio::test]
    async fn service_failure_becomes_service_call_error() {
        let script = Scripted::new(vec![Err("quota exceeded".into())]);
        let client = GenerationClient::new(script.boxed(), PromptSet::default());
        let err = client.evaluation_instrument("guia", "KPSI", &opts()).await.unwrap_err();
        assert!(matches!(err, WizardError::ServiceCall(m) if m.contains("quota")));
    }

    #[tokio::test]
    async fn empty_free_text_becomes_placeholder() {
        let script = Scripted::new(vec![Ok(String::new())]);
        let client = GenerationClient::new(script.boxed(), PromptSet::default());
        let product = ProductProposal::from_descriptor("Informe");
        let input = GuideInput {
            improved: &lesson(),
            product: &product,
            grouping: Grouping::Group,
            group_size: 3,
            comments: "",
            instrument: "Rúbriques",
        };
        let guide = client.student_guide(&input, &opts()).await.unwrap();
        assert_eq!(guide, GUIDE_PLACEHOLDER);
        assert!(script.requests()[0].prompt.contains("equips de 3 membres"));
        assert!(script.requests()[0].schema.is_none());
    }

    #[tokio::test]
    async fn empty_proposal_list_is_malformed() {
        let script = Scripted::new(vec![Ok(r#"{"proposals":[]}"#.into())]);
        let client = GenerationClient::new(script.boxed(), PromptSet::default());
        let err = client
            .propose_products(&lesson(), "Rúbriques", Grouping::Individual, LearningPhase::Initial, &opts())
            .await
            .unwrap_err();
        assert!(matches!(err, WizardError::MalformedResponse { .. }));
    }
}
