use thiserror::Error;

use crate::wizard::Step;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WizardError {
    #[error("validation error: {0}")] Validation(String),
    #[error("service call failed: {0}")] ServiceCall(String),
    #[error("malformed response: {reason}")] MalformedResponse { reason: String, raw: String },
    #[error("configuration error: {0}")] Config(String),
    #[error("intake failed: {0}")] Intake(String),
}

impl WizardError {
    /// Text shown to the user for a failure that happened on `step`.
    pub fn user_message(&self, step: Step) -> String {
        match self {
            WizardError::Validation(msg) => msg.clone(),
            WizardError::MalformedResponse { .. } => {
                "La IA ha retornat dades en un format que no podem llegir. Reintenta-ho.".into()
            }
            WizardError::ServiceCall(_) => match step {
                Step::Intake => "Error en l'anàlisi inicial.".into(),
                Step::Reviewing => "Error generant propostes de lliurament.".into(),
                Step::SelectingProduct => "Error generant la fitxa operativa final.".into(),
                Step::ShowingGuide | Step::ShowingSummary => {
                    "Error de comunicació amb el servei. Torna-ho a provar.".into()
                }
            },
            WizardError::Config(msg) | WizardError::Intake(msg) => msg.clone(),
        }
    }

    /// Raw model text kept for diagnostics, when there is one.
    pub fn raw_reply(&self) -> Option<&str> {
        match self {
            WizardError::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
