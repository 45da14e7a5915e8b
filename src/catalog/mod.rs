//! Fixed menus offered by the wizard: learning phases, grouping modes,
//! evaluation instruments, output formats and the model menu.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Phase of the learning situation the activity belongs to.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningPhase {
    #[default]
    #[value(alias = "inicial")]
    Initial,
    #[value(alias = "desenvolupament")]
    Development,
    #[value(alias = "sintesi")]
    Synthesis,
    #[value(alias = "aplicacio")]
    Application,
}

impl LearningPhase {
    pub const ALL: [LearningPhase; 4] = [
        LearningPhase::Initial,
        LearningPhase::Development,
        LearningPhase::Synthesis,
        LearningPhase::Application,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LearningPhase::Initial => "Inicials (Què en sé?)",
            LearningPhase::Development => "Desenvolupament (Què estic aprenent?)",
            LearningPhase::Synthesis => "Síntesi (Què he après?)",
            LearningPhase::Application => "Aplicació (Com ho transfereixo?)",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    #[default]
    Individual,
    #[value(alias = "grup")]
    Group,
}

impl Grouping {
    pub fn label(self) -> &'static str {
        match self {
            Grouping::Individual => "Individual",
            Grouping::Group => "Treball en Grup",
        }
    }
}

pub const MIN_GROUP_SIZE: u8 = 2;
pub const MAX_GROUP_SIZE: u8 = 10;
pub const DEFAULT_GROUP_SIZE: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instrument {
    pub name: &'static str,
    pub description: &'static str,
}

pub const EVALUATION_INSTRUMENTS: &[Instrument] = &[
    Instrument { name: "Bases d’orientació", description: "Guies estructurades amb els passos o aspectes clau per fer una tasca." },
    Instrument { name: "Coavaluació", description: "Els estudiants avaluen el treball dels companys." },
    Instrument { name: "KPSI", description: "Qüestionari inicial per detectar coneixements previs." },
    Instrument { name: "Rúbriques", description: "Taules amb nivells de qualitat en l’assoliment de competències." },
    Instrument { name: "Autoavaluació", description: "L’alumnat reflexiona sobre el seu propi procés." },
    Instrument { name: "Contracte d’avaluació", description: "Acord entre docent i alumne sobre objectius i compromisos." },
    Instrument { name: "Diari d’equip", description: "Registre col·laboratiu del progrés d’un grup." },
    Instrument { name: "Mapa conceptual", description: "Representació gràfica de la relació entre conceptes." },
    Instrument { name: "Diana d’avaluació", description: "Gràfic circular amb el grau d’assoliment." },
    Instrument { name: "Organitzadors gràfics", description: "Estructures visuals per organitzar la informació." },
    Instrument { name: "Tickets d’entrada, mig i sortida", description: "Preguntes breus per recollir informació ràpida." },
    Instrument { name: "Escala de metacognició", description: "Valora la capacitat de planificar i avaluar el propi aprenentatge." },
    Instrument { name: "Observació d’aula", description: "Recollida sistemàtica de comportaments i interaccions." },
    Instrument { name: "Feedback entre iguals", description: "Retroalimentació constructiva entre companys." },
    Instrument { name: "Diaris d’aprenentatge", description: "Registre personal de reflexió sobre el procés." },
    Instrument { name: "Portafolis digitals", description: "Recull organitzat d’evidències del treball de l’alumnat." },
];

/// Case-insensitive lookup in the instrument catalog.
pub fn find_instrument(name: &str) -> Option<&'static Instrument> {
    let wanted = name.trim().to_lowercase();
    EVALUATION_INSTRUMENTS
        .iter()
        .find(|i| i.name.to_lowercase() == wanted)
}

/// Output formats offered when the short flow asks for a product directly.
pub const OUTPUT_FORMATS: &[&str] = &[
    "Mapa conceptual",
    "Resum executiu",
    "Guia de preguntes",
    "Infografia de text",
    "Estudi de cas",
    "Exercicis pràctics",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOption {
    pub id: &'static str,
    pub label: &'static str,
}

pub const GEMINI_MODELS: &[ModelOption] = &[
    ModelOption { id: "gemini-3-flash-preview", label: "Flash" },
    ModelOption { id: "gemini-3-pro-preview", label: "Pro" },
];

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_lookup_ignores_case_and_padding() {
        let found = find_instrument("  rúbriques ").map(|i| i.name);
        assert_eq!(found, Some("Rúbriques"));
        assert!(find_instrument("Examen tipus test").is_none());
    }

    #[test]
    fn phases_keep_catalog_order() {
        let labels: Vec<_> = LearningPhase::ALL.iter().map(|p| p.label()).collect();
        assert!(labels[0].starts_with("Inicials"));
        assert!(labels[3].starts_with("Aplicació"));
    }
}
