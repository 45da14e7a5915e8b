use minijinja::{context, Environment, UndefinedBehavior, Value as TplValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::WizardError;
use crate::wire::{ResponseSchema, Stage};

const SYSTEM_INSTRUCTION: &str = r#"Ets un expert en pedagogia i disseny curricular (LOMLOE Catalunya) per a l'ESO, al servei de l'Escola Nou Patufet.

Normes de redacció:
- No facis servir markdown brut (** o ###) en els textos explicatius.
- Escriu fórmules amb caràcters Unicode (x², H₂O, √2, ≠).

Tota fitxa millorada té: títol, context, objectius d'aprenentatge (llista), desenvolupament en fases (nom i descripció) i 3-4 productes finals que l'alumne pot triar.

Context de l'escola:
- Eixos: Territori, Feminisme, Món sostenible, Llengua catalana, Amor/Benestar, Transformació.
- Competències ABP: Pensament sistèmic, Anticipació, Normativa, Estratègica, Col·laboració, Pensament crític, Autoconeixement, Resolució de problemes.

Respon sempre en català."#;

const IMPROVE_TEMPLATE: &str = r#"Analitza i millora aquesta activitat per a la fase: {{ phase }}.
Contingut de la proposta:
{{ proposal }}

Respon només amb un objecte JSON:
{"improvementSuggestion": "text", "improved": {"titol": "text", "context": "text", "objectius": ["text"], "desenvolupament": [{"nom": "text", "descripcio": "text"}], "outputs": ["text"]}}"#;

const PRODUCTS_TEMPLATE: &str = r#"Proposa tres productes finals per a aquesta activitat (fase: {{ phase }}, agrupament: {{ grouping }}).
Han d'encaixar amb l'instrument d'avaluació "{{ instrument }}".
Activitat:
{{ improved }}

Respon només amb un objecte JSON:
{"proposals": [{"id": "text", "titol": "text", "descripcio": "text", "format": "text"}]}"#;

const GUIDE_TEMPLATE: &str = r#"Redacta la guia de treball de l'alumne per a aquesta activitat.
Producte final: {{ product_title }} ({{ product_format }}): {{ product_description }}
Agrupament: {{ grouping }}{% if group_size %}, equips de {{ group_size }} membres{% endif %}.
Instrument d'avaluació: {{ instrument }}.
{% if comments %}Observacions del docent: {{ comments }}
{% endif %}Activitat:
{{ improved }}"#;

const EVALUATION_TEMPLATE: &str = r#"Crea l'instrument d'avaluació "{{ instrument }}" complet per a aquesta guia de l'alumne:
{{ guide }}"#;

const SUMMARY_TEMPLATE: &str = r#"Genera el resum curricular LOMLOE / Nou Patufet per a aquesta guia:
{{ guide }}

Respon només amb un objecte JSON:
{"competencies": [{"code": "text", "definition": "text"}], "sabers": ["text"], "eixosEscola": {"all": ["text"], "highlighted": ["text"]}, "ods": {"all": ["text"], "highlighted": ["text"]}, "competenciesABP": {"all": ["text"], "highlighted": ["text"]}, "nivellsBloom": ["text"]}"#;

/// Per-step template overrides read from the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOverrides {
    pub system: Option<String>,
    pub improve: Option<String>,
    pub products: Option<String>,
    pub guide: Option<String>,
    pub evaluation: Option<String>,
    pub summary: Option<String>,
}

/// System instruction and one template per generation stage.
#[derive(Debug, Clone)]
pub struct PromptSet {
    system: String,
    improve: String,
    products: String,
    guide: String,
    evaluation: String,
    summary: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: SYSTEM_INSTRUCTION.into(),
            improve: IMPROVE_TEMPLATE.into(),
            products: PRODUCTS_TEMPLATE.into(),
            guide: GUIDE_TEMPLATE.into(),
            evaluation: EVALUATION_TEMPLATE.into(),
            summary: SUMMARY_TEMPLATE.into(),
        }
    }
}

impl PromptSet {
    pub fn with_overrides(overrides: &PromptOverrides) -> Self {
        let base = Self::default();
        let pick = |o: &Option<String>, d: String| o.clone().unwrap_or(d);
        Self {
            system: pick(&overrides.system, base.system),
            improve: pick(&overrides.improve, base.improve),
            products: pick(&overrides.products, base.products),
            guide: pick(&overrides.guide, base.guide),
            evaluation: pick(&overrides.evaluation, base.evaluation),
            summary: pick(&overrides.summary, base.summary),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    fn template(&self, stage: Stage) -> &str {
        match stage {
            Stage::Improve => &self.improve,
            Stage::Products => &self.products,
            Stage::Guide => &self.guide,
            Stage::Evaluation => &self.evaluation,
            Stage::Summary => &self.summary,
        }
    }

    /// Render the template for `stage`. Unknown variables are errors.
    pub fn render(&self, stage: Stage, ctx: TplValue) -> Result<String, WizardError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.render_str(self.template(stage), ctx).map_err(|e| {
            WizardError::Config(format!("{} prompt template: {e}", stage.as_str()))
        })
    }

    /// Dry-render every template with placeholder values.
    pub fn validate(&self) -> Result<(), WizardError> {
        self.render(Stage::Improve, context! { proposal => "p", phase => "f" })?;
        self.render(
            Stage::Products,
            context! { improved => "{}", instrument => "i", grouping => "g", phase => "f" },
        )?;
        self.render(
            Stage::Guide,
            context! {
                improved => "{}", product_title => "t", product_description => "d",
                product_format => "f", grouping => "g", group_size => 4,
                comments => "c", instrument => "i",
            },
        )?;
        self.render(Stage::Evaluation, context! { guide => "g", instrument => "i" })?;
        self.render(Stage::Summary, context! { guide => "g" })?;
        Ok(())
    }
}

fn string_array() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

fn tag_set() -> Value {
    json!({
        "type": "object",
        "properties": { "all": string_array(), "highlighted": string_array() },
        "required": ["all", "highlighted"]
    })
}

pub fn improvement_schema() -> ResponseSchema {
    ResponseSchema {
        name: "improvement".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "improvementSuggestion": { "type": "string" },
                "improved": {
                    "type": "object",
                    "properties": {
                        "titol": { "type": "string" },
                        "context": { "type": "string" },
                        "objectius": string_array(),
                        "desenvolupament": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "nom": { "type": "string" },
                                    "descripcio": { "type": "string" }
                                },
                                "required": ["nom", "descripcio"]
                            }
                        },
                        "outputs": string_array()
                    },
                    "required": ["titol", "context", "objectius", "desenvolupament", "outputs"]
                }
            },
            "required": ["improvementSuggestion", "improved"]
        }),
    }
}

pub fn products_schema() -> ResponseSchema {
    ResponseSchema {
        name: "product_proposals".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "proposals": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "titol": { "type": "string" },
                            "descripcio": { "type": "string" },
                            "format": { "type": "string" }
                        },
                        "required": ["id", "titol", "descripcio", "format"]
                    }
                }
            },
            "required": ["proposals"]
        }),
    }
}

pub fn summary_schema() -> ResponseSchema {
    ResponseSchema {
        name: "curriculum_summary".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "competencies": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "code": { "type": "string" },
                            "definition": { "type": "string" }
                        },
                        "required": ["code", "definition"]
                    }
                },
                "sabers": string_array(),
                "eixosEscola": tag_set(),
                "ods": tag_set(),
                "competenciesABP": tag_set(),
                "nivellsBloom": string_array()
            },
            "required": ["competencies", "sabers", "eixosEscola", "ods", "competenciesABP"]
        }),
    }
}
