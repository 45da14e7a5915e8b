use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// ========================================
/// Lesson data exchanged with the model
/// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPhase {
    #[serde(rename = "nom")]
    pub name: String,
    #[serde(rename = "descripcio")]
    pub description: String,
}

/// The model's restructuring of the submitted proposal.
/// `context` and `outputs` may be absent from a reply; the rest is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovedContent {
    #[serde(rename = "titol")]
    pub title: String,
    #[serde(default)]
    pub context: String,
    #[serde(rename = "objectius")]
    pub objectives: Vec<String>,
    #[serde(rename = "desenvolupament")]
    pub phases: Vec<ActivityPhase>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    #[serde(rename = "improvementSuggestion")]
    pub rationale: String,
    pub improved: ImprovedContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProposal {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "titol")]
    pub title: String,
    #[serde(rename = "descripcio")]
    pub description: String,
    #[serde(default)]
    pub format: String,
}

impl ProductProposal {
    /// Product built from a bare output descriptor (short flow).
    pub fn from_descriptor(descriptor: &str) -> Self {
        Self {
            id: "output".into(),
            title: descriptor.to_string(),
            description: descriptor.to_string(),
            format: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductProposals {
    pub proposals: Vec<ProductProposal>,
}

fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// ========================================
/// Curriculum summary
/// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CompetencyRepr")]
pub struct Competency {
    pub code: String,
    pub definition: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CompetencyRepr {
    Full { code: String, definition: String },
    Plain(String),
}

impl From<CompetencyRepr> for Competency {
    fn from(r: CompetencyRepr) -> Self {
        match r {
            CompetencyRepr::Full { code, definition } => Competency { code, definition },
            CompetencyRepr::Plain(text) => Competency { code: String::new(), definition: text },
        }
    }
}

/// Full tag list plus the subset that applies to this activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "TagSetRepr")]
pub struct TagSet {
    pub all: Vec<String>,
    pub highlighted: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagSetRepr {
    Split {
        all: Vec<String>,
        #[serde(default)]
        highlighted: Vec<String>,
    },
    // A bare list means every tag listed applies.
    Flat(Vec<String>),
}

impl From<TagSetRepr> for TagSet {
    fn from(r: TagSetRepr) -> Self {
        match r {
            TagSetRepr::Split { all, highlighted } => TagSet { all, highlighted },
            TagSetRepr::Flat(tags) => TagSet { highlighted: tags.clone(), all: tags },
        }
    }
}

impl TagSet {
    pub fn is_highlighted(&self, tag: &str) -> bool {
        self.highlighted.iter().any(|h| h == tag)
    }

    /// Looser match used for sustainability goals, whose labels the model
    /// tends to abbreviate ("ODS 4" vs "ODS 4: Educació de qualitat").
    pub fn is_loosely_highlighted(&self, tag: &str) -> bool {
        self.highlighted
            .iter()
            .any(|h| tag.contains(h.as_str()) || h.contains(tag))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumSummary {
    pub competencies: Vec<Competency>,
    pub sabers: Vec<String>,
    #[serde(rename = "eixosEscola")]
    pub school_axes: TagSet,
    pub ods: TagSet,
    #[serde(rename = "competenciesABP")]
    pub pbl_competencies: TagSet,
    #[serde(rename = "nivellsBloom", default)]
    pub bloom_levels: Vec<String>,
}

/// ========================================
/// Generation service boundary
/// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Improve,
    Products,
    Guide,
    Evaluation,
    Summary,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Improve => "improve",
            Stage::Products => "products",
            Stage::Guide => "guide",
            Stage::Evaluation => "evaluation",
            Stage::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    /// Standard (lower-case) JSON Schema; adapters translate as needed.
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub stage: Stage,
    pub model: String,
    pub system: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<ResponseSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReply {
    pub text: Option<String>,
    /// True when a schema was requested and the service applied it.
    pub structured: bool,
}
