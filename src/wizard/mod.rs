//! Wizard state: the session value, the flow definition, and the pure
//! reducer that moves a session from one state to the next.
//!
//! The async [`Wizard`] controller lives in `controller.rs`; it is the only
//! thing that issues generation calls and it feeds their outcomes back in
//! here as [`Event`]s.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::catalog::{self, Grouping, LearningPhase};
use crate::wire::{CurriculumSummary, Improvement, ImprovedContent, ProductProposal};

mod controller;
pub use controller::{Outcome, Wizard};


#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Step {
    Intake,
    Reviewing,
    SelectingProduct,
    ShowingGuide,
    ShowingSummary,
}

impl Step {
    pub fn label(self) -> &'static str {
        match self {
            Step::Intake => "Proposta",
            Step::Reviewing => "Millora i configuració",
            Step::SelectingProduct => "Triar producte",
            Step::ShowingGuide => "Fitxa de l'alumne",
            Step::ShowingSummary => "Resum final",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowVariant {
    /// Five steps, with a product-selection screen.
    #[default]
    Full,
    /// Four steps; the output descriptor is chosen during configuration.
    Short,
}

/// Ordered list of steps a session walks through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    variant: FlowVariant,
    steps: Vec<Step>,
}

impl Flow {
    pub fn new(variant: FlowVariant) -> Self {
        let steps = match variant {
            FlowVariant::Full => vec![
                Step::Intake,
                Step::Reviewing,
                Step::SelectingProduct,
                Step::ShowingGuide,
                Step::ShowingSummary,
            ],
            FlowVariant::Short => vec![
                Step::Intake,
                Step::Reviewing,
                Step::ShowingGuide,
                Step::ShowingSummary,
            ],
        };
        Self { variant, steps }
    }

    pub fn variant(&self) -> FlowVariant {
        self.variant
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn includes(&self, step: Step) -> bool {
        self.steps.contains(&step)
    }

    /// 1-based position for progress display.
    pub fn number(&self, step: Step) -> Option<usize> {
        self.steps.iter().position(|s| *s == step).map(|i| i + 1)
    }

    pub fn next(&self, step: Step) -> Option<Step> {
        let i = self.steps.iter().position(|s| *s == step)?;
        self.steps.get(i + 1).copied()
    }
}

/// Configuration collected across the first screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choices {
    pub phase: LearningPhase,
    pub grouping: Grouping,
    pub group_size: u8,
    pub comments: String,
    pub model: String,
    pub temperature: f32,
    pub instrument: Option<String>,
    pub output: Option<String>,
}

impl Default for Choices {
    fn default() -> Self {
        Self {
            phase: LearningPhase::default(),
            grouping: Grouping::default(),
            group_size: catalog::DEFAULT_GROUP_SIZE,
            comments: String::new(),
            model: catalog::GEMINI_MODELS[0].id.into(),
            temperature: catalog::DEFAULT_TEMPERATURE,
            instrument: None,
            output: None,
        }
    }
}

/// Results accumulated in wizard order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub improved: Option<ImprovedContent>,
    pub rationale: Option<String>,
    pub proposals: Option<Vec<ProductProposal>>,
    pub product: Option<ProductProposal>,
    pub guide: Option<String>,
    pub evaluation: Option<String>,
    pub summary: Option<CurriculumSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub step: Step,
    pub proposal: String,
    pub choices: Choices,
    pub results: Results,
    pub busy: bool,
    /// Last user-facing error, cleared when the next request starts.
    pub error: Option<String>,
}

impl Session {
    pub fn new(defaults: Choices) -> Self {
        Self {
            step: Step::Intake,
            proposal: String::new(),
            choices: defaults,
            results: Results::default(),
            busy: false,
            error: None,
        }
    }
}

/// Output of the guide → evaluation → summary chain, applied all at once.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub product: ProductProposal,
    pub guide: String,
    pub evaluation: String,
    pub summary: CurriculumSummary,
}

/// Field edits; allowed at any time, including while a call is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Proposal(String),
    Phase(LearningPhase),
    Grouping(Grouping),
    GroupSize(u8),
    Comments(String),
    Model(String),
    Temperature(f32),
    Instrument(Option<String>),
    Output(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Edit(Edit),
    RequestStarted,
    ProposalImproved(Improvement),
    ProductsProposed(Vec<ProductProposal>),
    PacketGenerated(Box<Packet>),
    SummaryOpened,
    Failed(String),
    /// Clears `busy` without touching anything else.
    Abandoned,
    Rejected(String),
    Reset(Choices),
}

fn apply_edit(choices: &mut Choices, proposal: &mut String, edit: Edit) {
    match edit {
        Edit::Proposal(text) => *proposal = text,
        Edit::Phase(p) => choices.phase = p,
        Edit::Grouping(g) => choices.grouping = g,
        Edit::GroupSize(n) => {
            choices.group_size = n.clamp(catalog::MIN_GROUP_SIZE, catalog::MAX_GROUP_SIZE)
        }
        Edit::Comments(c) => choices.comments = c,
        Edit::Model(m) => choices.model = m,
        Edit::Temperature(t) => {
            choices.temperature = if t.is_finite() { t.clamp(0.0, 1.0) } else { catalog::DEFAULT_TEMPERATURE }
        }
        Edit::Instrument(i) => choices.instrument = i.filter(|s| !s.trim().is_empty()),
        Edit::Output(o) => choices.output = o.filter(|s| !s.trim().is_empty()),
    }
}

/// Advance to the step after `from`, but only if the session is on `from`.
fn advance(flow: &Flow, s: &mut Session, from: &[Step]) -> bool {
    if !from.contains(&s.step) {
        tracing::warn!(step = ?s.step, "result arrived for a step the session is no longer on");
        return false;
    }
    match flow.next(s.step) {
        Some(next) => {
            tracing::info!(from = ?s.step, to = ?next, "wizard step");
            s.step = next;
            true
        }
        None => false,
    }
}

/// Pure transition function.
pub fn reduce(flow: &Flow, mut s: Session, event: Event) -> Session {
    match event {
        Event::Edit(edit) => apply_edit(&mut s.choices, &mut s.proposal, edit),
        Event::RequestStarted => {
            s.busy = true;
            s.error = None;
        }
        Event::ProposalImproved(imp) => {
            s.busy = false;
            if advance(flow, &mut s, &[Step::Intake]) {
                s.results = Results {
                    improved: Some(imp.improved),
                    rationale: Some(imp.rationale),
                    ..Results::default()
                };
            }
        }
        Event::ProductsProposed(proposals) => {
            s.busy = false;
            if s.results.improved.is_some() && advance(flow, &mut s, &[Step::Reviewing]) {
                s.results.proposals = Some(proposals);
            }
        }
        Event::PacketGenerated(packet) => {
            s.busy = false;
            let from = [Step::Reviewing, Step::SelectingProduct];
            let ready = s.results.improved.is_some()
                && flow.next(s.step) == Some(Step::ShowingGuide);
            if ready && advance(flow, &mut s, &from) {
                let Packet { product, guide, evaluation, summary } = *packet;
                s.results.product = Some(product);
                s.results.guide = Some(guide);
                s.results.evaluation = Some(evaluation);
                s.results.summary = Some(summary);
            }
        }
        Event::SummaryOpened => {
            if s.results.summary.is_some() {
                advance(flow, &mut s, &[Step::ShowingGuide]);
            }
        }
        Event::Failed(message) => {
            s.busy = false;
            s.error = Some(message);
        }
        Event::Abandoned => s.busy = false,
        Event::Rejected(message) => s.error = Some(message),
        Event::Reset(defaults) => s = Session::new(defaults),
    }
    s
}
