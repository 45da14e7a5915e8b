use parking_lot::Mutex;

use super::{reduce, Choices, Edit, Event, Flow, Packet, Session, Step};
use crate::catalog::Grouping;
use crate::client::{GenerationClient, GuideInput, ModelOptions};
use crate::errors::WizardError;
use crate::wire::{ImprovedContent, ProductProposal};

const MSG_EMPTY_PROPOSAL: &str = "Cal introduir algun contingut bàsic de la proposta.";
const MSG_NO_INSTRUMENT: &str = "Cal triar un instrument d'avaluació.";
const MSG_NO_OUTPUT: &str = "Cal triar un producte final.";
const MSG_NO_IMPROVEMENT: &str = "Primer cal generar la millora de la proposta.";
const MSG_UNKNOWN_PRODUCT: &str = "Aquest producte no és cap de les propostes.";
const MSG_NO_SUMMARY: &str = "Encara no hi ha resum curricular.";
const MSG_WRONG_STEP: &str = "Aquesta acció no està disponible en aquest pas.";

/// What a controller action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Advanced(Step),
    /// Another generation call is still in flight; nothing happened.
    Busy,
}

/// Owns the session and is the only caller of the generation client.
///
/// The session lock is never held across an await. At most one generation
/// call is in flight: actions that find `busy` set return [`Outcome::Busy`].
pub struct Wizard {
    client: GenerationClient,
    flow: Flow,
    defaults: Choices,
    session: Mutex<Session>,
}

/// Keeps `busy` raised while a call runs; lowers it on drop if the action
/// never reported an outcome (e.g. the future was dropped).
struct BusyGuard<'a> {
    wizard: &'a Wizard,
    done: bool,
}

impl BusyGuard<'_> {
    fn finish(mut self, event: Event) -> Session {
        self.done = true;
        self.wizard.dispatch(event)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!("generation abandoned; clearing busy flag");
            self.wizard.dispatch(Event::Abandoned);
        }
    }
}

struct PacketInputs {
    improved: ImprovedContent,
    product: ProductProposal,
    grouping: Grouping,
    group_size: u8,
    comments: String,
    instrument: String,
    opts: ModelOptions,
}

fn rejected(message: &str) -> WizardError {
    WizardError::Validation(message.to_string())
}

fn model_options(s: &Session) -> ModelOptions {
    ModelOptions { model: s.choices.model.clone(), temperature: Some(s.choices.temperature) }
}

fn expect_step(s: &Session, step: Step) -> Result<(), WizardError> {
    if s.step == step {
        Ok(())
    } else {
        Err(rejected(MSG_WRONG_STEP))
    }
}

impl Wizard {
    pub fn new(client: GenerationClient, flow: Flow, defaults: Choices) -> Self {
        let session = Mutex::new(Session::new(defaults.clone()));
        Self { client, flow, defaults, session }
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    pub fn edit(&self, edit: Edit) {
        self.dispatch(Event::Edit(edit));
    }

    fn dispatch(&self, event: Event) -> Session {
        let mut guard = self.session.lock();
        let next = reduce(&self.flow, guard.clone(), event);
        *guard = next.clone();
        next
    }

    /// Atomically: bail out if busy, run `check` against the session, and
    /// raise `busy` with the inputs it extracted.
    fn begin<T>(
        &self,
        check: impl FnOnce(&Session) -> Result<T, WizardError>,
    ) -> Result<Option<(BusyGuard<'_>, T)>, WizardError> {
        let mut s = self.session.lock();
        if s.busy {
            tracing::debug!(step = ?s.step, "action ignored while a call is in flight");
            return Ok(None);
        }
        match check(&*s) {
            Ok(inputs) => {
                *s = reduce(&self.flow, s.clone(), Event::RequestStarted);
                Ok(Some((BusyGuard { wizard: self, done: false }, inputs)))
            }
            Err(e) => {
                let message = e.user_message(s.step);
                *s = reduce(&self.flow, s.clone(), Event::Rejected(message));
                Err(e)
            }
        }
    }

    fn fail(&self, guard: BusyGuard<'_>, err: WizardError, context: Step) -> WizardError {
        tracing::warn!(error = %err, raw = err.raw_reply().unwrap_or_default(), "step failed");
        guard.finish(Event::Failed(err.user_message(context)));
        err
    }

    /// Intake → Reviewing.
    pub async fn submit_proposal(&self, text: &str) -> Result<Outcome, WizardError> {
        let Some((guard, (phase, opts))) = self.begin(|s| {
            expect_step(s, Step::Intake)?;
            if text.trim().is_empty() {
                return Err(rejected(MSG_EMPTY_PROPOSAL));
            }
            Ok((s.choices.phase, model_options(s)))
        })?
        else {
            return Ok(Outcome::Busy);
        };
        self.edit(Edit::Proposal(text.to_string()));

        match self.client.improve_proposal(text, phase, &opts).await {
            Ok(imp) => {
                let s = guard.finish(Event::ProposalImproved(imp));
                Ok(Outcome::Advanced(s.step))
            }
            Err(e) => Err(self.fail(guard, e, Step::Intake)),
        }
    }

    /// Reviewing → SelectingProduct (full flow) or → ShowingGuide (short flow).
    pub async fn configure_and_proceed(
        &self,
        grouping: Grouping,
        group_size: u8,
        comments: &str,
        instrument: Option<&str>,
    ) -> Result<Outcome, WizardError> {
        let edits = [
            Edit::Grouping(grouping),
            Edit::GroupSize(group_size),
            Edit::Comments(comments.to_string()),
            Edit::Instrument(instrument.map(str::to_string)),
        ];
        if self.configure(edits)?.is_none() {
            return Ok(Outcome::Busy);
        }

        if self.flow.includes(Step::SelectingProduct) {
            self.propose_products().await
        } else {
            let begun = self.begin(|s| {
                expect_step(s, Step::Reviewing)?;
                let inputs = packet_inputs(s, None)?;
                Ok(inputs)
            })?;
            let Some((guard, inputs)) = begun else {
                return Ok(Outcome::Busy);
            };
            self.run_packet(guard, inputs).await
        }
    }

    /// Apply the review-screen choices, but only on the Reviewing step and
    /// never while a call is in flight.
    fn configure(&self, edits: [Edit; 4]) -> Result<Option<()>, WizardError> {
        let mut s = self.session.lock();
        if s.busy {
            return Ok(None);
        }
        if let Err(e) = expect_step(&s, Step::Reviewing) {
            *s = reduce(&self.flow, s.clone(), Event::Rejected(e.user_message(s.step)));
            return Err(e);
        }
        for edit in edits {
            *s = reduce(&self.flow, s.clone(), Event::Edit(edit));
        }
        Ok(Some(()))
    }

    async fn propose_products(&self) -> Result<Outcome, WizardError> {
        let Some((guard, (improved, instrument, grouping, phase, opts))) = self.begin(|s| {
            expect_step(s, Step::Reviewing)?;
            let improved = s.results.improved.clone().ok_or_else(|| rejected(MSG_NO_IMPROVEMENT))?;
            let instrument = s.choices.instrument.clone().ok_or_else(|| rejected(MSG_NO_INSTRUMENT))?;
            Ok((improved, instrument, s.choices.grouping, s.choices.phase, model_options(s)))
        })?
        else {
            return Ok(Outcome::Busy);
        };

        match self
            .client
            .propose_products(&improved, &instrument, grouping, phase, &opts)
            .await
        {
            Ok(proposals) => {
                let s = guard.finish(Event::ProductsProposed(proposals));
                Ok(Outcome::Advanced(s.step))
            }
            Err(e) => Err(self.fail(guard, e, Step::Reviewing)),
        }
    }

    /// SelectingProduct → ShowingGuide, generating guide, evaluation and
    /// summary one after the other.
    pub async fn select_product(&self, product: ProductProposal) -> Result<Outcome, WizardError> {
        let Some((guard, inputs)) = self.begin(|s| {
            expect_step(s, Step::SelectingProduct)?;
            packet_inputs(s, Some(product))
        })?
        else {
            return Ok(Outcome::Busy);
        };
        self.run_packet(guard, inputs).await
    }

    /// Pick one of the proposals the model returned.
    pub async fn select_product_by_id(&self, id: &str) -> Result<Outcome, WizardError> {
        let Some((guard, inputs)) = self.begin(|s| {
            expect_step(s, Step::SelectingProduct)?;
            let product = s
                .results
                .proposals
                .as_ref()
                .and_then(|ps| ps.iter().find(|p| p.id == id).cloned())
                .ok_or_else(|| rejected(MSG_UNKNOWN_PRODUCT))?;
            packet_inputs(s, Some(product))
        })?
        else {
            return Ok(Outcome::Busy);
        };
        self.run_packet(guard, inputs).await
    }

    async fn run_packet(&self, guard: BusyGuard<'_>, inputs: PacketInputs) -> Result<Outcome, WizardError> {
        match self.generate_packet(&inputs).await {
            Ok(packet) => {
                let s = guard.finish(Event::PacketGenerated(Box::new(packet)));
                Ok(Outcome::Advanced(s.step))
            }
            Err(e) => Err(self.fail(guard, e, Step::SelectingProduct)),
        }
    }

    // Each call feeds on the previous one's output, so they run in order.
    async fn generate_packet(&self, inputs: &PacketInputs) -> Result<Packet, WizardError> {
        let guide_input = GuideInput {
            improved: &inputs.improved,
            product: &inputs.product,
            grouping: inputs.grouping,
            group_size: inputs.group_size,
            comments: &inputs.comments,
            instrument: &inputs.instrument,
        };
        let guide = self.client.student_guide(&guide_input, &inputs.opts).await?;
        let evaluation = self
            .client
            .evaluation_instrument(&guide, &inputs.instrument, &inputs.opts)
            .await?;
        let summary_opts = ModelOptions { temperature: None, ..inputs.opts.clone() };
        let summary = self.client.curriculum_summary(&guide, &summary_opts).await?;
        Ok(Packet { product: inputs.product.clone(), guide, evaluation, summary })
    }

    /// ShowingGuide → ShowingSummary. No generation call.
    pub fn show_summary(&self) -> Result<Outcome, WizardError> {
        let mut s = self.session.lock();
        if s.busy {
            return Ok(Outcome::Busy);
        }
        let check = expect_step(&s, Step::ShowingGuide).and_then(|_| {
            s.results.summary.as_ref().map(|_| ()).ok_or_else(|| rejected(MSG_NO_SUMMARY))
        });
        if let Err(e) = check {
            *s = reduce(&self.flow, s.clone(), Event::Rejected(e.user_message(s.step)));
            return Err(e);
        }
        *s = reduce(&self.flow, s.clone(), Event::SummaryOpened);
        Ok(Outcome::Advanced(s.step))
    }

    /// Back to a fresh Intake session. Ignored while a call is in flight.
    pub fn reset(&self) -> Outcome {
        let mut s = self.session.lock();
        if s.busy {
            return Outcome::Busy;
        }
        *s = reduce(&self.flow, s.clone(), Event::Reset(self.defaults.clone()));
        tracing::info!("session reset");
        Outcome::Advanced(s.step)
    }
}

/// Inputs for the guide chain. Without an explicit product, the chosen
/// output descriptor (or the lesson's first suggested output) is used.
fn packet_inputs(s: &Session, product: Option<ProductProposal>) -> Result<PacketInputs, WizardError> {
    let improved = s.results.improved.clone().ok_or_else(|| rejected(MSG_NO_IMPROVEMENT))?;
    let instrument = s.choices.instrument.clone().ok_or_else(|| rejected(MSG_NO_INSTRUMENT))?;
    let product = match product {
        Some(p) => p,
        None => s
            .choices
            .output
            .as_deref()
            .or_else(|| improved.outputs.first().map(String::as_str))
            .map(ProductProposal::from_descriptor)
            .ok_or_else(|| rejected(MSG_NO_OUTPUT))?,
    };
    Ok(PacketInputs {
        improved,
        product,
        grouping: s.choices.grouping,
        group_size: s.choices.group_size,
        comments: s.choices.comments.clone(),
        instrument,
        opts: model_options(s),
    })
}
