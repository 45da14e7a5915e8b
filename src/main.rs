use anyhow::{bail, Result};
use clap::Parser;
use std::future::Future;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod artifacts;
mod catalog;
mod cli;
mod client;
mod config;
mod errors;
mod intake;
mod parse;
mod prompt;
mod provider;
mod ux;
mod wire;
mod wizard;

use catalog::{Grouping, LearningPhase};
use errors::WizardError;
use wizard::{Edit, Outcome, Step, Wizard};

fn init_tracing(debug: bool) {
    let default = if debug { "lesson_wizard=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// How a failed action is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    /// Non-interactive: the error ends the run.
    Fail,
    /// Missing or wrong input: ask for it again.
    Reprompt,
    /// Service or reply trouble: offer the same call again.
    OfferRetry,
}

fn recovery(err: &WizardError, interactive: bool) -> Recovery {
    match err {
        _ if !interactive => Recovery::Fail,
        WizardError::Validation(_) | WizardError::Intake(_) => Recovery::Reprompt,
        _ => Recovery::OfferRetry,
    }
}

/// Result of one wizard action as seen by the front end.
enum Attempt {
    Done(Step),
    Reprompt,
    /// The user declined to retry.
    GaveUp,
}

/// Run one wizard action under a spinner. Errors never end an interactive
/// run; non-interactive runs stop at the first one.
async fn attempt<F, Fut>(wizard: &Wizard, interactive: bool, message: &str, mut action: F) -> Result<Attempt>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Outcome, WizardError>>,
{
    loop {
        let pb = ux::spinner(message);
        let res = action().await;
        pb.finish_and_clear();
        match res {
            Ok(Outcome::Advanced(step)) => return Ok(Attempt::Done(step)),
            Ok(Outcome::Busy) => bail!("another generation call is still running"),
            Err(e) => {
                let shown = wizard.session().error.unwrap_or_else(|| e.to_string());
                ux::show_error(&shown);
                match recovery(&e, interactive) {
                    Recovery::Fail => return Err(e.into()),
                    Recovery::Reprompt => return Ok(Attempt::Reprompt),
                    Recovery::OfferRetry if ux::confirm("Reintentar?") => continue,
                    Recovery::OfferRetry => return Ok(Attempt::GaveUp),
                }
            }
        }
    }
}

fn pick_phase(args: &cli::Args, interactive: bool) -> Option<LearningPhase> {
    if args.phase.is_some() || !interactive {
        return args.phase;
    }
    let labels: Vec<String> = LearningPhase::ALL.iter().map(|p| p.label().to_string()).collect();
    ux::choose("Fase d'aprenentatge", &labels).map(|i| LearningPhase::ALL[i])
}

/// Model menu and creativity level, offered only when nothing set them.
fn pick_model_settings(wizard: &Wizard, args: &cli::Args, cfg: &config::Config, interactive: bool) {
    if !interactive {
        return;
    }
    if cfg.model.is_none() && cfg.provider == cli::ProviderKind::Gemini {
        let labels: Vec<String> = catalog::GEMINI_MODELS
            .iter()
            .map(|m| format!("{} ({})", m.label, m.id))
            .collect();
        if let Some(i) = ux::choose("Model", &labels) {
            wizard.edit(Edit::Model(catalog::GEMINI_MODELS[i].id.to_string()));
        }
    }
    if args.temperature.is_none() {
        let current = wizard.session().choices.temperature;
        let ans = ux::prompt_line(&format!("Creativitat 0.0-1.0 (per defecte {current})"));
        if let Ok(t) = ans.parse::<f32>() {
            wizard.edit(Edit::Temperature(t));
        }
    }
}

fn pick_instrument(args: &cli::Args, interactive: bool) -> Result<Option<String>> {
    if let Some(name) = &args.instrument {
        match catalog::find_instrument(name) {
            Some(i) => return Ok(Some(i.name.to_string())),
            None if interactive => ux::show_error(&format!("instrument desconegut: {name}")),
            None => bail!("unknown evaluation instrument: {name}"),
        }
    }
    if !interactive {
        return Ok(None);
    }
    let labels: Vec<String> = catalog::EVALUATION_INSTRUMENTS
        .iter()
        .map(|i| format!("{} ({})", i.name, i.description))
        .collect();
    Ok(ux::choose("Instrument d'avaluació", &labels)
        .map(|i| catalog::EVALUATION_INSTRUMENTS[i].name.to_string()))
}

fn pick_grouping(args: &cli::Args, interactive: bool, current: Grouping, size: u8) -> (Grouping, u8) {
    let mut grouping = args.grouping.unwrap_or(current);
    let mut group_size = args.group_size.unwrap_or(size);
    if interactive && args.grouping.is_none() {
        let labels = vec![Grouping::Individual.label().to_string(), Grouping::Group.label().to_string()];
        if let Some(i) = ux::choose("Agrupament", &labels) {
            grouping = if i == 0 { Grouping::Individual } else { Grouping::Group };
        }
    }
    if interactive && grouping == Grouping::Group && args.group_size.is_none() {
        let ans = ux::prompt_line(&format!(
            "Membres per equip ({}-{}, per defecte {})",
            catalog::MIN_GROUP_SIZE,
            catalog::MAX_GROUP_SIZE,
            group_size
        ));
        if let Ok(n) = ans.parse::<u8>() {
            group_size = n;
        }
    }
    (grouping, group_size)
}

/// Short flow: the output descriptor comes from the lesson's suggestions
/// or the fixed format list.
fn pick_output(wizard: &Wizard, args: &cli::Args, interactive: bool) {
    if let Some(p) = &args.product {
        wizard.edit(Edit::Output(Some(p.clone())));
        return;
    }
    if !interactive {
        return;
    }
    let mut options: Vec<String> = wizard
        .session()
        .results
        .improved
        .map(|i| i.outputs)
        .unwrap_or_default();
    options.extend(catalog::OUTPUT_FORMATS.iter().map(|f| f.to_string()));
    if let Some(i) = ux::choose("Producte final", &options) {
        wizard.edit(Edit::Output(Some(options[i].clone())));
    }
}

fn read_proposal_text(args: &cli::Args, interactive: bool) -> Result<String> {
    if let Some(text) = &args.proposal {
        return Ok(text.clone());
    }
    let path = match &args.proposal_file {
        Some(p) => p.clone(),
        None if interactive => {
            let ans = ux::prompt_line("Proposta (text o camí a un fitxer .txt/.md)");
            let p = Path::new(&ans);
            if !p.is_file() {
                return Ok(ans);
            }
            p.to_path_buf()
        }
        None => bail!("no proposal given; use --proposal or --proposal-file"),
    };
    let file = intake::read_proposal(&path, intake::MAX_PROPOSAL_BYTES)?;
    println!("Fitxer carregat: {} ({})", file.name, file.size_label());
    if file.truncated {
        ux::show_error("el fitxer és massa gran; només s'ha llegit el principi");
    }
    Ok(file.content)
}

/// How a pass through the wizard ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Completed,
    GaveUp,
}

async fn run_once(wizard: &Wizard, args: &cli::Args, cfg: &config::Config) -> Result<Finish> {
    let interactive = !args.non_interactive;
    let flow = wizard.flow().clone();
    // After a rejected input, flags no longer apply and everything is asked.
    let asked = cli::Args { non_interactive: args.non_interactive, ..cli::Args::default() };
    let mut source = args;

    // Intake
    ux::show_progress(&flow, Step::Intake);
    if let Some(phase) = pick_phase(args, interactive) {
        wizard.edit(Edit::Phase(phase));
    }
    pick_model_settings(wizard, args, cfg, interactive);
    loop {
        let text = match read_proposal_text(source, interactive) {
            Ok(text) => text,
            Err(e) if interactive => {
                ux::show_error(&format!("{e:#}"));
                source = &asked;
                continue;
            }
            Err(e) => return Err(e),
        };
        let text = text.as_str();
        let message = "Analitzant la proposta…";
        match attempt(wizard, interactive, message, move || wizard.submit_proposal(text)).await? {
            Attempt::Done(_) => break,
            Attempt::Reprompt => source = &asked,
            Attempt::GaveUp => return Ok(Finish::GaveUp),
        }
    }

    // Reviewing
    source = args;
    ux::show_progress(&flow, Step::Reviewing);
    ux::show_review(&wizard.session());
    let step = loop {
        let s = wizard.session();
        let (grouping, group_size) = pick_grouping(source, interactive, s.choices.grouping, s.choices.group_size);
        let comments = match &source.comments {
            Some(c) => c.clone(),
            None if interactive => ux::prompt_line("Comentaris per a la fitxa (opcional)"),
            None => String::new(),
        };
        let instrument = pick_instrument(source, interactive)?;
        if !flow.includes(Step::SelectingProduct) {
            pick_output(wizard, source, interactive);
        }
        let instrument = instrument.as_deref();
        let comments = comments.as_str();
        let message = if flow.includes(Step::SelectingProduct) {
            "Generant propostes de producte…"
        } else {
            "Generant la fitxa, l'instrument i el resum…"
        };
        let action = move || wizard.configure_and_proceed(grouping, group_size, comments, instrument);
        match attempt(wizard, interactive, message, action).await? {
            Attempt::Done(step) => break step,
            Attempt::Reprompt => source = &asked,
            Attempt::GaveUp => return Ok(Finish::GaveUp),
        }
    };

    // SelectingProduct
    if step == Step::SelectingProduct {
        source = args;
        ux::show_progress(&flow, Step::SelectingProduct);
        let proposals = wizard.session().results.proposals.unwrap_or_default();
        ux::show_products(&proposals);
        loop {
            let id = match &source.product {
                Some(id) => id.clone(),
                None if interactive => {
                    let labels: Vec<String> = proposals.iter().map(|p| p.title.clone()).collect();
                    match ux::choose("Producte", &labels) {
                        Some(i) => proposals[i].id.clone(),
                        None => {
                            ux::show_error("Cal triar un producte final.");
                            continue;
                        }
                    }
                }
                None => bail!("no product given; use --product <id>"),
            };
            let id = id.as_str();
            let message = "Generant la fitxa, l'instrument i el resum…";
            match attempt(wizard, interactive, message, move || wizard.select_product_by_id(id)).await? {
                Attempt::Done(_) => break,
                Attempt::Reprompt => source = &asked,
                Attempt::GaveUp => return Ok(Finish::GaveUp),
            }
        }
    }

    // ShowingGuide
    ux::show_progress(&flow, Step::ShowingGuide);
    ux::show_packet(&wizard.session());
    if !interactive || ux::confirm("Veure el resum pedagògic?") {
        wizard.show_summary()?;
        ux::show_progress(&flow, Step::ShowingSummary);
        if let Some(summary) = &wizard.session().results.summary {
            ux::show_summary(summary);
        }
    }

    if let Some(dir) = &cfg.export_dir {
        match artifacts::export_packet(Path::new(dir), &wizard.session()) {
            Ok(written) => {
                for p in written {
                    println!("Desat: {}", p.display());
                }
            }
            Err(e) if interactive => ux::show_error(&format!("{e:#}")),
            Err(e) => return Err(e),
        }
    }
    Ok(Finish::Completed)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing(args.debug);

    let mut cfg = config::Config::load(args.config.as_deref())?;
    cfg.apply_args(&args);

    let prompts = prompt::PromptSet::with_overrides(&cfg.prompts);
    prompts.validate()?;

    let session_id = Uuid::new_v4();
    let mut prov = provider::make_provider(cfg.provider, cfg.timeout_secs, cfg.api_base.clone())?;
    if cfg.save_request || cfg.save_response {
        let dir = artifacts::session_dir(Path::new(&cfg.artifacts_dir), session_id);
        tracing::info!(dir = %dir.display(), "recording exchanges");
        prov = Box::new(artifacts::Recording::new(prov, dir, cfg.save_request, cfg.save_response));
    }

    let client = client::GenerationClient::new(prov, prompts);
    let wizard = Wizard::new(client, wizard::Flow::new(cfg.flow), cfg.choices());
    tracing::debug!(session = %session_id, flow = ?wizard.flow().variant(), provider = ?cfg.provider, "wizard ready");

    // Flags only seed the first pass; later passes ask for everything.
    let blank = cli::Args { non_interactive: args.non_interactive, ..cli::Args::default() };
    let mut current = &args;
    loop {
        let finish = run_once(&wizard, current, &cfg).await?;
        if args.non_interactive {
            break;
        }
        let again = match finish {
            Finish::Completed => ux::confirm("\nComençar una nova proposta?"),
            Finish::GaveUp => ux::confirm("\nTornar a començar des de zero?"),
        };
        if !again {
            break;
        }
        wizard.reset();
        current = &blank;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interactive_runs_never_fail_on_wizard_errors() {
        let errors = [
            WizardError::Validation("Cal triar un instrument d'avaluació.".into()),
            WizardError::Intake("a.docx".into()),
            WizardError::ServiceCall("503".into()),
            WizardError::MalformedResponse { reason: "no object".into(), raw: "hola".into() },
        ];
        for e in &errors {
            assert_ne!(recovery(e, true), Recovery::Fail, "{e}");
        }
        assert_eq!(recovery(&errors[0], true), Recovery::Reprompt);
        assert_eq!(recovery(&errors[2], true), Recovery::OfferRetry);
    }

    #[test]
    fn non_interactive_runs_stop_at_the_first_error() {
        let e = WizardError::Validation("Cal introduir algun contingut bàsic de la proposta.".into());
        assert_eq!(recovery(&e, false), Recovery::Fail);
        assert_eq!(recovery(&WizardError::ServiceCall("x".into()), false), Recovery::Fail);
    }
}
