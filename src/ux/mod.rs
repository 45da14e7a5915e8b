use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

use crate::wire::{CurriculumSummary, ImprovedContent, ProductProposal, TagSet};
use crate::wizard::{Flow, Session, Step};

pub fn show_progress(flow: &Flow, current: Step) {
    let parts: Vec<String> = flow
        .steps()
        .iter()
        .map(|s| {
            let label = format!("{} {}", flow.number(*s).unwrap_or_default(), s.label());
            if *s == current {
                label.bold().to_string()
            } else if *s < current {
                format!("✓ {}", s.label()).green().to_string()
            } else {
                label.dimmed().to_string()
            }
        })
        .collect();
    println!("\n{}", parts.join("  →  "));
}

pub fn show_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    let _ = io::stdout().flush();
    let mut s = String::new();
    if io::stdin().read_line(&mut s).is_ok() {
        let ans = s.trim().to_lowercase();
        ans == "y" || ans == "yes" || ans == "s" || ans == "si" || ans == "sí"
    } else {
        false
    }
}

pub fn prompt_line(prompt: &str) -> String {
    print!("{}: ", prompt);
    let _ = io::stdout().flush();
    let mut s = String::new();
    let _ = io::stdin().read_line(&mut s);
    s.trim().to_string()
}

/// Numbered menu; returns the chosen index, `None` on empty or bad input.
pub fn choose(title: &str, options: &[String]) -> Option<usize> {
    println!("\n{}", title.bold());
    for (i, o) in options.iter().enumerate() {
        println!("  {}. {}", i + 1, o);
    }
    let ans = prompt_line("Número");
    parse_choice(&ans, options.len())
}

fn parse_choice(answer: &str, len: usize) -> Option<usize> {
    match answer.trim().parse::<usize>() {
        Ok(n) if n >= 1 && n <= len => Some(n - 1),
        _ => None,
    }
}

pub fn show_lesson(lesson: &ImprovedContent) {
    println!("\n{}", lesson.title.bold().underline());
    if !lesson.context.is_empty() {
        println!("{}", lesson.context);
    }
    println!("\n{}", "Objectius".bold());
    for o in &lesson.objectives {
        println!("  • {}", o);
    }
    println!("\n{}", "Desenvolupament".bold());
    for (i, p) in lesson.phases.iter().enumerate() {
        println!("  {}. {}: {}", i + 1, p.name.cyan().bold(), p.description);
    }
    if !lesson.outputs.is_empty() {
        println!("\n{}", "Productes possibles".bold());
        for o in &lesson.outputs {
            println!("  • {}", o);
        }
    }
}

pub fn show_review(session: &Session) {
    if let Some(r) = &session.results.rationale {
        println!("\n{}", "Millora de la proposta".magenta().bold());
        println!("{}", indent(r, 2).italic());
    }
    if let Some(l) = &session.results.improved {
        show_lesson(l);
    }
}

pub fn show_products(products: &[ProductProposal]) {
    println!("\n{}", "Propostes de producte final".bold());
    for (i, p) in products.iter().enumerate() {
        println!("  {}. {}  {}", i + 1, p.title.bold(), format!("[{}]", p.format).dimmed());
        println!("{}", indent(&p.description, 5));
    }
}

pub fn show_packet(session: &Session) {
    let r = &session.results;
    let title = r.product.as_ref().map(|p| p.title.as_str()).unwrap_or_default();
    println!("\n{} {}", "Guia de treball de l'alumne:".yellow().bold(), title.bold());
    println!("{}", r.guide.as_deref().unwrap_or_default());
    let instrument = session.choices.instrument.as_deref().unwrap_or_default();
    println!("\n{} {}", "Instrument d'avaluació:".blue().bold(), instrument.bold());
    println!("{}", indent(r.evaluation.as_deref().unwrap_or_default(), 2));
}

fn tag_line(set: &TagSet, loose: bool) -> String {
    set.all
        .iter()
        .map(|t| {
            let on = if loose { set.is_loosely_highlighted(t) } else { set.is_highlighted(t) };
            if on {
                t.green().bold().to_string()
            } else {
                t.dimmed().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

pub fn show_summary(summary: &CurriculumSummary) {
    println!("\n{}", "Resum pedagògic final".bold().underline());
    println!("\n{}", "Competències".bold());
    for c in &summary.competencies {
        if c.code.is_empty() {
            println!("  {}", c.definition);
        } else {
            println!("  {} {}", c.code.cyan().bold(), c.definition);
        }
    }
    println!("\n{} {}", "Sabers:".bold(), summary.sabers.join(" · "));
    println!("{} {}", "Eixos escola:".bold(), tag_line(&summary.school_axes, false));
    println!("{} {}", "ODS:".bold(), tag_line(&summary.ods, true));
    println!("{} {}", "Competències ABP:".bold(), tag_line(&summary.pbl_competencies, false));
    if !summary.bloom_levels.is_empty() {
        println!("{} {}", "Nivells de Bloom:".bold(), summary.bloom_levels.join(" · "));
    }
}

fn indent(s: &str, n: usize) -> String {
    let pad = " ".repeat(n);
    s.lines()
        .map(|l| format!("{}{}", pad, l))
        .collect::<Vec<_>>()
        .join("\n")
}
