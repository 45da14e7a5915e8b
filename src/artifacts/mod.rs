use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use fs_err as fs;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::provider::{DynProvider, Provider};
use crate::wire::{GenerationReply, GenerationRequest};
use crate::wizard::Session;

pub struct SavedPaths {
    pub request: Option<PathBuf>,
    pub response: Option<PathBuf>,
}

pub fn session_dir(root: &Path, session: Uuid) -> PathBuf {
    root.join(session.to_string())
}

pub fn save_stage(
    dir: &Path,
    req: &GenerationRequest,
    reply: &GenerationReply,
    save_request: bool,
    save_response: bool,
) -> Result<SavedPaths> {
    fs::create_dir_all(dir)?;
    let prefix = format!("{}-{}", Utc::now().format("%H%M%S%3f"), req.stage.as_str());

    let mut request_path = None;
    let mut response_path = None;

    if save_request {
        let p = dir.join(format!("{prefix}.request.json"));
        fs::write(&p, to_string_pretty(req)?)?;
        request_path = Some(p);
    }

    if save_response {
        let p = dir.join(format!("{prefix}.response.json"));
        fs::write(&p, to_string_pretty(reply)?)?;
        response_path = Some(p);
    }

    Ok(SavedPaths { request: request_path, response: response_path })
}

/// Wraps a provider and writes every exchange to disk. A failed write is
/// logged and never fails the call itself.
pub struct Recording {
    inner: DynProvider,
    dir: PathBuf,
    save_request: bool,
    save_response: bool,
}

impl Recording {
    pub fn new(inner: DynProvider, dir: PathBuf, save_request: bool, save_response: bool) -> Self {
        Self { inner, dir, save_request, save_response }
    }
}

#[async_trait]
impl Provider for Recording {
    async fn send(&self, req: &GenerationRequest) -> Result<GenerationReply> {
        let reply = self.inner.send(req).await?;
        match save_stage(&self.dir, req, &reply, self.save_request, self.save_response) {
            Ok(saved) => {
                if let Some(p) = &saved.request {
                    tracing::debug!(stage = req.stage.as_str(), path = %p.display(), "request saved");
                }
                if let Some(p) = &saved.response {
                    tracing::debug!(stage = req.stage.as_str(), path = %p.display(), "response saved");
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not save exchange"),
        }
        Ok(reply)
    }
}

/// Write the finished packet (guide, evaluation, curriculum summary) to `dir`.
pub fn export_packet(dir: &Path, session: &Session) -> Result<Vec<PathBuf>> {
    let r = &session.results;
    let guide = r.guide.as_deref().ok_or_else(|| anyhow!("no student guide to export yet"))?;
    fs::create_dir_all(dir)?;

    let title = r
        .product
        .as_ref()
        .map(|p| p.title.as_str())
        .or_else(|| r.improved.as_ref().map(|i| i.title.as_str()))
        .unwrap_or("Fitxa de l'alumne");

    let mut written = Vec::new();

    let p = dir.join("fitxa-alumne.md");
    fs::write(&p, format!("# {title}\n\n{guide}\n"))?;
    written.push(p);

    if let Some(evaluation) = &r.evaluation {
        let instrument = session.choices.instrument.as_deref().unwrap_or("Instrument d'avaluació");
        let p = dir.join("instrument-avaluacio.md");
        fs::write(&p, format!("# {instrument}\n\n{evaluation}\n"))?;
        written.push(p);
    }

    if let Some(summary) = &r.summary {
        let p = dir.join("resum-curricular.json");
        fs::write(&p, to_string_pretty(summary)?)?;
        written.push(p);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::Scripted;
    use crate::wire::{Stage, TagSet, CurriculumSummary};
    use crate::wizard::Choices;

    #[tokio::test]
    async fn recording_writes_request_and_reply() {
        let tmp = tempfile::tempdir().unwrap();
        let script = Scripted::new(vec![Ok("Fitxa".into())]);
        let rec = Recording::new(script.boxed(), tmp.path().join("s1"), true, false);
        let req = GenerationRequest {
            stage: Stage::Guide,
            model: "m".into(),
            system: "s".into(),
            prompt: "p".into(),
            temperature: None,
            schema: None,
        };

        let reply = rec.send(&req).await.unwrap();

        assert_eq!(reply.text.as_deref(), Some("Fitxa"));
        let names: Vec<String> = std::fs::read_dir(tmp.path().join("s1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("-guide.request.json"));
    }

    #[test]
    fn export_needs_a_guide() {
        let tmp = tempfile::tempdir().unwrap();
        let session = Session::new(Choices::default());
        assert!(export_packet(tmp.path(), &session).is_err());
    }

    #[test]
    fn export_writes_every_available_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = Session::new(Choices::default());
        session.choices.instrument = Some("Rúbriques".into());
        session.results.guide = Some("Passos de la pràctica".into());
        session.results.evaluation = Some("Criteris".into());
        session.results.summary = Some(CurriculumSummary {
            competencies: vec![],
            sabers: vec!["Cinemàtica".into()],
            school_axes: TagSet::default(),
            ods: TagSet::default(),
            pbl_competencies: TagSet::default(),
            bloom_levels: vec![],
        });

        let written = export_packet(tmp.path(), &session).unwrap();

        assert_eq!(written.len(), 3);
        let guide = std::fs::read_to_string(tmp.path().join("fitxa-alumne.md")).unwrap();
        assert!(guide.starts_with("# Fitxa de l'alumne"));
        let eval = std::fs::read_to_string(tmp.path().join("instrument-avaluacio.md")).unwrap();
        assert!(eval.starts_with("# Rúbriques"));
    }
}
