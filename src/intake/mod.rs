//! Proposal intake from a file. Plain text and markdown are read directly;
//! word-processor and PDF formats need an external extractor and are refused.

use fs_err as fs;
use humansize::{format_size, DECIMAL};
use std::path::Path;

use crate::errors::WizardError;

pub const MAX_PROPOSAL_BYTES: usize = 200_000;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text"];
const EXTRACTED_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "odt"];

#[derive(Debug, Clone, PartialEq)]
pub struct ProposalFile {
    pub name: String,
    pub bytes: usize,
    pub truncated: bool,
    pub content: String,
}

impl ProposalFile {
    pub fn size_label(&self) -> String {
        format_size(self.bytes, DECIMAL)
    }
}

/// Read the first `max_bytes` of a proposal file.
pub fn read_proposal(path: &Path, max_bytes: usize) -> Result<ProposalFile, WizardError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if EXTRACTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(WizardError::Intake(format!(
            "{}: .{ext} files need text extraction; save the proposal as .txt or .md",
            path.display()
        )));
    }
    if !ext.is_empty() && !TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return Err(WizardError::Intake(format!("{}: unsupported file type .{ext}", path.display())));
    }

    let data = fs::read(path).map_err(|e| WizardError::Intake(e.to_string()))?;
    let bytes = data.len();
    let truncated = bytes > max_bytes;
    let mut slice = if truncated { &data[..max_bytes] } else { &data[..] };
    // Drop a character the cut split in half.
    if let Err(e) = std::str::from_utf8(slice) {
        if truncated && e.error_len().is_none() {
            slice = &slice[..e.valid_up_to()];
        }
    }
    let content = String::from_utf8_lossy(slice).into_owned();
    tracing::debug!(path = %path.display(), bytes, truncated, "proposal file read");

    Ok(ProposalFile {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        bytes,
        truncated,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_markdown_and_reports_size() {
        let mut f = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        write!(f, "# Caiguda lliure\nMesurem g.").unwrap();
        let p = read_proposal(f.path(), MAX_PROPOSAL_BYTES).unwrap();
        assert!(p.content.starts_with("# Caiguda"));
        assert!(!p.truncated);
        assert_eq!(p.size_label(), "27 B");
    }

    #[test]
    fn truncates_long_files() {
        let mut f = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        f.write_all(&[b'a'; 64]).unwrap();
        let p = read_proposal(f.path(), 10).unwrap();
        assert!(p.truncated);
        assert_eq!(p.content.len(), 10);
        assert_eq!(p.bytes, 64);
    }

    #[test]
    fn truncation_never_splits_a_character() {
        let mut f = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(f, "àèò").unwrap();
        let p = read_proposal(f.path(), 3).unwrap();
        assert!(p.truncated);
        assert_eq!(p.content, "à");
        assert!(!p.content.contains('\u{FFFD}'));
    }

    #[test]
    fn refuses_formats_that_need_extraction() {
        let f = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        assert!(matches!(read_proposal(f.path(), 100), Err(WizardError::Intake(_))));
    }
}
