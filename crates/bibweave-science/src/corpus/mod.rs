//! Corpus loading: every supported source is normalized into
//! [`BibliographicRecord`]s once, then indexed by identifier.

pub mod bibtex;
pub mod fields;
pub mod index;
pub mod json;
pub mod remote;
pub mod ris;

use std::path::{Path, PathBuf};

use bibweave_core::models::BibliographicRecord;
use serde::{Deserialize, Serialize};

use crate::error::{CorpusError, Result};

pub use index::CorpusIndex;
pub use remote::RemoteCorpus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusSource {
    File(PathBuf),
    Remote { url: String, api_key: Option<String> },
}

impl CorpusSource {
    pub fn name(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Remote { url, .. } => url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorpusFormat {
    Json,
    Ris,
    Bibtex,
}

impl CorpusFormat {
    /// Extension first, then a look at the first non-blank character.
    pub fn detect(path: &Path, content: &str) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json" | "csljson") => return Some(Self::Json),
            Some("ris") => return Some(Self::Ris),
            Some("bib" | "bibtex" | "biblatex") => return Some(Self::Bibtex),
            _ => {}
        }

        let head = content.trim_start_matches('\u{feff}').trim_start();
        if head.starts_with('[') || head.starts_with('{') {
            Some(Self::Json)
        } else if head.starts_with("TY  -") {
            Some(Self::Ris)
        } else if head.starts_with('@') || head.contains("\n@") {
            Some(Self::Bibtex)
        } else {
            None
        }
    }
}

/// An entry that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEntry {
    /// Entry ordinal for JSON sources, source line for RIS and BibTeX.
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedEntries {
    pub records: Vec<BibliographicRecord>,
    pub skipped: Vec<SkippedEntry>,
}

/// Result of a successful load: at least one record.
#[derive(Debug, Clone)]
pub struct CorpusLoad {
    pub source: String,
    pub format: Option<CorpusFormat>,
    pub records: Vec<BibliographicRecord>,
    pub skipped: Vec<SkippedEntry>,
}

pub async fn load_corpus(source: &CorpusSource) -> Result<CorpusLoad> {
    match source {
        CorpusSource::File(path) => {
            let path = path.clone();
            tokio::task::spawn_blocking(move || load_file(&path))
                .await
                .map_err(|e| CorpusError::Read {
                    path: source_path(source),
                    message: e.to_string(),
                })?
        }
        CorpusSource::Remote { url, api_key } => {
            let parsed = RemoteCorpus::new(url, api_key.clone())?.fetch().await?;
            finish(source.name(), None, parsed)
        }
    }
}

fn source_path(source: &CorpusSource) -> PathBuf {
    match source {
        CorpusSource::File(path) => path.clone(),
        CorpusSource::Remote { url, .. } => PathBuf::from(url),
    }
}

pub fn load_file(path: &Path) -> Result<CorpusLoad> {
    if !path.exists() {
        return Err(CorpusError::NotFound(path.to_path_buf()).into());
    }
    let bytes = std::fs::read(path).map_err(|e| CorpusError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let content = String::from_utf8(bytes).map_err(|e| CorpusError::Read {
        path: path.to_path_buf(),
        message: format!("not valid UTF-8: {e}"),
    })?;
    load_str(&content, path)
}

/// Parses already-read corpus text. `path` only drives format detection and messages.
pub fn load_str(content: &str, path: &Path) -> Result<CorpusLoad> {
    let name = path.display().to_string();
    if content.trim().is_empty() {
        return Err(CorpusError::Empty(name).into());
    }

    let format = CorpusFormat::detect(path, content)
        .ok_or_else(|| CorpusError::UnsupportedFormat(name.clone()))?;
    let parsed = match format {
        CorpusFormat::Json => json::parse_json_corpus(content, &name)?,
        CorpusFormat::Ris => ris::parse_ris_corpus(content),
        CorpusFormat::Bibtex => bibtex::parse_bibtex_corpus(content),
    };
    finish(name, Some(format), parsed)
}

fn finish(
    source: String,
    format: Option<CorpusFormat>,
    parsed: ParsedEntries,
) -> Result<CorpusLoad> {
    for skipped in &parsed.skipped {
        tracing::warn!(source = %source, position = skipped.position, reason = %skipped.reason, "skipping malformed corpus entry");
    }

    if parsed.records.is_empty() {
        return Err(if parsed.skipped.is_empty() {
            CorpusError::Empty(source)
        } else {
            CorpusError::NoUsableRecords {
                source_name: source,
                skipped: parsed.skipped.len(),
            }
        }
        .into());
    }

    tracing::info!(
        source = %source,
        records = parsed.records.len(),
        skipped = parsed.skipped.len(),
        "corpus loaded"
    );
    Ok(CorpusLoad {
        source,
        format,
        records: parsed.records,
        skipped: parsed.skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScienceError;

    #[test]
    fn detects_formats() {
        assert_eq!(CorpusFormat::detect(Path::new("a.bib"), ""), Some(CorpusFormat::Bibtex));
        assert_eq!(CorpusFormat::detect(Path::new("a.txt"), " [ ]"), Some(CorpusFormat::Json));
        assert_eq!(CorpusFormat::detect(Path::new("export"), "TY  - JOUR\n"), Some(CorpusFormat::Ris));
        assert_eq!(CorpusFormat::detect(Path::new("export"), "% x\n@book{a,}"), Some(CorpusFormat::Bibtex));
        assert_eq!(CorpusFormat::detect(Path::new("export"), "hello"), None);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = load_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ScienceError::Corpus(CorpusError::NotFound(_))));
    }

    #[test]
    fn empty_sources_are_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let blank = tmp.path().join("blank.json");
        std::fs::write(&blank, "  \n").unwrap();
        assert!(matches!(
            load_file(&blank).unwrap_err(),
            ScienceError::Corpus(CorpusError::Empty(_))
        ));

        let empty_array = tmp.path().join("empty.json");
        std::fs::write(&empty_array, "[]").unwrap();
        assert!(matches!(
            load_file(&empty_array).unwrap_err(),
            ScienceError::Corpus(CorpusError::Empty(_))
        ));
    }

    #[test]
    fn all_entries_malformed_is_fatal() {
        let err = load_str(r#"[{"title": "no key"}]"#, Path::new("x.json")).unwrap_err();
        assert!(matches!(
            err,
            ScienceError::Corpus(CorpusError::NoUsableRecords { skipped: 1, .. })
        ));
    }

    #[tokio::test]
    async fn loads_file_source() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lib.json");
        std::fs::write(&path, r#"[{"id": "a", "title": "Alpha"}, {"title": "skip me"}]"#).unwrap();

        let load = load_corpus(&CorpusSource::File(path)).await.unwrap();
        assert_eq!(load.records.len(), 1);
        assert_eq!(load.skipped.len(), 1);
        assert_eq!(load.format, Some(CorpusFormat::Json));
    }
}
