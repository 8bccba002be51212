use quick_xml::de::from_str;
use serde::Deserialize;

use crate::arxiv::types::ArxivMetadata;
use crate::error::{Result, ScienceError};
use crate::identifiers::{arxiv::ArxivId, doi::Doi};

// Only the elements a bibliography entry needs; the rest of the feed is skipped.
#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    #[serde(default)]
    title: String,
    published: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
    #[serde(rename = "arxiv:journal_ref", alias = "journal_ref")]
    journal_ref: Option<String>,
    #[serde(rename = "arxiv:doi", alias = "doi")]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

impl Entry {
    /// Unknown or malformed IDs come back as a single entry pointing at `/api/errors`.
    fn is_error(&self) -> bool {
        self.id.contains("/api/errors")
    }
}

impl TryFrom<Entry> for ArxivMetadata {
    type Error = ScienceError;

    fn try_from(entry: Entry) -> Result<Self> {
        let arxiv_id = ArxivId::parse(entry.id.trim())
            .map_err(|_| ScienceError::Parse(format!("arXiv entry has no usable id: {}", entry.id)))?;

        Ok(Self {
            arxiv_id,
            doi: entry.doi.and_then(|raw| Doi::parse(raw.trim()).ok()),
            title: squash(&entry.title),
            authors: entry
                .authors
                .iter()
                .map(|author| squash(&author.name))
                .filter(|name| !name.is_empty())
                .collect(),
            year: entry.published.as_deref().and_then(leading_year),
            journal_ref: entry.journal_ref.map(|j| squash(&j)).filter(|j| !j.is_empty()),
        })
    }
}

/// Parses an Atom feed from the arXiv query API, dropping error entries.
pub fn parse_atom_response(xml: &str) -> Result<Vec<ArxivMetadata>> {
    let feed: Feed =
        from_str(xml).map_err(|e| ScienceError::Parse(format!("invalid atom xml: {e}")))?;

    feed.entries
        .into_iter()
        .filter(|entry| !entry.is_error())
        .map(ArxivMetadata::try_from)
        .collect()
}

// `2017-06-12T17:57:40Z` -> 2017
fn leading_year(timestamp: &str) -> Option<i32> {
    let digits = timestamp.trim().get(..4)?;
    digits.bytes().all(|b| b.is_ascii_digit()).then(|| digits.parse().ok())?
}

// Atom titles wrap across lines.
fn squash(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
