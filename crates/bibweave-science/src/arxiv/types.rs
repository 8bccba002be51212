use serde::{Deserialize, Serialize};

use crate::identifiers::{arxiv::ArxivId, doi::Doi};
use crate::sources::RawMetadata;

/// One arXiv entry, reduced to what a bibliography record carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivMetadata {
    pub arxiv_id: ArxivId,
    pub doi: Option<Doi>,
    pub title: String,
    pub authors: Vec<String>,
    /// Year of first submission; later versions keep it.
    pub year: Option<i32>,
    pub journal_ref: Option<String>,
}

impl ArxivMetadata {
    pub fn into_metadata(self) -> RawMetadata {
        RawMetadata {
            title: Some(self.title).filter(|t| !t.is_empty()),
            authors: self.authors,
            year: self.year,
            doi: self.doi.map(|d| d.normalized),
            arxiv_id: Some(self.arxiv_id.normalized()),
            url: Some(self.arxiv_id.abs_url),
            entry_type: Some("preprint".to_string()),
            container_title: self.journal_ref,
            source: "arxiv".to_string(),
            ..Default::default()
        }
    }
}
