pub mod arxiv;
pub mod doi;
pub mod extract;
pub mod isbn;
pub mod pubmed;
pub mod url;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use arxiv::ArxivId;
pub use doi::Doi;
pub use extract::{IdentifierSet, extract_identifiers};
pub use isbn::Isbn;
pub use pubmed::PubmedId;
pub use url::normalize_url;

/// A stable identifier that can key both the corpus index and an enrichment lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Identifier {
    Doi(Doi),
    Isbn(Isbn),
    Arxiv(ArxivId),
    Pubmed(PubmedId),
}

impl Identifier {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Doi(_) => "doi",
            Self::Isbn(_) => "isbn",
            Self::Arxiv(_) => "arxiv",
            Self::Pubmed(_) => "pmid",
        }
    }

    /// Normalized value, comparable across spellings of the same identifier.
    pub fn key(&self) -> String {
        match self {
            Self::Doi(doi) => doi.normalized.clone(),
            Self::Isbn(isbn) => isbn.normalized().to_string(),
            Self::Arxiv(id) => id.normalized(),
            Self::Pubmed(pmid) => pmid.id.clone(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}
