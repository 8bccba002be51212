//! Enrichment collaborators: look up canonical metadata for one stable identifier.

pub mod crossref;
pub mod openlibrary;
pub mod semantic_scholar;

use std::sync::Arc;

use async_trait::async_trait;
use bibweave_core::config::{CacheConfig, SynthesisConfig};
use serde::{Deserialize, Serialize};

use crate::arxiv::ArxivClient;
use crate::error::Result;
use crate::identifiers::Identifier;

pub use crossref::CrossRefSource;
pub use openlibrary::OpenLibrarySource;
pub use semantic_scholar::SemanticScholarSource;

/// Metadata as a source reported it, before the quality gate has looked at it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetadata {
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub isbn: Option<String>,
    pub arxiv_id: Option<String>,
    pub pmid: Option<String>,
    pub url: Option<String>,
    /// Source vocabulary, mapped with `EntryType::from_label`.
    pub entry_type: Option<String>,
    pub container_title: Option<String>,
    pub publisher: Option<String>,
    /// Name of the source that answered.
    pub source: String,
}

/// `Ok(Some)` found, `Ok(None)` the source has nothing for this identifier,
/// `Err` the lookup itself failed.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, identifier: &Identifier) -> bool;

    async fn lookup(&self, identifier: &Identifier) -> Result<Option<RawMetadata>>;
}

/// Routes each identifier to the sources that understand it, in registration
/// order, until one of them finds something.
#[derive(Default, Clone)]
pub struct SourceRouter {
    sources: Vec<Arc<dyn EnrichmentSource>>,
}

impl SourceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<dyn EnrichmentSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// DOI → CrossRef, arXiv → arXiv API, ISBN → Open Library, PubMed →
    /// Semantic Scholar. Semantic Scholar also backs up DOI and arXiv misses.
    pub fn from_config(synthesis: &SynthesisConfig, cache: &CacheConfig) -> Result<Self> {
        let s2_key = synthesis
            .semantic_scholar_api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());

        Ok(Self::new()
            .with_source(Arc::new(CrossRefSource::new(
                synthesis.polite_email.clone(),
                cache,
            )?))
            .with_source(Arc::new(ArxivClient::new(cache)?))
            .with_source(Arc::new(OpenLibrarySource::new(cache)?))
            .with_source(Arc::new(SemanticScholarSource::new(s2_key, cache)?)))
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl EnrichmentSource for SourceRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn supports(&self, identifier: &Identifier) -> bool {
        self.sources.iter().any(|s| s.supports(identifier))
    }

    async fn lookup(&self, identifier: &Identifier) -> Result<Option<RawMetadata>> {
        let mut last_error = None;
        for source in self.sources.iter().filter(|s| s.supports(identifier)) {
            match source.lookup(identifier).await {
                Ok(Some(found)) => {
                    tracing::debug!(source = source.name(), identifier = %identifier, "metadata found");
                    return Ok(Some(found));
                }
                Ok(None) => {
                    tracing::debug!(source = source.name(), identifier = %identifier, "no metadata");
                }
                Err(e) => {
                    tracing::debug!(source = source.name(), identifier = %identifier, error = %e, "lookup failed");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScienceError;
    use crate::identifiers::{Doi, Isbn};

    struct Fixed {
        name: &'static str,
        kind: &'static str,
        answer: fn() -> Result<Option<RawMetadata>>,
    }

    #[async_trait]
    impl EnrichmentSource for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn supports(&self, identifier: &Identifier) -> bool {
            identifier.kind() == self.kind
        }

        async fn lookup(&self, _identifier: &Identifier) -> Result<Option<RawMetadata>> {
            (self.answer)()
        }
    }

    fn doi() -> Identifier {
        Identifier::Doi(Doi::parse("10.1000/abc").unwrap())
    }

    #[tokio::test]
    async fn falls_through_to_next_supporting_source() {
        let router = SourceRouter::new()
            .with_source(Arc::new(Fixed {
                name: "empty",
                kind: "doi",
                answer: || Ok(None),
            }))
            .with_source(Arc::new(Fixed {
                name: "books",
                kind: "isbn",
                answer: || panic!("never asked"),
            }))
            .with_source(Arc::new(Fixed {
                name: "hit",
                kind: "doi",
                answer: || {
                    Ok(Some(RawMetadata {
                        title: Some("Found".into()),
                        source: "hit".into(),
                        ..Default::default()
                    }))
                },
            }));

        let found = router.lookup(&doi()).await.unwrap().unwrap();
        assert_eq!(found.source, "hit");
    }

    #[tokio::test]
    async fn error_surfaces_only_when_nothing_found() {
        let router = SourceRouter::new().with_source(Arc::new(Fixed {
            name: "broken",
            kind: "doi",
            answer: || Err(ScienceError::Timeout("broken".into())),
        }));
        assert!(router.lookup(&doi()).await.unwrap_err().is_transient());

        let isbn = Identifier::Isbn(Isbn::parse("0137670109").unwrap());
        assert!(!router.supports(&isbn));
        assert_eq!(router.lookup(&isbn).await.unwrap(), None);
    }
}
