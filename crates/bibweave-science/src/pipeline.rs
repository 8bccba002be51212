//! End-to-end run: corpus → index → mentions → matching → synthesis →
//! rewrite → bibliography → report.

use std::path::PathBuf;
use std::sync::Arc;

use bibweave_core::config::{AppConfig, CorpusConfig};
use bibweave_core::models::{BibliographicRecord, MatchOutcome, MatchResult};
use bibweave_core::BibweaveError;

use crate::corpus::{self, CorpusIndex, CorpusLoad, CorpusSource};
use crate::dedup::DuplicateFinder;
use crate::document::{Document, Rewriter, scan_mentions};
use crate::error::Result;
use crate::formats::{self, BibFormat};
use crate::matcher::Matcher;
use crate::report::{CorpusSummary, MatchReport, ReportContext};
use crate::sources::{EnrichmentSource, SourceRouter};
use crate::synthesis::{SynthesisSummary, Synthesizer};

/// Corpus source named by the configuration: a file wins over a remote URL.
pub fn corpus_source(config: &CorpusConfig) -> Result<CorpusSource> {
    if let Some(path) = config.path.as_deref().filter(|p| !p.trim().is_empty()) {
        return Ok(CorpusSource::File(PathBuf::from(path)));
    }
    if let Some(url) = config.remote_url.as_deref().filter(|u| !u.trim().is_empty()) {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());
        return Ok(CorpusSource::Remote {
            url: url.to_string(),
            api_key,
        });
    }
    Err(BibweaveError::ConfigError("no corpus configured: set corpus.path or corpus.remote_url".into()).into())
}

#[derive(Debug, Clone)]
pub struct ResolveOutput {
    /// The rewritten document.
    pub document: String,
    pub bibliography: String,
    pub bib_format: BibFormat,
    /// Records written to the bibliography, first-cited first.
    pub records: Vec<BibliographicRecord>,
    pub results: Vec<MatchResult>,
    pub synthesis: SynthesisSummary,
    pub report: MatchReport,
}

pub struct Pipeline {
    config: AppConfig,
    enrichment: Option<Arc<dyn EnrichmentSource>>,
}

impl Pipeline {
    /// No enrichment source; unresolved citations get placeholders.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            enrichment: None,
        }
    }

    /// Registers the default source router when synthesis is enabled.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let enrichment: Option<Arc<dyn EnrichmentSource>> = if config.synthesis.enabled {
            let router = SourceRouter::from_config(&config.synthesis, &config.cache)?;
            Some(Arc::new(router))
        } else {
            None
        };
        Ok(Self { config, enrichment })
    }

    pub fn with_enrichment(mut self, source: Arc<dyn EnrichmentSource>) -> Self {
        self.enrichment = Some(source);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn load_corpus(&self, source: &CorpusSource) -> Result<CorpusLoad> {
        let load = corpus::load_corpus(source).await?;
        tracing::info!(
            source = %load.source,
            records = load.records.len(),
            skipped = load.skipped.len(),
            "corpus loaded"
        );
        Ok(load)
    }

    /// Runs every stage after corpus loading. The document is parsed before
    /// anything else is done with it; a malformed document aborts the run.
    pub async fn resolve(
        &self,
        document: &[u8],
        corpus: CorpusLoad,
        bib_format: BibFormat,
    ) -> Result<ResolveOutput> {
        let document = Document::from_bytes(document)?;

        let summary = CorpusSummary {
            source: corpus.source.clone(),
            records: corpus.records.len(),
            skipped: corpus.skipped,
        };
        let index = CorpusIndex::build(corpus.records);

        let mentions = scan_mentions(&document);
        tracing::info!(mentions = mentions.len(), "document scanned");

        let mut resolutions =
            Matcher::new(&index, self.config.matching.clone()).resolve_all(&mentions);

        let synthesizer = Synthesizer::new(self.enrichment.clone(), self.config.synthesis.clone());
        let synthesis = synthesizer
            .run(&mut resolutions, index.records().iter().map(|r| r.key.as_str()))
            .await?;

        let ties = resolutions.iter().filter_map(|r| r.tie.clone()).collect();
        let results: Vec<MatchResult> = resolutions.into_iter().map(|r| r.result).collect();
        debug_assert_eq!(results.len(), mentions.len());

        let (rewritten, rewrite_stats) = Rewriter::new(&self.config.rewrite).rewrite(&document, &results);

        let records = bibliography_records(&results, &index, &synthesis.records);
        let bibliography = formats::export(&records, bib_format)?;
        let duplicates = DuplicateFinder::new().find(&records.iter().collect::<Vec<_>>());
        for group in &duplicates {
            tracing::warn!(canonical = %group.canonical, duplicates = ?group.duplicates, "possible duplicate records");
        }

        let report = MatchReport::build(
            &results,
            ReportContext {
                corpus: summary,
                ties,
                duplicates,
                rewrite: Some(rewrite_stats),
            },
            &self.config.report,
        );

        tracing::info!(
            resolved = report.totals.resolved,
            synthesized = report.totals.synthesized,
            placeholders = report.totals.placeholders,
            "resolution finished"
        );

        Ok(ResolveOutput {
            document: rewritten.render(),
            bibliography,
            bib_format,
            records,
            results,
            synthesis,
            report,
        })
    }

    /// Loads the configured corpus, then resolves `document` against it.
    pub async fn run(&self, document: &[u8], bib_format: BibFormat) -> Result<ResolveOutput> {
        let source = corpus_source(&self.config.corpus)?;
        let corpus = self.load_corpus(&source).await?;
        self.resolve(document, corpus, bib_format).await
    }
}

/// Records behind the keys the rewritten document cites, in first-citation
/// order, each once.
fn bibliography_records(
    results: &[MatchResult],
    index: &CorpusIndex,
    synthesized: &[BibliographicRecord],
) -> Vec<BibliographicRecord> {
    let mut out: Vec<BibliographicRecord> = Vec::new();
    for result in results {
        let record = match &result.outcome {
            MatchOutcome::Resolved { key, .. } => index.find_by_key(key),
            MatchOutcome::Synthesized { key, .. } => synthesized.iter().find(|r| &r.key == key),
            MatchOutcome::Placeholder { .. } | MatchOutcome::PassedThrough => None,
        };
        if let Some(record) = record {
            if !out.iter().any(|r| r.key == record.key) {
                out.push(record.clone());
            }
        }
    }
    out
}
