//! Creates bibliography records for unresolved citation mentions through an
//! enrichment source, behind the quality gate. Anything that does not pass
//! ends with a placeholder key and a typed reason.

pub mod gate;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bibweave_core::config::SynthesisConfig;
use bibweave_core::models::{
    BibliographicRecord, EntryType, MatchOutcome, MatchResult, MentionState, Provenance,
    RecordIdentifiers, UnresolvedReason,
};
use futures::StreamExt;
use tokio::time::Instant;

use crate::corpus::fields::collapse_whitespace;
use crate::error::Result;
use crate::identifiers::Identifier;
use crate::keys::KeyAllocator;
use crate::matcher::Resolution;
use crate::sources::{EnrichmentSource, RawMetadata};

pub use gate::{GateViolation, QualityGate};

const BASE_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
enum LookupOutcome {
    Found(RawMetadata),
    NotFound,
    Failed(String),
    DeadlineExceeded,
}

/// What synthesis did, for the report and the bibliography.
#[derive(Debug, Clone, Default)]
pub struct SynthesisSummary {
    /// New records in mention order.
    pub records: Vec<BibliographicRecord>,
    /// Unique identifiers looked up.
    pub lookups: usize,
    pub rejected: usize,
    pub failed: usize,
    pub deadline_skipped: usize,
}

pub struct Synthesizer {
    source: Option<Arc<dyn EnrichmentSource>>,
    config: SynthesisConfig,
    gate: QualityGate,
}

impl Synthesizer {
    pub fn new(source: Option<Arc<dyn EnrichmentSource>>, config: SynthesisConfig) -> Self {
        let gate = QualityGate::new(config.gate.clone());
        Self {
            source,
            config,
            gate,
        }
    }

    /// Moves every unresolved citation mention to a terminal state. Matched
    /// and passed-through mentions are left alone. Synthesized keys avoid
    /// `existing_keys` and each other.
    pub async fn run<'k>(
        &self,
        resolutions: &mut [Resolution],
        existing_keys: impl IntoIterator<Item = &'k str>,
    ) -> Result<SynthesisSummary> {
        let mut summary = SynthesisSummary::default();

        let pending: Vec<usize> = resolutions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.result.is_placeholder() && r.result.state() == MentionState::Extracted)
            .map(|(i, _)| i)
            .collect();

        let source = match &self.source {
            Some(source) if self.config.enabled => source,
            _ => {
                for i in pending {
                    resolutions[i].result.advance(MentionState::PlaceholderAssigned)?;
                }
                return Ok(summary);
            }
        };

        // One lookup per distinct identifier, ordered by first mention.
        let mut groups: Vec<(Identifier, Vec<usize>)> = Vec::new();
        let mut slot_of: HashMap<String, usize> = HashMap::new();
        for i in pending {
            let identifier = resolutions[i]
                .identifiers
                .primary()
                .filter(|id| source.supports(id));
            let Some(identifier) = identifier else {
                resolutions[i].result.advance(MentionState::PlaceholderAssigned)?;
                continue;
            };
            let slot = *slot_of.entry(identifier.to_string()).or_insert_with(|| {
                groups.push((identifier.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(i);
        }
        summary.lookups = groups.len();
        if groups.is_empty() {
            return Ok(summary);
        }

        tracing::info!(lookups = groups.len(), concurrency = self.config.concurrency, "synthesizing records");
        let outcomes = self.lookup_all(source.as_ref(), &groups).await;

        let mut keys = KeyAllocator::new(existing_keys);
        for ((identifier, members), outcome) in groups.iter().zip(outcomes) {
            match outcome {
                LookupOutcome::Found(metadata) => match self.gate.check(&metadata) {
                    Ok(()) => {
                        let source_name = metadata.source.clone();
                        let mut record = record_from_metadata(metadata, identifier);
                        record.key = keys.allocate(&record);
                        tracing::debug!(identifier = %identifier, key = %record.key, "record synthesized");
                        for &i in members {
                            let result = &mut resolutions[i].result;
                            result.advance(MentionState::SynthesisAttempted)?;
                            result.outcome = MatchOutcome::Synthesized {
                                key: record.key.clone(),
                                source: source_name.clone(),
                            };
                            result.advance(MentionState::Synthesized)?;
                        }
                        summary.records.push(record);
                    }
                    Err(violations) => {
                        let why = gate::describe(&violations);
                        tracing::warn!(identifier = %identifier, reason = %why, "enrichment result rejected by quality gate");
                        summary.rejected += 1;
                        for &i in members {
                            attempt_failed(
                                &mut resolutions[i].result,
                                UnresolvedReason::SynthesisRejected(why.clone()),
                            )?;
                        }
                    }
                },
                LookupOutcome::NotFound => {
                    summary.failed += 1;
                    for &i in members {
                        attempt_failed(
                            &mut resolutions[i].result,
                            UnresolvedReason::SynthesisFailed(format!("no metadata for {identifier}")),
                        )?;
                    }
                }
                LookupOutcome::Failed(message) => {
                    tracing::warn!(identifier = %identifier, error = %message, "enrichment lookup failed");
                    summary.failed += 1;
                    for &i in members {
                        attempt_failed(
                            &mut resolutions[i].result,
                            UnresolvedReason::SynthesisFailed(message.clone()),
                        )?;
                    }
                }
                LookupOutcome::DeadlineExceeded => {
                    summary.deadline_skipped += 1;
                    for &i in members {
                        let result = &mut resolutions[i].result;
                        set_reason(result, UnresolvedReason::DeadlineExceeded);
                        result.advance(MentionState::PlaceholderAssigned)?;
                    }
                }
            }
        }

        tracing::info!(
            synthesized = summary.records.len(),
            rejected = summary.rejected,
            failed = summary.failed,
            deadline_skipped = summary.deadline_skipped,
            "synthesis finished"
        );
        Ok(summary)
    }

    /// Runs lookups on a bounded stream; each result lands in its own slot.
    async fn lookup_all(
        &self,
        source: &dyn EnrichmentSource,
        groups: &[(Identifier, Vec<usize>)],
    ) -> Vec<LookupOutcome> {
        let deadline = self
            .config
            .deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        let mut slots = vec![LookupOutcome::DeadlineExceeded; groups.len()];
        let finished: Vec<(usize, LookupOutcome)> = futures::stream::iter(groups.iter().enumerate())
            .map(|(slot, (identifier, _))| async move {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return (slot, LookupOutcome::DeadlineExceeded);
                }
                (slot, self.lookup_with_retry(source, identifier).await)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (slot, outcome) in finished {
            slots[slot] = outcome;
        }
        slots
    }

    async fn lookup_with_retry(
        &self,
        source: &dyn EnrichmentSource,
        identifier: &Identifier,
    ) -> LookupOutcome {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut attempt = 0u32;
        loop {
            let failure = match tokio::time::timeout(timeout, source.lookup(identifier)).await {
                Ok(Ok(Some(metadata))) => return LookupOutcome::Found(metadata),
                Ok(Ok(None)) => return LookupOutcome::NotFound,
                Ok(Err(e)) if !e.is_transient() => return LookupOutcome::Failed(e.to_string()),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}s", timeout.as_secs()),
            };

            if attempt >= self.config.max_retries {
                return LookupOutcome::Failed(failure);
            }
            let backoff = BASE_BACKOFF * 2u32.pow(attempt);
            tracing::debug!(identifier = %identifier, attempt, error = %failure, "retrying lookup");
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

fn set_reason(result: &mut MatchResult, reason: UnresolvedReason) {
    if let MatchOutcome::Placeholder { reason: current, .. } = &mut result.outcome {
        *current = reason;
    }
}

fn attempt_failed(result: &mut MatchResult, reason: UnresolvedReason) -> Result<()> {
    result.advance(MentionState::SynthesisAttempted)?;
    set_reason(result, reason);
    result.advance(MentionState::PlaceholderAssigned)?;
    Ok(())
}

/// Builds the record exactly from what the source returned, plus the
/// identifier it was looked up by. The key is assigned by the caller.
fn record_from_metadata(metadata: RawMetadata, identifier: &Identifier) -> BibliographicRecord {
    let mut identifiers = RecordIdentifiers {
        doi: metadata.doi,
        arxiv_id: metadata.arxiv_id,
        isbn: metadata.isbn.into_iter().collect(),
        pmid: metadata.pmid,
    };
    let canonical_url = match identifier {
        Identifier::Doi(doi) => {
            identifiers.doi.get_or_insert_with(|| doi.normalized.clone());
            doi.url.clone()
        }
        Identifier::Isbn(isbn) => {
            if identifiers.isbn.is_empty() {
                identifiers.isbn.push(isbn.isbn13.clone());
            }
            format!("https://openlibrary.org/isbn/{}", isbn.isbn13)
        }
        Identifier::Arxiv(id) => {
            identifiers.arxiv_id.get_or_insert_with(|| id.normalized());
            id.abs_url.clone()
        }
        Identifier::Pubmed(pmid) => {
            identifiers.pmid.get_or_insert_with(|| pmid.id.clone());
            pmid.url.clone()
        }
    };

    let entry_type = match metadata.entry_type.as_deref().map(EntryType::from_label) {
        Some(known) if known != EntryType::Other => known,
        _ => match identifier {
            Identifier::Isbn(_) => EntryType::Book,
            Identifier::Arxiv(_) => EntryType::Preprint,
            Identifier::Doi(_) | Identifier::Pubmed(_) => EntryType::Article,
        },
    };

    BibliographicRecord {
        key: String::new(),
        title: collapse_whitespace(metadata.title.as_deref().unwrap_or_default()),
        authors: metadata
            .authors
            .iter()
            .map(|a| collapse_whitespace(a))
            .filter(|a| !a.is_empty())
            .collect(),
        year: metadata.year,
        identifiers,
        url: metadata.url.or(Some(canonical_url)),
        entry_type,
        container_title: metadata.container_title,
        publisher: metadata.publisher,
        provenance: Provenance::Synthesized(metadata.source),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bibweave_core::config::MatchingConfig;
    use bibweave_core::models::{
        AuthorYearHint, CitationForm, DocumentPosition, MentionKind, MentionRecord,
    };

    use super::*;
    use crate::corpus::CorpusIndex;
    use crate::error::ScienceError;
    use crate::matcher::Matcher;

    /// Answers from a table; counts calls per identifier.
    #[derive(Default)]
    struct TableSource {
        answers: HashMap<String, RawMetadata>,
        calls: Mutex<HashMap<String, usize>>,
        transient_failures: AtomicUsize,
        delay: Option<Duration>,
    }

    impl TableSource {
        fn with(mut self, id: &str, title: &str, author: &str, year: i32) -> Self {
            self.answers.insert(
                id.to_string(),
                RawMetadata {
                    title: Some(title.to_string()),
                    authors: vec![author.to_string()],
                    year: Some(year),
                    source: "table".to_string(),
                    ..Default::default()
                },
            );
            self
        }

        fn calls(&self, id: &str) -> usize {
            self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl EnrichmentSource for TableSource {
        fn name(&self) -> &str {
            "table"
        }

        fn supports(&self, _identifier: &Identifier) -> bool {
            true
        }

        async fn lookup(&self, identifier: &Identifier) -> Result<Option<RawMetadata>> {
            let id = identifier.to_string();
            *self.calls.lock().unwrap().entry(id.clone()).or_default() += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ScienceError::Timeout(id));
            }
            Ok(self.answers.get(&id).cloned())
        }
    }

    fn mention(ordinal: usize, url: &str) -> MentionRecord {
        MentionRecord {
            ordinal,
            display_text: "Doe (2020)".to_string(),
            url: url.to_string(),
            hint: AuthorYearHint::default(),
            position: DocumentPosition::default(),
            kind: MentionKind::Citation,
            form: CitationForm::InText,
        }
    }

    fn resolve(index: &CorpusIndex, urls: &[&str]) -> Vec<Resolution> {
        let mentions: Vec<_> = urls.iter().enumerate().map(|(i, u)| mention(i, u)).collect();
        Matcher::new(index, MatchingConfig::default()).resolve_all(&mentions)
    }

    fn config() -> SynthesisConfig {
        SynthesisConfig {
            enabled: true,
            timeout_secs: 5,
            max_retries: 2,
            ..Default::default()
        }
    }

    fn corpus() -> CorpusIndex {
        CorpusIndex::build(vec![BibliographicRecord::new("doe2020deep", "Deep corpus")])
    }

    #[tokio::test]
    async fn shared_identifiers_share_one_lookup_and_one_record() {
        let source = Arc::new(TableSource::default().with(
            "doi:10.1000/a",
            "Deep structured things",
            "Doe, Jane",
            2020,
        ));
        let index = corpus();
        let mut resolutions = resolve(
            &index,
            &["https://doi.org/10.1000/A", "https://dx.doi.org/10.1000/a"],
        );

        let synthesizer = Synthesizer::new(Some(source.clone()), config());
        let summary = synthesizer
            .run(&mut resolutions, index.records().iter().map(|r| r.key.as_str()))
            .await
            .unwrap();

        assert_eq!(source.calls("doi:10.1000/a"), 1);
        assert_eq!(summary.records.len(), 1);
        // Collides with the corpus key, so it gets a suffix.
        assert_eq!(summary.records[0].key, "doe2020deepa");
        assert!(summary.records[0].is_synthesized());
        for r in &resolutions {
            assert_eq!(r.result.key(), Some("doe2020deepa"));
            assert_eq!(
                r.result.trail,
                vec![
                    MentionState::Extracted,
                    MentionState::SynthesisAttempted,
                    MentionState::Synthesized
                ]
            );
        }
    }

    #[tokio::test]
    async fn keys_follow_mention_order() {
        let source = Arc::new(
            TableSource::default()
                .with("doi:10.1000/first", "Deep results one", "Doe, Jane", 2020)
                .with("doi:10.1000/second", "Deep results two", "Doe, John", 2020),
        );
        let index = corpus();
        let mut resolutions = resolve(
            &index,
            &["https://doi.org/10.1000/first", "https://doi.org/10.1000/second"],
        );
        let summary = Synthesizer::new(Some(source), config())
            .run(&mut resolutions, index.records().iter().map(|r| r.key.as_str()))
            .await
            .unwrap();
        let keys: Vec<_> = summary.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["doe2020deepa", "doe2020deepb"]);
    }

    #[tokio::test]
    async fn gate_rejection_becomes_placeholder() {
        let source = Arc::new(TableSource::default().with(
            "doi:10.1000/web",
            "Web page by Example Corp",
            "Example Corp",
            2020,
        ));
        let index = corpus();
        let mut resolutions = resolve(&index, &["https://doi.org/10.1000/web"]);
        let summary = Synthesizer::new(Some(source), config())
            .run(&mut resolutions, std::iter::empty())
            .await
            .unwrap();

        assert!(summary.records.is_empty());
        assert_eq!(summary.rejected, 1);
        let result = &resolutions[0].result;
        assert!(result.is_placeholder());
        assert_eq!(result.state(), MentionState::PlaceholderAssigned);
        assert!(matches!(result.reason(), Some(UnresolvedReason::SynthesisRejected(_))));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let source = Arc::new(TableSource {
            transient_failures: AtomicUsize::new(1),
            ..TableSource::default().with("doi:10.1000/flaky", "Flaky but real", "Doe, Jane", 2021)
        });
        let index = corpus();
        let mut resolutions = resolve(&index, &["https://doi.org/10.1000/flaky"]);
        let summary = Synthesizer::new(Some(source.clone()), config())
            .run(&mut resolutions, std::iter::empty())
            .await
            .unwrap();
        assert_eq!(source.calls("doi:10.1000/flaky"), 2);
        assert_eq!(summary.records.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_and_misses_degrade() {
        let source = Arc::new(TableSource {
            transient_failures: AtomicUsize::new(10),
            ..TableSource::default()
        });
        let index = corpus();
        let mut resolutions = resolve(&index, &["https://doi.org/10.1000/down"]);
        let cfg = SynthesisConfig {
            max_retries: 1,
            ..config()
        };
        Synthesizer::new(Some(source.clone()), cfg)
            .run(&mut resolutions, std::iter::empty())
            .await
            .unwrap();
        assert_eq!(source.calls("doi:10.1000/down"), 2);
        assert!(matches!(
            resolutions[0].result.reason(),
            Some(UnresolvedReason::SynthesisFailed(_))
        ));
    }

    #[tokio::test]
    async fn deadline_stops_unstarted_lookups() {
        let source = Arc::new(TableSource {
            delay: Some(Duration::from_millis(1200)),
            ..TableSource::default()
                .with("doi:10.1000/one", "First slow record", "Doe, Jane", 2020)
                .with("doi:10.1000/two", "Second slow record", "Doe, Jane", 2020)
        });
        let index = corpus();
        let mut resolutions = resolve(
            &index,
            &["https://doi.org/10.1000/one", "https://doi.org/10.1000/two"],
        );
        let cfg = SynthesisConfig {
            concurrency: 1,
            deadline_secs: Some(1),
            ..config()
        };
        let summary = Synthesizer::new(Some(source.clone()), cfg)
            .run(&mut resolutions, std::iter::empty())
            .await
            .unwrap();

        assert_eq!(summary.records.len(), 1);
        assert_eq!(summary.deadline_skipped, 1);
        assert_eq!(source.calls("doi:10.1000/two"), 0);
        let skipped = &resolutions[1].result;
        assert_eq!(skipped.reason(), Some(&UnresolvedReason::DeadlineExceeded));
        assert_eq!(
            skipped.trail,
            vec![MentionState::Extracted, MentionState::PlaceholderAssigned]
        );
    }

    #[tokio::test]
    async fn disabled_synthesis_assigns_placeholders() {
        let index = corpus();
        let mut resolutions = resolve(&index, &["https://doi.org/10.1000/x", "https://example.org/p"]);
        let summary = Synthesizer::new(None, SynthesisConfig::default())
            .run(&mut resolutions, std::iter::empty())
            .await
            .unwrap();
        assert_eq!(summary.lookups, 0);
        for r in &resolutions {
            assert_eq!(r.result.state(), MentionState::PlaceholderAssigned);
        }
        assert_eq!(resolutions[0].result.reason(), Some(&UnresolvedReason::NoCorpusHit));
        assert_eq!(resolutions[1].result.reason(), Some(&UnresolvedReason::NoIdentifier));
    }

    #[test]
    fn record_fills_looked_up_identifier() {
        let isbn = crate::identifiers::Isbn::parse("0137670109").unwrap();
        let record = record_from_metadata(
            RawMetadata {
                title: Some("Structured   Computer Organization".into()),
                source: "openlibrary".into(),
                ..Default::default()
            },
            &Identifier::Isbn(isbn),
        );
        assert_eq!(record.title, "Structured Computer Organization");
        assert_eq!(record.identifiers.isbn, vec!["9780137670109"]);
        assert_eq!(record.entry_type, EntryType::Book);
        assert_eq!(record.provenance, Provenance::Synthesized("openlibrary".into()));
    }
}
