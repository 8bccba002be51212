//! Audit trail of one resolution run: one entry per mention, totals,
//! anomalies, likely duplicates and identifier ties.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use bibweave_core::config::ReportConfig;
use bibweave_core::models::{
    Confidence, MatchOutcome, MatchResult, MatchStrategy, MentionKind, MentionState,
    UnresolvedReason,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::corpus::SkippedEntry;
use crate::dedup::DuplicateGroup;
use crate::document::RewriteStats;
use crate::error::{Result, ScienceError};
use crate::matcher::TieNote;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub ordinal: usize,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub display_text: String,
    pub url: String,
    pub kind: MentionKind,
    pub state: MentionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<MatchStrategy>,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnresolvedReason>,
    /// Enrichment source of a synthesized record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ReportEntry {
    fn from_result(result: &MatchResult) -> Self {
        let mention = &result.mention;
        let source = match &result.outcome {
            MatchOutcome::Synthesized { source, .. } => Some(source.clone()),
            _ => None,
        };
        Self {
            ordinal: mention.ordinal,
            line: mention.position.line,
            column: mention.position.column,
            offset: mention.position.offset,
            display_text: mention.display_text.clone(),
            url: mention.url.clone(),
            kind: mention.kind,
            state: result.state(),
            strategy: result.strategy(),
            confidence: result.confidence(),
            key: result.key().map(ToOwned::to_owned),
            reason: result.reason().cloned(),
            source,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.kind == MentionKind::Citation && self.reason.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub mentions: usize,
    pub citations: usize,
    pub plain_links: usize,
    /// Citation mentions by final strategy; synthesized and placeholder
    /// mentions count as `unresolved` here.
    pub by_strategy: BTreeMap<MatchStrategy, usize>,
    pub resolved: usize,
    pub synthesized: usize,
    pub placeholders: usize,
    /// Placeholders over citations; 0 when there are no citations.
    pub unresolved_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    HighUnresolvedFraction {
        fraction: f64,
        threshold: f64,
        unresolved: usize,
        citations: usize,
    },
    SkippedCorpusEntries {
        count: usize,
    },
    IdentifierTies {
        count: usize,
    },
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighUnresolvedFraction {
                fraction,
                threshold,
                unresolved,
                citations,
            } => write!(
                f,
                "{unresolved} of {citations} citations unresolved ({:.1}% > {:.1}%)",
                fraction * 100.0,
                threshold * 100.0
            ),
            Self::SkippedCorpusEntries { count } => {
                write!(f, "{count} corpus entries skipped during load")
            }
            Self::IdentifierTies { count } => {
                write!(f, "{count} mentions matched an identifier shared by several records")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusSummary {
    pub source: String,
    pub records: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedEntry>,
}

/// Everything besides the match results that goes into a report.
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    pub corpus: CorpusSummary,
    pub ties: Vec<TieNote>,
    pub duplicates: Vec<DuplicateGroup>,
    pub rewrite: Option<RewriteStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub generated_at: DateTime<Utc>,
    pub corpus: CorpusSummary,
    pub totals: Totals,
    pub anomalies: Vec<Anomaly>,
    pub entries: Vec<ReportEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<DuplicateGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ties: Vec<TieNote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteStats>,
}

impl MatchReport {
    pub fn build(results: &[MatchResult], context: ReportContext, config: &ReportConfig) -> Self {
        let entries: Vec<ReportEntry> = results.iter().map(ReportEntry::from_result).collect();
        let totals = totals(results);
        let anomalies = anomalies(&totals, &context, config);

        for anomaly in &anomalies {
            tracing::warn!(anomaly = %anomaly, "report anomaly");
        }

        Self {
            generated_at: Utc::now(),
            corpus: context.corpus,
            totals,
            anomalies,
            entries,
            duplicates: context.duplicates,
            ties: context.ties,
            rewrite: context.rewrite,
        }
    }

    /// The anomaly the CLI turns into its own exit code.
    pub fn has_high_unresolved_fraction(&self) -> bool {
        self.anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::HighUnresolvedFraction { .. }))
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.is_unresolved())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ScienceError::Parse(e.to_string()))
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let t = &self.totals;

        let _ = writeln!(out, "bibweave report ({})", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(
            out,
            "corpus: {} ({} records, {} skipped)",
            self.corpus.source,
            self.corpus.records,
            self.corpus.skipped.len()
        );
        let _ = writeln!(
            out,
            "mentions: {} ({} citations, {} plain links)",
            t.mentions, t.citations, t.plain_links
        );
        let strategies = t
            .by_strategy
            .iter()
            .filter(|(s, _)| **s != MatchStrategy::Unresolved)
            .map(|(s, n)| format!("{s} {n}"))
            .collect::<Vec<_>>();
        if !strategies.is_empty() {
            let _ = writeln!(out, "  matched: {}", strategies.join(", "));
        }
        let _ = writeln!(
            out,
            "  synthesized: {}, placeholders: {} ({:.1}% unresolved)",
            t.synthesized,
            t.placeholders,
            t.unresolved_fraction * 100.0
        );
        if let Some(rewrite) = &self.rewrite {
            let _ = writeln!(
                out,
                "rewritten: {} links ({} placeholders), {} untouched",
                rewrite.rewritten + rewrite.placeholders,
                rewrite.placeholders,
                rewrite.untouched
            );
        }

        if !self.anomalies.is_empty() {
            let _ = writeln!(out, "\nanomalies:");
            for anomaly in &self.anomalies {
                let _ = writeln!(out, "  ! {anomaly}");
            }
        }

        let unresolved: Vec<_> = self.unresolved().collect();
        if !unresolved.is_empty() {
            let _ = writeln!(out, "\nunresolved:");
            for e in unresolved {
                let _ = writeln!(
                    out,
                    "  {}:{} \"{}\" {} -> {} ({})",
                    e.line,
                    e.column,
                    e.display_text,
                    e.url,
                    e.key.as_deref().unwrap_or("-"),
                    e.reason.as_ref().map(ToString::to_string).unwrap_or_default()
                );
            }
        }

        if !self.ties.is_empty() {
            let _ = writeln!(out, "\nidentifier ties:");
            for tie in &self.ties {
                let _ = writeln!(
                    out,
                    "  mention {} {} {}: {} -> {}",
                    tie.ordinal,
                    tie.strategy,
                    tie.identifier,
                    tie.candidates.join(", "),
                    tie.chosen
                );
            }
        }

        if !self.duplicates.is_empty() {
            let _ = writeln!(out, "\npossible duplicates (not merged):");
            for group in &self.duplicates {
                let _ = writeln!(
                    out,
                    "  {} ~ {}",
                    group.canonical,
                    group.duplicates.join(", ")
                );
            }
        }

        out
    }
}

fn totals(results: &[MatchResult]) -> Totals {
    let mut t = Totals {
        mentions: results.len(),
        ..Default::default()
    };
    for result in results {
        if !result.mention.is_citation() {
            t.plain_links += 1;
            continue;
        }
        t.citations += 1;
        if let Some(strategy) = result.strategy() {
            *t.by_strategy.entry(strategy).or_default() += 1;
        }
        match result.outcome {
            MatchOutcome::Resolved { .. } => t.resolved += 1,
            MatchOutcome::Synthesized { .. } => t.synthesized += 1,
            MatchOutcome::Placeholder { .. } => t.placeholders += 1,
            MatchOutcome::PassedThrough => {}
        }
    }
    if t.citations > 0 {
        t.unresolved_fraction = t.placeholders as f64 / t.citations as f64;
    }
    t
}

fn anomalies(totals: &Totals, context: &ReportContext, config: &ReportConfig) -> Vec<Anomaly> {
    let mut out = Vec::new();
    if totals.citations >= config.min_citations
        && totals.citations > 0
        && totals.unresolved_fraction > config.unresolved_threshold
    {
        out.push(Anomaly::HighUnresolvedFraction {
            fraction: totals.unresolved_fraction,
            threshold: config.unresolved_threshold,
            unresolved: totals.placeholders,
            citations: totals.citations,
        });
    }
    if !context.corpus.skipped.is_empty() {
        out.push(Anomaly::SkippedCorpusEntries {
            count: context.corpus.skipped.len(),
        });
    }
    if !context.ties.is_empty() {
        out.push(Anomaly::IdentifierTies {
            count: context.ties.len(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use bibweave_core::models::{
        AuthorYearHint, CitationForm, DocumentPosition, MentionRecord,
    };

    use super::*;

    fn mention(ordinal: usize, kind: MentionKind) -> MentionRecord {
        MentionRecord {
            ordinal,
            display_text: format!("Doe {ordinal} (2020)"),
            url: format!("https://example.org/{ordinal}"),
            hint: AuthorYearHint::default(),
            position: DocumentPosition {
                line: ordinal + 1,
                column: 1,
                offset: ordinal * 10,
            },
            kind,
            form: CitationForm::InText,
        }
    }

    fn placeholder(ordinal: usize) -> MatchResult {
        let mut r = MatchResult::unresolved(
            mention(ordinal, MentionKind::Citation),
            format!("unresolved-0000000{ordinal}"),
            UnresolvedReason::NoIdentifier,
        );
        r.advance(MentionState::PlaceholderAssigned).unwrap();
        r
    }

    fn resolved(ordinal: usize) -> MatchResult {
        MatchResult::resolved(
            mention(ordinal, MentionKind::Citation),
            format!("key{ordinal}"),
            MatchStrategy::Doi,
        )
    }

    #[test]
    fn totals_exclude_plain_links_from_unresolved() {
        let results = vec![
            resolved(0),
            placeholder(1),
            MatchResult::passed_through(mention(2, MentionKind::PlainLink)),
        ];
        let report = MatchReport::build(&results, ReportContext::default(), &ReportConfig::default());

        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.totals.citations, 2);
        assert_eq!(report.totals.plain_links, 1);
        assert_eq!(report.totals.by_strategy[&MatchStrategy::Doi], 1);
        assert!((report.totals.unresolved_fraction - 0.5).abs() < 1e-9);
        let unresolved: Vec<_> = report.unresolved().map(|e| e.ordinal).collect();
        assert_eq!(unresolved, vec![1]);
        // Below `min_citations`, so no anomaly.
        assert!(!report.has_high_unresolved_fraction());
    }

    #[test]
    fn high_unresolved_fraction_is_flagged() {
        let mut results: Vec<_> = (0..4).map(placeholder).collect();
        results.push(resolved(4));
        results.push(resolved(5));
        let report = MatchReport::build(&results, ReportContext::default(), &ReportConfig::default());
        assert!(report.has_high_unresolved_fraction());
        assert!(report.render_text().contains("4 of 6 citations unresolved"));
    }

    #[test]
    fn skipped_entries_and_ties_are_anomalies() {
        let context = ReportContext {
            corpus: CorpusSummary {
                source: "refs.bib".into(),
                records: 3,
                skipped: vec![SkippedEntry {
                    position: 12,
                    reason: "entry has no key".into(),
                }],
            },
            ties: vec![TieNote {
                ordinal: 0,
                strategy: MatchStrategy::Doi,
                identifier: "10.1000/x".into(),
                candidates: vec!["a".into(), "b".into()],
                chosen: "a".into(),
            }],
            ..Default::default()
        };
        let report = MatchReport::build(&[resolved(0)], context, &ReportConfig::default());
        assert_eq!(
            report.anomalies,
            vec![
                Anomaly::SkippedCorpusEntries { count: 1 },
                Anomaly::IdentifierTies { count: 1 }
            ]
        );
        let text = report.render_text();
        assert!(text.contains("corpus: refs.bib (3 records, 1 skipped)"));
        assert!(text.contains("mention 0 doi 10.1000/x: a, b -> a"));
    }

    #[test]
    fn json_round_trips() {
        let report = MatchReport::build(&[resolved(0), placeholder(1)], ReportContext::default(), &ReportConfig::default());
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["entries"][1]["reason"]["reason"], "no_identifier");
        assert_eq!(value["totals"]["by_strategy"]["doi"], 1);
        let back: MatchReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entries, report.entries);
    }
}
