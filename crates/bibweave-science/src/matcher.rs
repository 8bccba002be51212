//! Mention → corpus record resolution. Pure over the index: no I/O, no
//! randomness, same answer for the same inputs.

use bibweave_core::config::{MatchingConfig, TieBreak};
use bibweave_core::models::{
    BibliographicRecord, MatchResult, MatchStrategy, MentionRecord, UnresolvedReason,
};
use serde::{Deserialize, Serialize};

use crate::corpus::CorpusIndex;
use crate::dedup::normalize_title;
use crate::identifiers::{IdentifierSet, extract_identifiers};
use crate::keys::placeholder_key;

/// Several corpus records carried the identifier a mention matched on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieNote {
    pub ordinal: usize,
    pub strategy: MatchStrategy,
    pub identifier: String,
    /// Candidate keys in load order.
    pub candidates: Vec<String>,
    pub chosen: String,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub result: MatchResult,
    pub identifiers: IdentifierSet,
    pub tie: Option<TieNote>,
}

pub struct Matcher<'a> {
    index: &'a CorpusIndex,
    config: MatchingConfig,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a CorpusIndex, config: MatchingConfig) -> Self {
        Self { index, config }
    }

    pub fn resolve_all(&self, mentions: &[MentionRecord]) -> Vec<Resolution> {
        mentions.iter().map(|mention| self.resolve(mention)).collect()
    }

    pub fn resolve(&self, mention: &MentionRecord) -> Resolution {
        let identifiers = extract_identifiers(&mention.url);

        if !mention.is_citation() {
            tracing::debug!(ordinal = mention.ordinal, url = %mention.url, "plain link passed through");
            return Resolution {
                result: MatchResult::passed_through(mention.clone()),
                identifiers,
                tie: None,
            };
        }

        for strategy in MatchStrategy::IDENTIFIER_ORDER {
            let Some(needle) = lookup_key(&identifiers, strategy) else {
                continue;
            };
            let positions = self.index.lookup(strategy, &needle);
            if positions.is_empty() {
                continue;
            }

            let chosen = self.break_tie(positions);
            let Some(record) = self.index.get(chosen) else {
                continue;
            };
            let tie = (positions.len() > 1).then(|| TieNote {
                ordinal: mention.ordinal,
                strategy,
                identifier: needle.clone(),
                candidates: positions
                    .iter()
                    .filter_map(|p| self.index.get(*p))
                    .map(|r| r.key.clone())
                    .collect(),
                chosen: record.key.clone(),
            });
            if let Some(tie) = &tie {
                tracing::debug!(
                    ordinal = mention.ordinal,
                    strategy = %strategy,
                    identifier = %needle,
                    candidates = tie.candidates.len(),
                    chosen = %tie.chosen,
                    "identifier shared by several records"
                );
            }

            tracing::debug!(ordinal = mention.ordinal, strategy = %strategy, key = %record.key, "mention matched");
            return Resolution {
                result: MatchResult::resolved(mention.clone(), record.key.clone(), strategy),
                identifiers,
                tie,
            };
        }

        // A stable identifier the corpus lacks is left to synthesis.
        if self.config.fuzzy_enabled && !identifiers.has_stable_identifier() {
            if let Some(record) = self.fuzzy_match(mention) {
                tracing::debug!(ordinal = mention.ordinal, key = %record.key, "mention matched by author/year/title");
                return Resolution {
                    result: MatchResult::resolved(
                        mention.clone(),
                        record.key.clone(),
                        MatchStrategy::Fuzzy,
                    ),
                    identifiers,
                    tie: None,
                };
            }
        }

        let reason = if identifiers.has_stable_identifier() {
            UnresolvedReason::NoCorpusHit
        } else {
            UnresolvedReason::NoIdentifier
        };
        let seed = if identifiers.normalized_url.is_empty() {
            mention.url.trim()
        } else {
            identifiers.normalized_url.as_str()
        };
        tracing::debug!(ordinal = mention.ordinal, reason = %reason, "mention unresolved");
        Resolution {
            result: MatchResult::unresolved(mention.clone(), placeholder_key(seed), reason),
            identifiers,
            tie: None,
        }
    }

    fn break_tie(&self, positions: &[usize]) -> usize {
        match self.config.tie_break {
            TieBreak::FirstLoaded => positions[0],
            TieBreak::MostComplete => positions
                .iter()
                .copied()
                .min_by_key(|p| {
                    let (authors, year) = self
                        .index
                        .get(*p)
                        .map(|r| (r.has_authors(), r.year.is_some()))
                        .unwrap_or_default();
                    (!authors, !year, *p)
                })
                .unwrap_or(positions[0]),
        }
    }

    /// Last resort: surname + year + leading title words against every record.
    /// Needs at least one title word and a unique best candidate above the
    /// threshold.
    fn fuzzy_match(&self, mention: &MentionRecord) -> Option<&'a BibliographicRecord> {
        let surname = mention.hint.author.as_deref().map(normalize_title)?;
        if surname.is_empty() {
            return None;
        }
        let title_words = mention
            .hint
            .title_words
            .iter()
            .map(|w| normalize_title(w))
            .filter(|w| !w.is_empty())
            .take(self.config.fuzzy_title_words)
            .collect::<Vec<_>>();
        if title_words.is_empty() {
            return None;
        }

        let needle = fuzzy_signature(&surname, mention.hint.year, &title_words.join(" "));

        let mut best: Option<(f64, &'a BibliographicRecord)> = None;
        let mut best_is_unique = false;
        for record in self.index.records() {
            if let (Some(want), Some(have)) = (mention.hint.year, record.year) {
                if want != have {
                    continue;
                }
            }
            let Some(record_surname) = record.first_author_surname().map(normalize_title) else {
                continue;
            };
            let record_title = normalize_title(&record.title)
                .split_whitespace()
                .take(title_words.len())
                .collect::<Vec<_>>()
                .join(" ");
            let candidate = fuzzy_signature(&record_surname, mention.hint.year.and(record.year), &record_title);

            let score = strsim::normalized_levenshtein(&needle, &candidate);
            if score < self.config.fuzzy_threshold {
                continue;
            }
            match best {
                Some((top, _)) if (score - top).abs() < f64::EPSILON => best_is_unique = false,
                Some((top, _)) if score < top => {}
                _ => {
                    best = Some((score, record));
                    best_is_unique = true;
                }
            }
        }

        match best {
            Some((_, record)) if best_is_unique => Some(record),
            Some(_) => {
                tracing::debug!(ordinal = mention.ordinal, "fuzzy match ambiguous, not used");
                None
            }
            None => None,
        }
    }
}

/// Normalized lookup key for one strategy, as the index stores it.
fn lookup_key(identifiers: &IdentifierSet, strategy: MatchStrategy) -> Option<String> {
    match strategy {
        MatchStrategy::Doi => identifiers.doi.as_ref().map(|d| d.normalized.clone()),
        MatchStrategy::Isbn => identifiers.isbn.as_ref().map(|i| i.normalized().to_string()),
        MatchStrategy::Arxiv => identifiers.arxiv_id.as_ref().map(|a| a.normalized()),
        MatchStrategy::Pubmed => identifiers.pubmed_id.as_ref().map(|p| p.id.clone()),
        MatchStrategy::Url => {
            Some(identifiers.normalized_url.clone()).filter(|url| !url.is_empty())
        }
        MatchStrategy::Fuzzy | MatchStrategy::Unresolved => None,
    }
}

fn fuzzy_signature(surname: &str, year: Option<i32>, title: &str) -> String {
    let year = year.map(|y| y.to_string()).unwrap_or_default();
    [surname, year.as_str(), title]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}
