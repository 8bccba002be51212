//! Likely-duplicate detection over bibliography records. Groups are reported
//! for manual review; records are never merged.

use std::collections::HashMap;

use bibweave_core::models::BibliographicRecord;
use serde::{Deserialize, Serialize};

use crate::corpus::index::{doi_key, pmid_key};
use crate::identifiers::ArxivId;
use crate::identifiers::isbn::normalize_isbn_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupStrategy {
    /// Two keys carry the same normalized DOI, ISBN, arXiv ID or PubMed ID.
    Identifier,
    /// Near-identical title with compatible first author and year.
    TitleFuzzy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// The record with the most complete metadata.
    pub canonical: String,
    pub duplicates: Vec<String>,
    pub strategy: DedupStrategy,
}

#[derive(Debug, Clone)]
pub struct DuplicateFinder {
    title_similarity_threshold: f64,
}

impl Default for DuplicateFinder {
    fn default() -> Self {
        Self {
            title_similarity_threshold: 0.91,
        }
    }
}

impl DuplicateFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier groups first, then fuzzy-title groups among the rest.
    pub fn find(&self, records: &[&BibliographicRecord]) -> Vec<DuplicateGroup> {
        let mut groups = self.find_by_identifier(records);
        let grouped: Vec<&str> = groups
            .iter()
            .flat_map(|g| std::iter::once(g.canonical.as_str()).chain(g.duplicates.iter().map(String::as_str)))
            .collect();
        let rest: Vec<&BibliographicRecord> = records
            .iter()
            .copied()
            .filter(|r| !grouped.contains(&r.key.as_str()))
            .collect();
        groups.extend(self.find_by_title_fuzzy(&rest));
        groups
    }

    pub fn find_by_identifier(&self, records: &[&BibliographicRecord]) -> Vec<DuplicateGroup> {
        let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            for key in identifier_keys(record) {
                buckets.entry(key).or_default().push(idx);
            }
        }

        let mut dsu = DisjointSet::new(records.len());
        for indexes in buckets.into_values() {
            if let Some((first, rest)) = indexes.split_first() {
                for idx in rest {
                    dsu.union(*first, *idx);
                }
            }
        }
        self.collect_groups(records, &mut dsu, DedupStrategy::Identifier)
    }

    pub fn find_by_title_fuzzy(&self, records: &[&BibliographicRecord]) -> Vec<DuplicateGroup> {
        let normalized_titles: Vec<String> = records
            .iter()
            .map(|record| normalize_title(&record.title))
            .collect();

        let mut dsu = DisjointSet::new(records.len());
        for i in 0..records.len() {
            for j in (i + 1)..records.len() {
                if similar_titles(
                    &normalized_titles[i],
                    &normalized_titles[j],
                    self.title_similarity_threshold,
                ) && compatible_metadata(records[i], records[j])
                {
                    dsu.union(i, j);
                }
            }
        }
        self.collect_groups(records, &mut dsu, DedupStrategy::TitleFuzzy)
    }

    fn collect_groups(
        &self,
        records: &[&BibliographicRecord],
        dsu: &mut DisjointSet,
        strategy: DedupStrategy,
    ) -> Vec<DuplicateGroup> {
        let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
        for idx in 0..records.len() {
            components.entry(dsu.find(idx)).or_default().push(idx);
        }

        let mut groups: Vec<DuplicateGroup> = components
            .into_values()
            .filter(|indexes| indexes.len() > 1)
            .map(|indexes| build_group(&indexes, records, strategy))
            .collect();
        groups.sort_by(|a, b| a.canonical.cmp(&b.canonical));
        groups
    }
}

fn build_group(
    indexes: &[usize],
    records: &[&BibliographicRecord],
    strategy: DedupStrategy,
) -> DuplicateGroup {
    let canonical_idx = choose_canonical_index(indexes, records);
    let mut duplicates: Vec<String> = indexes
        .iter()
        .filter(|idx| **idx != canonical_idx)
        .map(|idx| records[*idx].key.clone())
        .collect();
    duplicates.sort();

    DuplicateGroup {
        canonical: records[canonical_idx].key.clone(),
        duplicates,
        strategy,
    }
}

fn identifier_keys(record: &BibliographicRecord) -> Vec<String> {
    let ids = &record.identifiers;
    let mut keys = Vec::new();
    if let Some(doi) = ids.doi.as_deref().and_then(doi_key) {
        keys.push(format!("doi:{doi}"));
    }
    for isbn in ids.isbn.iter().filter_map(|raw| normalize_isbn_key(raw)) {
        keys.push(format!("isbn:{isbn}"));
    }
    if let Some(arxiv) = ids.arxiv_id.as_deref().and_then(|raw| ArxivId::parse(raw).ok()) {
        keys.push(format!("arxiv:{}", arxiv.normalized()));
    }
    if let Some(pmid) = ids.pmid.as_deref().and_then(pmid_key) {
        keys.push(format!("pmid:{pmid}"));
    }
    keys.sort();
    keys.dedup();
    keys
}

/// Years and first-author surnames must agree when both sides have them.
fn compatible_metadata(a: &BibliographicRecord, b: &BibliographicRecord) -> bool {
    let years_agree = match (a.year, b.year) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    };
    let authors_agree = match (a.first_author_surname(), b.first_author_surname()) {
        (Some(x), Some(y)) => normalize_title(x) == normalize_title(y),
        _ => true,
    };
    years_agree && authors_agree
}

pub fn normalize_title(title: &str) -> String {
    let lowercase = title.to_lowercase();
    let cleaned: String = lowercase
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn similar_titles(a: &str, b: &str, threshold: f64) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }

    if a == b {
        return true;
    }

    if a.len() < 5 || b.len() < 5 {
        return false;
    }

    strsim::normalized_levenshtein(a, b) >= threshold
}

fn choose_canonical_index(indexes: &[usize], records: &[&BibliographicRecord]) -> usize {
    let mut best_idx = indexes[0];
    let mut best_score = metadata_completeness_score(records[best_idx]);

    for idx in indexes.iter().copied().skip(1) {
        let score = metadata_completeness_score(records[idx]);
        if score > best_score {
            best_score = score;
            best_idx = idx;
        }
    }

    best_idx
}

pub fn metadata_completeness_score(record: &BibliographicRecord) -> usize {
    let mut score = 0usize;

    if !record.title.trim().is_empty() {
        score += 2;
    }
    score += record
        .authors
        .iter()
        .filter(|author| !author.trim().is_empty())
        .count();
    if record.year.is_some() {
        score += 1;
    }
    score += record.identifiers.count();
    if record.url.is_some() {
        score += 1;
    }
    if record.container_title.is_some() {
        score += 1;
    }
    if record.publisher.is_some() {
        score += 1;
    }
    // Corpus records outrank synthesized ones at equal completeness.
    if !record.is_synthesized() {
        score += 1;
    }

    score
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }

        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] = self.rank[root_a].saturating_add(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bibweave_core::models::{Provenance, RecordIdentifiers};

    fn record(key: &str, title: &str, author: &str, year: Option<i32>) -> BibliographicRecord {
        let mut record = BibliographicRecord::new(key, title);
        record.authors = vec![author.to_string()];
        record.year = year;
        record
    }

    #[test]
    fn identical_doi_spellings_group() {
        let mut a = record("a", "One", "Smith", Some(2020));
        a.identifiers = RecordIdentifiers {
            doi: Some("10.1000/XYZ".into()),
            ..Default::default()
        };
        let mut b = record("b", "Completely different", "Jones", Some(2019));
        b.identifiers = RecordIdentifiers {
            doi: Some("https://doi.org/10.1000/xyz".into()),
            ..Default::default()
        };
        b.container_title = Some("Journal".into());

        let groups = DuplicateFinder::new().find(&[&a, &b]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].strategy, DedupStrategy::Identifier);
        assert_eq!(groups[0].canonical, "b");
        assert_eq!(groups[0].duplicates, vec!["a"]);
    }

    #[test]
    fn near_identical_titles_group_when_metadata_agrees() {
        let a = record("a", "Attention Is All You Need", "Vaswani, Ashish", Some(2017));
        let mut b = record("b", "Attention is all you need.", "Ashish Vaswani", Some(2017));
        b.provenance = Provenance::Synthesized("crossref".into());
        let c = record("c", "Attention Is All You Need", "Someone Else", Some(2017));

        let groups = DuplicateFinder::new().find(&[&a, &b, &c]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].strategy, DedupStrategy::TitleFuzzy);
        assert_eq!(groups[0].canonical, "a");
        assert_eq!(groups[0].duplicates, vec!["b"]);
    }

    #[test]
    fn different_years_do_not_group() {
        let a = record("a", "Deep Learning", "LeCun", Some(2015));
        let b = record("b", "Deep Learning", "LeCun", Some(2016));
        assert!(DuplicateFinder::new().find(&[&a, &b]).is_empty());
    }

    #[test]
    fn short_titles_need_exact_match() {
        assert!(!similar_titles("abcd", "abce", 0.5));
        assert!(similar_titles("abcd", "abcd", 0.99));
    }
}
