use std::collections::{HashMap, HashSet};

use bibweave_core::models::{BibliographicRecord, MatchStrategy};
use serde::Serialize;

use crate::identifiers::isbn::normalize_isbn_key;
use crate::identifiers::{ArxivId, Doi, PubmedId, normalize_url};

/// Normalized identifier → positions of the records carrying it, in load order.
type PositionMap = HashMap<String, Vec<usize>>;

/// Read-only lookup structure over one corpus load.
#[derive(Debug, Default)]
pub struct CorpusIndex {
    records: Vec<BibliographicRecord>,
    doi: PositionMap,
    isbn: PositionMap,
    arxiv: PositionMap,
    pmid: PositionMap,
    url: PositionMap,
    keys: HashSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub records: usize,
    pub doi: usize,
    pub isbn: usize,
    pub arxiv: usize,
    pub pmid: usize,
    pub url: usize,
    /// Identifier values shared by more than one record.
    pub shared_identifiers: usize,
}

fn insert(map: &mut PositionMap, key: String, position: usize) {
    let positions = map.entry(key).or_default();
    if positions.last() != Some(&position) {
        positions.push(position);
    }
}

pub fn doi_key(raw: &str) -> Option<String> {
    Doi::parse(raw).ok().map(|doi| doi.normalized)
}

pub fn pmid_key(raw: &str) -> Option<String> {
    PubmedId::parse(raw).ok().map(|pmid| pmid.id)
}

impl CorpusIndex {
    pub fn build(records: Vec<BibliographicRecord>) -> Self {
        let mut index = Self::default();

        for (position, record) in records.iter().enumerate() {
            let ids = &record.identifiers;

            let doi = ids.doi.as_deref().and_then(doi_key);
            if let Some(doi) = &doi {
                insert(&mut index.doi, doi.clone(), position);
                insert(&mut index.url, normalize_url(&format!("https://doi.org/{doi}")), position);
            }
            for isbn in ids.isbn.iter().filter_map(|raw| normalize_isbn_key(raw)) {
                insert(&mut index.isbn, isbn, position);
            }
            if let Some(arxiv) = ids.arxiv_id.as_deref().and_then(|raw| ArxivId::parse(raw).ok()) {
                insert(&mut index.arxiv, arxiv.normalized(), position);
                insert(&mut index.url, normalize_url(&arxiv.abs_url), position);
            }
            if let Some(pmid) = ids.pmid.as_deref().and_then(pmid_key) {
                insert(&mut index.pmid, pmid, position);
            }
            if let Some(url) = record.url.as_deref().map(normalize_url).filter(|u| !u.is_empty()) {
                insert(&mut index.url, url, position);
            }

            if !index.keys.insert(record.key.clone()) {
                tracing::warn!(key = %record.key, "duplicate record key in corpus");
            }
        }

        index.records = records;
        tracing::debug!(stats = ?index.stats(), "corpus index built");
        index
    }

    pub fn records(&self) -> &[BibliographicRecord] {
        &self.records
    }

    pub fn get(&self, position: usize) -> Option<&BibliographicRecord> {
        self.records.get(position)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn find_by_key(&self, key: &str) -> Option<&BibliographicRecord> {
        self.records.iter().find(|record| record.key == key)
    }

    /// Positions of the records whose `strategy` identifier equals `key`.
    /// `key` must already be normalized the way the index normalizes it.
    pub fn lookup(&self, strategy: MatchStrategy, key: &str) -> &[usize] {
        let map = match strategy {
            MatchStrategy::Doi => &self.doi,
            MatchStrategy::Isbn => &self.isbn,
            MatchStrategy::Arxiv => &self.arxiv,
            MatchStrategy::Pubmed => &self.pmid,
            MatchStrategy::Url => &self.url,
            MatchStrategy::Fuzzy | MatchStrategy::Unresolved => return &[],
        };
        map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stats(&self) -> IndexStats {
        let shared = [&self.doi, &self.isbn, &self.arxiv, &self.pmid]
            .iter()
            .flat_map(|map| map.values())
            .filter(|positions| positions.len() > 1)
            .count();
        IndexStats {
            records: self.records.len(),
            doi: self.doi.len(),
            isbn: self.isbn.len(),
            arxiv: self.arxiv.len(),
            pmid: self.pmid.len(),
            url: self.url.len(),
            shared_identifiers: shared,
        }
    }
}
