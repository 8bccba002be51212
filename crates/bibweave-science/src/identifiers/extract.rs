use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::identifiers::url::{normalize_url, url_host};
use crate::identifiers::{
    Identifier, arxiv::ArxivId, doi::Doi, isbn::Isbn, pubmed::PubmedId,
};

static DOI_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+[A-Z0-9/)]").unwrap()
});

// Publisher landing pages: /doi/10.x/y, /doi/abs/10.x/y, /doi/full/..., /doi/pdf/...
static DOI_PATH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/doi/(?:abs/|full/|pdf/|epdf/|book/)?(10\.\d{4,9}/[^?#\s]+)").unwrap()
});

static ARXIV_REGEX_NEW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)arxiv:\s*(\d{4}\.\d{4,5}(v\d+)?)").unwrap()
});

static ARXIV_REGEX_OLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)arxiv:\s*([a-z\-]+(\.[A-Z]{2})?/\d{7})").unwrap()
});

static ISBN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)isbn(-13|-10)?[:\s]?([0-9Xx\-\s]{10,20})").unwrap()
});

static PMID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bpmid:\s*(\d{1,9})\b").unwrap()
});

// Bookseller product paths, host-agnostic: /dp/<isbn>, /gp/product/<isbn>, ...
static ISBN_PATH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/(?:dp|gp/product|o/asin|isbn|book|ean)/([0-9][0-9\-]{8,15}[0-9X])(?:[/?#.]|$)")
        .unwrap()
});

static ISBN_QUERY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[?&](?:ean|isbn|isbn13|vid=isbn)=?([0-9][0-9\-]{8,15}[0-9X])(?:[&#]|$)").unwrap()
});

static ISBN13_SEGMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(97[89]\d{10})(?:[/?#.]|$)").unwrap()
});

/// Everything a mention URL tells us about the cited work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSet {
    pub doi: Option<Doi>,
    pub arxiv_id: Option<ArxivId>,
    pub isbn: Option<Isbn>,
    pub pubmed_id: Option<PubmedId>,
    pub normalized_url: String,
}

impl IdentifierSet {
    pub fn has_stable_identifier(&self) -> bool {
        self.doi.is_some() || self.arxiv_id.is_some() || self.isbn.is_some() || self.pubmed_id.is_some()
    }

    /// Stable identifiers in matching priority order: DOI, ISBN, arXiv, PubMed.
    pub fn stable_identifiers(&self) -> Vec<Identifier> {
        let mut ids = Vec::with_capacity(4);
        if let Some(doi) = &self.doi {
            ids.push(Identifier::Doi(doi.clone()));
        }
        if let Some(isbn) = &self.isbn {
            ids.push(Identifier::Isbn(isbn.clone()));
        }
        if let Some(arxiv) = &self.arxiv_id {
            ids.push(Identifier::Arxiv(arxiv.clone()));
        }
        if let Some(pmid) = &self.pubmed_id {
            ids.push(Identifier::Pubmed(pmid.clone()));
        }
        ids
    }

    /// The identifier an enrichment lookup should use.
    pub fn primary(&self) -> Option<Identifier> {
        self.stable_identifiers().into_iter().next()
    }
}

/// Pulls identifiers out of a mention URL. Total: malformed input yields an
/// empty set (plus whatever `normalize_url` makes of it), never an error.
pub fn extract_identifiers(url: &str) -> IdentifierSet {
    let normalized_url = normalize_url(url);
    let host = url_host(url).unwrap_or_default();

    let doi = extract_doi_from_url(url, &host);
    let arxiv_id = ArxivId::parse(url)
        .ok()
        .filter(|_| host.is_empty() || host.ends_with("arxiv.org"))
        .or_else(|| {
            doi.as_ref()
                .and_then(Doi::arxiv_suffix)
                .and_then(|suffix| ArxivId::parse(suffix).ok())
        });
    let isbn = extract_isbn_from_url(url);
    let pubmed_id = if host.is_empty() {
        None
    } else {
        PubmedId::parse(url).ok()
    };

    IdentifierSet {
        doi,
        arxiv_id,
        isbn,
        pubmed_id,
        normalized_url,
    }
}

fn extract_doi_from_url(url: &str, host: &str) -> Option<Doi> {
    let trimmed = url.trim();
    if host == "doi.org" || host == "dx.doi.org" || trimmed.to_ascii_lowercase().starts_with("doi:") {
        let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
        return Doi::parse(without_fragment).ok();
    }
    DOI_PATH_REGEX
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|m| Doi::parse(m.as_str()).ok())
}

fn extract_isbn_from_url(url: &str) -> Option<Isbn> {
    let candidates = ISBN_PATH_REGEX
        .captures_iter(url)
        .chain(ISBN_QUERY_REGEX.captures_iter(url))
        .chain(ISBN13_SEGMENT_REGEX.captures_iter(url))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect::<Vec<_>>();
    candidates.iter().find_map(|raw| Isbn::parse(raw).ok())
}

pub fn extract_dois_from_text(text: &str) -> Vec<Doi> {
    DOI_REGEX.find_iter(text)
        .filter_map(|m| Doi::parse(m.as_str()).ok())
        .collect()
}

pub fn extract_arxiv_ids_from_text(text: &str) -> Vec<ArxivId> {
    let mut ids = Vec::new();

    for m in ARXIV_REGEX_NEW.captures_iter(text) {
        if let Some(id) = m.get(1).and_then(|g| ArxivId::parse(g.as_str()).ok()) {
            ids.push(id);
        }
    }

    for m in ARXIV_REGEX_OLD.captures_iter(text) {
        if let Some(id) = m.get(1).and_then(|g| ArxivId::parse(g.as_str()).ok()) {
            ids.push(id);
        }
    }

    ids.sort_by(|a, b| a.id.cmp(&b.id));
    ids.dedup_by(|a, b| a.id == b.id);
    ids
}

pub fn extract_isbn_from_text(text: &str) -> Option<Isbn> {
    for m in ISBN_REGEX.captures_iter(text) {
        if let Some(raw) = m.get(2)
            && let Ok(isbn) = Isbn::parse(raw.as_str())
        {
            return Some(isbn);
        }
    }
    None
}

pub fn extract_pmid_from_text(text: &str) -> Option<PubmedId> {
    PMID_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| PubmedId::parse(m.as_str()).ok())
}
