//! Format-independent field bag. Every corpus format flattens an entry into a
//! [`RawEntry`]; field-name synonyms are folded here, once, at load time.

use std::collections::HashMap;

use bibweave_core::models::{BibliographicRecord, EntryType, Provenance, RecordIdentifiers};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::identifiers::extract::{
    extract_arxiv_ids_from_text, extract_dois_from_text, extract_isbn_from_text,
    extract_pmid_from_text,
};

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").unwrap());

static EXTRA_CITATION_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*citation\s+key:\s*(\S+)\s*$").unwrap());

const KEY_FIELDS: &[&str] = &["citationkey", "citekey", "bibtexkey", "id", "key"];
const TITLE_FIELDS: &[&str] = &["title", "ti", "t1", "primarytitle"];
const AUTHOR_FIELDS: &[&str] = &["author", "authors", "creators", "au", "a1"];
const YEAR_FIELDS: &[&str] = &["year", "issued", "date", "py", "y1", "da", "published", "publicationyear"];
const DOI_FIELDS: &[&str] = &["doi", "do"];
const URL_FIELDS: &[&str] = &["url", "link", "href", "ur"];
const ISBN_FIELDS: &[&str] = &["isbn", "isbn13", "isbn10", "sn"];
const PMID_FIELDS: &[&str] = &["pmid", "pubmedid", "pubmed"];
const ARXIV_FIELDS: &[&str] = &["arxiv", "arxivid", "eprint"];
const TYPE_FIELDS: &[&str] = &["type", "itemtype", "entrytype", "ty"];
const CONTAINER_FIELDS: &[&str] = &[
    "containertitle",
    "publicationtitle",
    "journal",
    "journaltitle",
    "booktitle",
    "venue",
    "proceedingstitle",
    "jo",
    "jf",
    "t2",
    "bt",
];
const PUBLISHER_FIELDS: &[&str] = &["publisher", "pb"];
const EXTRA_FIELDS: &[&str] = &["extra", "note", "n1"];

/// `DOI`, `doi` and `d.o.i.` all fold to `doi`; `container-title` to `containertitle`.
pub fn fold_key(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    fields: HashMap<String, Vec<String>>,
    authors: Vec<String>,
}

impl RawEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        self.fields
            .entry(fold_key(name))
            .or_default()
            .push(value.to_string());
    }

    /// Structured author names, as opposed to a flat `author` string.
    pub fn push_author(&mut self, name: impl Into<String>) {
        let name = name.into();
        let name = name.trim();
        if !name.is_empty() {
            self.authors.push(name.to_string());
        }
    }

    pub fn has_authors(&self) -> bool {
        !self.authors.is_empty()
    }

    fn first(&self, aliases: &[&str]) -> Option<&str> {
        aliases
            .iter()
            .find_map(|alias| self.fields.get(*alias).and_then(|values| values.first()))
            .map(String::as_str)
    }

    fn all(&self, aliases: &[&str]) -> Vec<&str> {
        aliases
            .iter()
            .filter_map(|alias| self.fields.get(*alias))
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Canonical record, or the reason the entry is malformed.
    pub fn into_record(self) -> Result<BibliographicRecord, String> {
        let extra = self.all(EXTRA_FIELDS).join("\n");

        let key = self
            .first(KEY_FIELDS)
            .map(str::to_string)
            .or_else(|| {
                EXTRA_CITATION_KEY
                    .captures(&extra)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .ok_or_else(|| "entry has no key".to_string())?;

        let title = self.first(TITLE_FIELDS).map(collapse_whitespace).unwrap_or_default();

        let authors = if self.authors.is_empty() {
            self.all(AUTHOR_FIELDS)
                .into_iter()
                .flat_map(split_author_list)
                .collect()
        } else {
            self.authors.clone()
        };

        let year = self
            .all(YEAR_FIELDS)
            .into_iter()
            .find_map(parse_year);

        let mut identifiers = RecordIdentifiers {
            doi: self.first(DOI_FIELDS).map(str::to_string),
            arxiv_id: self.first(ARXIV_FIELDS).map(str::to_string),
            isbn: self
                .all(ISBN_FIELDS)
                .into_iter()
                .flat_map(|v| v.split([',', ';', ' ']))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
            pmid: self.first(PMID_FIELDS).map(str::to_string),
        };
        merge_extra_identifiers(&mut identifiers, &extra);

        let entry_type = self
            .first(TYPE_FIELDS)
            .map(EntryType::from_label)
            .unwrap_or_default();

        Ok(BibliographicRecord {
            key: key.trim().to_string(),
            title,
            authors,
            year,
            identifiers,
            url: self.first(URL_FIELDS).map(str::to_string),
            entry_type,
            container_title: self.first(CONTAINER_FIELDS).map(collapse_whitespace),
            publisher: self.first(PUBLISHER_FIELDS).map(collapse_whitespace),
            provenance: Provenance::Corpus,
        })
    }
}

/// Zotero keeps identifiers it has no column for in `extra`, one per line.
fn merge_extra_identifiers(identifiers: &mut RecordIdentifiers, extra: &str) {
    if extra.is_empty() {
        return;
    }
    if identifiers.doi.is_none() {
        identifiers.doi = extract_dois_from_text(extra).first().map(|doi| doi.normalized.clone());
    }
    if identifiers.arxiv_id.is_none() {
        identifiers.arxiv_id = extract_arxiv_ids_from_text(extra).first().map(|id| id.id.clone());
    }
    if identifiers.pmid.is_none() {
        identifiers.pmid = extract_pmid_from_text(extra).map(|pmid| pmid.id);
    }
    if identifiers.isbn.is_empty()
        && let Some(isbn) = extract_isbn_from_text(extra)
    {
        identifiers.isbn.push(isbn.isbn13);
    }
}

fn split_author_list(value: &str) -> Vec<String> {
    let parts: Vec<&str> = if value.contains(" and ") {
        value.split(" and ").collect()
    } else if value.contains(';') {
        value.split(';').collect()
    } else {
        vec![value]
    };
    parts
        .into_iter()
        .map(collapse_whitespace)
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn parse_year(value: &str) -> Option<i32> {
    YEAR.captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
