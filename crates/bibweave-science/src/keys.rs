//! Bibliography keys this crate is allowed to invent: cite keys for
//! synthesized records and placeholder keys for unresolved mentions.

use std::collections::HashSet;

use bibweave_core::models::BibliographicRecord;
use sha2::{Digest, Sha256};

pub const PLACEHOLDER_PREFIX: &str = "unresolved-";

const SKIPPED_TITLE_WORDS: &[&str] = &["a", "an", "the", "on", "of", "in", "for", "to", "and"];

/// `unresolved-<8 hex>` from the SHA-256 of the mention's normalized URL.
/// Stable across runs and machines.
pub fn placeholder_key(normalized_url: &str) -> String {
    let digest = Sha256::digest(normalized_url.as_bytes());
    let hex: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("{PLACEHOLDER_PREFIX}{hex}")
}

pub fn is_placeholder_key(key: &str) -> bool {
    key.strip_prefix(PLACEHOLDER_PREFIX)
        .is_some_and(|hex| hex.len() == 8 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

fn ascii_token(word: &str) -> String {
    word.chars()
        .flat_map(char::to_lowercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// `surname + year + first significant title word`, e.g. `vaswani2017attention`.
pub fn base_cite_key(record: &BibliographicRecord) -> String {
    let author = record
        .first_author_surname()
        .map(ascii_token)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "anon".to_string());

    let year = record
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "nd".to_string());

    let title_word = record
        .title
        .split_whitespace()
        .map(ascii_token)
        .find(|w| !w.is_empty() && !SKIPPED_TITLE_WORDS.contains(&w.as_str()))
        .unwrap_or_default();

    format!("{author}{year}{title_word}")
}

fn suffix(mut n: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'a' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// Hands out cite keys that collide with nothing already taken. Allocation
/// order decides which duplicate gets `a`, `b`, ...; callers allocate in
/// mention order.
#[derive(Debug, Default)]
pub struct KeyAllocator {
    taken: HashSet<String>,
}

impl KeyAllocator {
    pub fn new<'a>(existing: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            taken: existing.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn allocate(&mut self, record: &BibliographicRecord) -> String {
        let base = base_cite_key(record);
        let mut key = base.clone();
        let mut n = 0;
        while self.taken.contains(&key) {
            key = format!("{base}{}", suffix(n));
            n += 1;
        }
        self.taken.insert(key.clone());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(author: &str, year: Option<i32>, title: &str) -> BibliographicRecord {
        let mut record = BibliographicRecord::new("", title);
        if !author.is_empty() {
            record.authors = vec![author.to_string()];
        }
        record.year = year;
        record
    }

    #[test]
    fn placeholder_keys_are_stable() {
        let a = placeholder_key("https://example.com/x");
        assert_eq!(a, placeholder_key("https://example.com/x"));
        assert_ne!(a, placeholder_key("https://example.com/y"));
        assert!(is_placeholder_key(&a));
        assert_eq!(a.len(), PLACEHOLDER_PREFIX.len() + 8);
        assert!(!is_placeholder_key("unresolved-xyz"));
    }

    #[test]
    fn cite_key_shape() {
        let r = record("Vaswani, Ashish", Some(2017), "Attention Is All You Need");
        assert_eq!(base_cite_key(&r), "vaswani2017attention");

        let r = record("", None, "The Art of Computer Programming");
        assert_eq!(base_cite_key(&r), "anonndart");
    }

    #[test]
    fn collisions_get_letter_suffixes_in_allocation_order() {
        let mut keys = KeyAllocator::new(["smith2020deep"]);
        let r = record("John Smith", Some(2020), "Deep things");
        assert_eq!(keys.allocate(&r), "smith2020deepa");
        assert_eq!(keys.allocate(&r), "smith2020deepb");

        let other = record("Jones", Some(2021), "Other");
        assert_eq!(keys.allocate(&other), "jones2021other");
    }

    #[test]
    fn suffix_sequence() {
        assert_eq!(suffix(0), "a");
        assert_eq!(suffix(25), "z");
        assert_eq!(suffix(26), "aa");
        assert_eq!(suffix(27), "ab");
    }
}
