use serde::{Deserialize, Serialize};

use crate::models::identifiers::RecordIdentifiers;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Article,
    Book,
    Chapter,
    ConferencePaper,
    Preprint,
    Thesis,
    Report,
    Dataset,
    Software,
    WebPage,
    #[default]
    Other,
}

impl EntryType {
    /// Maps the type vocabularies used by CSL, Zotero, RIS and BibTeX exports.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "article" | "article-journal" | "journal-article" | "journalarticle" | "jour"
            | "magazine-article" | "magazinearticle" | "article-magazine" | "newspaper-article"
            | "article-newspaper" | "mgzn" | "news" => Self::Article,
            "book" | "monograph" | "edited-book" | "mvbook" | "booklet" | "ebook" => Self::Book,
            "chapter" | "book-chapter" | "booksection" | "book-section" | "inbook"
            | "incollection" | "chap" => Self::Chapter,
            "paper-conference" | "conferencepaper" | "conference-paper" | "proceedings-article"
            | "inproceedings" | "conference" | "conf" | "cpaper" => Self::ConferencePaper,
            "preprint" | "posted-content" | "unpublished" | "manuscript" => Self::Preprint,
            "thesis" | "phdthesis" | "mastersthesis" | "dissertation" | "thes" => Self::Thesis,
            "report" | "techreport" | "rprt" => Self::Report,
            "dataset" | "data" => Self::Dataset,
            "software" | "computerprogram" | "computer-program" | "comp" => Self::Software,
            "webpage" | "web-page" | "online" | "post-weblog" | "blogpost" | "elec" => {
                Self::WebPage
            }
            _ => Self::Other,
        }
    }

    pub fn to_bibtex_type(self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Book => "book",
            Self::Chapter => "incollection",
            Self::ConferencePaper => "inproceedings",
            Self::Preprint => "misc",
            Self::Thesis => "phdthesis",
            Self::Report => "techreport",
            _ => "misc",
        }
    }

    pub fn to_csl_type(self) -> &'static str {
        match self {
            Self::Article => "article-journal",
            Self::Book => "book",
            Self::Chapter => "chapter",
            Self::ConferencePaper => "paper-conference",
            Self::Preprint => "article",
            Self::Thesis => "thesis",
            Self::Report => "report",
            Self::Dataset => "dataset",
            Self::Software => "software",
            Self::WebPage => "webpage",
            Self::Other => "document",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use EntryType::*;
        let s = match self {
            Article => "article",
            Book => "book",
            Chapter => "chapter",
            ConferencePaper => "conference_paper",
            Preprint => "preprint",
            Thesis => "thesis",
            Report => "report",
            Dataset => "dataset",
            Software => "software",
            WebPage => "web_page",
            Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Where a record came from. Corpus records carry origin-assigned keys,
/// synthesized records were created from an enrichment lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Corpus,
    Synthesized(String),
}

/// Canonical bibliographic entry. Every corpus source is normalized into this
/// shape once at load time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BibliographicRecord {
    pub key: String,

    pub title: String,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default)]
    pub identifiers: RecordIdentifiers,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default)]
    pub entry_type: EntryType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(default)]
    pub provenance: Provenance,
}

impl BibliographicRecord {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn has_authors(&self) -> bool {
        self.authors.iter().any(|author| !author.trim().is_empty())
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self.provenance, Provenance::Synthesized(_))
    }

    /// Surname of the first author, for both `Family, Given` and `Given Family`.
    pub fn first_author_surname(&self) -> Option<&str> {
        let first = self.authors.iter().find(|a| !a.trim().is_empty())?;
        surname_of(first)
    }
}

pub fn surname_of(author: &str) -> Option<&str> {
    let author = author.trim();
    if author.is_empty() {
        return None;
    }
    if let Some((family, _)) = author.split_once(',') {
        let family = family.trim();
        return (!family.is_empty()).then_some(family);
    }
    author.split_whitespace().last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_type_from_label() {
        assert_eq!(EntryType::from_label("article-journal"), EntryType::Article);
        assert_eq!(EntryType::from_label("journalArticle"), EntryType::Article);
        assert_eq!(EntryType::from_label("JOUR"), EntryType::Article);
        assert_eq!(EntryType::from_label("bookSection"), EntryType::Chapter);
        assert_eq!(EntryType::from_label("inproceedings"), EntryType::ConferencePaper);
        assert_eq!(EntryType::from_label("posted-content"), EntryType::Preprint);
        assert_eq!(EntryType::from_label("something"), EntryType::Other);
    }

    #[test]
    fn test_entry_type_display() {
        assert_eq!(EntryType::Book.to_string(), "book");
        assert_eq!(EntryType::ConferencePaper.to_string(), "conference_paper");
    }

    #[test]
    fn test_first_author_surname() {
        let mut record = BibliographicRecord::new("k", "T");
        assert_eq!(record.first_author_surname(), None);

        record.authors = vec!["Vaswani, Ashish".to_string()];
        assert_eq!(record.first_author_surname(), Some("Vaswani"));

        record.authors = vec!["Ashish Vaswani".to_string()];
        assert_eq!(record.first_author_surname(), Some("Vaswani"));
    }

    #[test]
    fn test_has_authors_ignores_blank_names() {
        let mut record = BibliographicRecord::new("k", "T");
        record.authors = vec!["  ".to_string()];
        assert!(!record.has_authors());
    }
}
