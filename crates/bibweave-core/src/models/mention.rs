use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MentionKind {
    /// Display text carries an author + year signature.
    Citation,
    /// Any other link. Never matched, never rewritten.
    PlainLink,
}

impl std::fmt::Display for MentionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Citation => write!(f, "citation"),
            Self::PlainLink => write!(f, "plain-link"),
        }
    }
}

/// How the mention reads in running text, e.g. `Smith et al. (2020)` is
/// in-text while `Smith, 2020` is parenthetical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CitationForm {
    InText,
    #[default]
    Parenthetical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPosition {
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
    /// Byte offset of the mention markup in the source.
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorYearHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    /// Words of the display text that are neither author nor year.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub title_words: Vec<String>,
}

impl AuthorYearHint {
    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.year.is_none()
    }
}

/// One citation-like link found in a document. Lives for one extraction pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionRecord {
    /// Position of the mention in document order, starting at 0.
    pub ordinal: usize,
    pub display_text: String,
    pub url: String,
    #[serde(default)]
    pub hint: AuthorYearHint,
    pub position: DocumentPosition,
    pub kind: MentionKind,
    #[serde(default)]
    pub form: CitationForm,
}

impl MentionRecord {
    pub fn is_citation(&self) -> bool {
        self.kind == MentionKind::Citation
    }
}
