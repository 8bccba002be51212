//! Structural view of a Markdown-flavoured document: just enough inline
//! structure to find links and citations while keeping every byte.

pub mod mentions;
mod parser;
pub mod rewrite;

use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, Result};

pub use mentions::{Classification, classify, scan_mentions};
pub use rewrite::{RewriteStats, Rewriter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inline {
    Text(Text),
    Code(Code),
    CodeBlock(CodeBlock),
    Link(Link),
    Citation(Citation),
    Image(Image),
}

impl Inline {
    /// The exact input bytes this node was parsed from.
    pub fn source(&self) -> &str {
        match self {
            Inline::Text(n) => &n.source,
            Inline::Code(n) => &n.source,
            Inline::CodeBlock(n) => &n.source,
            Inline::Link(n) => &n.source,
            Inline::Citation(n) => &n.source,
            Inline::Image(n) => &n.source,
        }
    }

    /// Byte offset of the node in the parsed input.
    pub fn offset(&self) -> usize {
        match self {
            Inline::Text(n) => n.offset,
            Inline::Code(n) => n.offset,
            Inline::CodeBlock(n) => n.offset,
            Inline::Link(n) => n.offset,
            Inline::Citation(n) => n.offset,
            Inline::Image(n) => n.offset,
        }
    }
}

pub type Inlines = Vec<Inline>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub source: String,
    pub offset: usize,
}

/// Inline code span, backticks included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub source: String,
    pub offset: usize,
}

/// Fenced block from the opening fence through the closing fence line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub source: String,
    pub offset: usize,
    pub info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    pub offset: usize,
    /// Raw text between the brackets.
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CitationSyntax {
    /// `@key`
    PandocInText,
    /// `[@key]`, `[see @a; @b, p. 3]`
    PandocBracketed,
    /// `\citet{key}`
    LatexInText,
    /// `\citep{key}`, `\cite{key}`
    LatexParenthetical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub offset: usize,
    pub keys: Vec<String>,
    pub syntax: CitationSyntax,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub source: String,
    pub offset: usize,
    pub alt: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    nodes: Inlines,
}

impl Document {
    /// Fails only on an unterminated fenced code block.
    pub fn parse(source: &str) -> Result<Self> {
        Ok(Self {
            nodes: parser::parse(source)?,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let source = std::str::from_utf8(bytes)
            .map_err(|e| DocumentError::InvalidUtf8(e.valid_up_to()))?;
        Self::parse(source)
    }

    pub(crate) fn from_nodes(nodes: Inlines) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Inline] {
        &self.nodes
    }

    /// Concatenated node sources. An untouched document renders to its input.
    pub fn render(&self) -> String {
        self.nodes.iter().map(Inline::source).collect()
    }

    /// Links outside code, in document order.
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.nodes.iter().filter_map(|node| match node {
            Inline::Link(link) => Some(link),
            _ => None,
        })
    }

    pub fn citations(&self) -> impl Iterator<Item = &Citation> {
        self.nodes.iter().filter_map(|node| match node {
            Inline::Citation(citation) => Some(citation),
            _ => None,
        })
    }

    /// Links plus citations. Rewriting never changes this number.
    pub fn reference_count(&self) -> usize {
        self.links().count() + self.citations().count()
    }
}

/// Byte offset → 1-based line and character column.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            line_starts,
        }
    }

    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = self.line_starts.partition_point(|start| *start <= offset).max(1);
        let start = self.line_starts[line - 1];
        let column = self
            .source
            .get(start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or_default();
        (line, column + 1)
    }
}
