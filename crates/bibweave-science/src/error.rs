use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid arXiv ID: {0}")]
    InvalidArxivId(String),

    #[error("invalid ISBN: {0}")]
    InvalidIsbn(String),

    #[error("invalid PubMed ID: {0}")]
    InvalidPubmedId(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Core(#[from] bibweave_core::BibweaveError),
}

impl ScienceError {
    /// Errors worth retrying: network failures, timeouts, rate limits, 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimit(..) | Self::Timeout(_) => true,
            Self::ApiError(_, message) => message.starts_with("HTTP 5"),
            _ => false,
        }
    }
}

/// Fatal corpus failures. Individual malformed entries are skipped, not raised.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus source not found: {0}")]
    NotFound(PathBuf),

    #[error("corpus source is empty: {0}")]
    Empty(String),

    #[error("no usable records in corpus {source_name} ({skipped} entries skipped)")]
    NoUsableRecords { source_name: String, skipped: usize },

    #[error("unsupported corpus format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to read corpus {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to fetch remote corpus {url}: {message}")]
    Remote { url: String, message: String },
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document is not valid UTF-8 (byte {0})")]
    InvalidUtf8(usize),

    #[error("unterminated code fence opened at line {0}")]
    UnterminatedFence(usize),
}

pub type Result<T> = std::result::Result<T, ScienceError>;
