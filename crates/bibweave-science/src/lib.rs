//! bibweave resolver: identifiers, corpus loading and indexing, matching,
//! quality-gated synthesis, document rewriting, bibliography export and
//! reporting.

pub mod arxiv;
pub mod corpus;
pub mod dedup;
pub mod document;
pub mod error;
pub mod formats;
pub mod http;
pub mod identifiers;
pub mod keys;
pub mod matcher;
pub mod pipeline;
pub mod report;
pub mod sources;
pub mod synthesis;

pub use corpus::{CorpusIndex, CorpusLoad, CorpusSource, load_corpus};
pub use document::{Document, Rewriter};
pub use error::{CorpusError, DocumentError, Result, ScienceError};
pub use formats::BibFormat;
pub use identifiers::{IdentifierSet, extract_identifiers};
pub use matcher::{Matcher, Resolution};
pub use pipeline::{Pipeline, ResolveOutput};
pub use report::MatchReport;
pub use synthesis::{QualityGate, Synthesizer};
