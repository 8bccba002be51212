pub mod config;
pub mod error;
pub mod models;

pub use config::{
    AppConfig, CacheConfig, CiteSyntax, CorpusConfig, MatchingConfig, QualityGateConfig,
    ReportConfig, RewriteConfig, SynthesisConfig, TieBreak,
};
pub use error::{BibweaveError, ExitCode, Result};
pub use models::*;
