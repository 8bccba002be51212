use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BibweaveError, Result};

/// Root application configuration, loaded from `~/.config/bibweave/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub corpus: CorpusConfig,
    pub matching: MatchingConfig,
    pub synthesis: SynthesisConfig,
    pub rewrite: RewriteConfig,
    pub report: ReportConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Structured export file (CSL-JSON, Zotero JSON, RIS or BibTeX).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Paginated remote listing, used when `path` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    /// Name of the environment variable holding the remote API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// Which record wins when several corpus records share one identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Non-empty author list first, then non-empty year, then load order.
    #[default]
    MostComplete,
    FirstLoaded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub tie_break: TieBreak,
    pub fuzzy_enabled: bool,
    pub fuzzy_threshold: f64,
    /// Leading title words compared by the fuzzy fallback.
    pub fuzzy_title_words: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub concurrency: usize,
    /// Global budget for all lookups; mentions not started in time get a placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polite_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_api_key_env: Option<String>,
    pub gate: QualityGateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGateConfig {
    pub min_title_len: usize,
    pub min_year: i32,
    /// Years up to `current year + max_years_ahead` are accepted.
    pub max_years_ahead: i32,
    pub require_year: bool,
    pub require_authors: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CiteSyntax {
    /// `@key` / `[@key]`
    #[default]
    Pandoc,
    /// `\citet{key}` / `\citep{key}`
    Latex,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub syntax: CiteSyntax,
    pub rewrite_placeholders: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Unresolved citations / all citations above which the run is flagged.
    pub unresolved_threshold: f64,
    /// Below this many citations the fraction is not meaningful.
    pub min_citations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_days: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::MostComplete,
            fuzzy_enabled: true,
            fuzzy_threshold: 0.9,
            fuzzy_title_words: 4,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 15,
            max_retries: 2,
            concurrency: 4,
            deadline_secs: None,
            polite_email: None,
            semantic_scholar_api_key_env: Some("SEMANTIC_SCHOLAR_API_KEY".to_string()),
            gate: QualityGateConfig::default(),
        }
    }
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            min_title_len: 8,
            min_year: 1450,
            max_years_ahead: 1,
            require_year: true,
            require_authors: false,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            unresolved_threshold: 0.5,
            min_citations: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_days: 7,
            directory: None,
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/bibweave/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("BIBWEAVE_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("bibweave")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.matching.fuzzy_threshold) {
            return Err(BibweaveError::ConfigError(format!(
                "matching.fuzzy_threshold must be within 0..=1, got {}",
                self.matching.fuzzy_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.report.unresolved_threshold) {
            return Err(BibweaveError::ConfigError(format!(
                "report.unresolved_threshold must be within 0..=1, got {}",
                self.report.unresolved_threshold
            )));
        }
        if self.synthesis.concurrency == 0 {
            return Err(BibweaveError::ConfigError(
                "synthesis.concurrency must be at least 1".to_string(),
            ));
        }
        if self.synthesis.timeout_secs == 0 {
            return Err(BibweaveError::ConfigError(
                "synthesis.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    // ─── Derived paths ─────────────────────────────────────

    /// Directory of the on-disk enrichment cache.
    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache.directory {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("bibweave"),
        }
    }
}
