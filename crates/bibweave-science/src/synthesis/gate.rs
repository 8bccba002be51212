use std::fmt;

use bibweave_core::config::QualityGateConfig;
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::sources::RawMetadata;

/// Titles that enrichment services and reference managers emit when they
/// know nothing about the page.
const GENERIC_TITLE_PREFIXES: &[&str] = &[
    "web page by",
    "webpage by",
    "added from url",
    "untitled",
    "page not found",
    "404",
    "access denied",
    "just a moment",
    "attention required",
    "redirecting",
    "sign in",
    "log in",
];

const GENERIC_TITLES: &[&str] = &[
    "pdf",
    "home",
    "homepage",
    "home page",
    "document",
    "article",
    "book",
    "index",
    "not found",
    "error",
    "no title",
];

// Bare host names and paths such as `example.com/some/page`.
static DOMAIN_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}(?:[/:?#]\S*)?$").unwrap()
});

// Web-capture labels: `Snapshot`, `Snapshot: …`, `Full text of …`. Not
// `Snapshot Ensembles`.
static CAPTURE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:snapshot|full text)(?:\s*$|\s*:|\s+of\s)").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateViolation {
    MissingTitle,
    TitleTooShort { len: usize, min: usize },
    TitleIsUrl,
    GenericTitle(String),
    TitleEllipsis,
    YearOutOfRange { year: i32, min: i32, max: i32 },
    MissingYear,
    MissingAuthors,
}

impl fmt::Display for GateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTitle => write!(f, "missing title"),
            Self::TitleTooShort { len, min } => {
                write!(f, "title too short ({len} < {min} characters)")
            }
            Self::TitleIsUrl => write!(f, "title is a URL"),
            Self::GenericTitle(title) => write!(f, "generic placeholder title \"{title}\""),
            Self::TitleEllipsis => write!(f, "title is truncated (ellipsis)"),
            Self::YearOutOfRange { year, min, max } => {
                write!(f, "year {year} outside {min}..={max}")
            }
            Self::MissingYear => write!(f, "missing year"),
            Self::MissingAuthors => write!(f, "missing authors"),
        }
    }
}

/// Joins violations into the reason string carried by a rejected mention.
pub fn describe(violations: &[GateViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Blocks obviously corrupt enrichment results. Never edits the metadata.
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: QualityGateConfig,
    current_year: i32,
}

impl QualityGate {
    pub fn new(config: QualityGateConfig) -> Self {
        Self::with_current_year(config, chrono::Utc::now().year())
    }

    pub fn with_current_year(config: QualityGateConfig, current_year: i32) -> Self {
        Self {
            config,
            current_year,
        }
    }

    pub fn max_year(&self) -> i32 {
        self.current_year + self.config.max_years_ahead
    }

    /// Every rule that fails, in a fixed order; empty means accepted.
    pub fn violations(&self, metadata: &RawMetadata) -> Vec<GateViolation> {
        let mut out = Vec::new();

        match metadata.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            None => out.push(GateViolation::MissingTitle),
            Some(title) => out.extend(self.title_violations(title)),
        }

        match metadata.year {
            Some(year) if year < self.config.min_year || year > self.max_year() => {
                out.push(GateViolation::YearOutOfRange {
                    year,
                    min: self.config.min_year,
                    max: self.max_year(),
                });
            }
            Some(_) => {}
            None if self.config.require_year => out.push(GateViolation::MissingYear),
            None => {}
        }

        if self.config.require_authors && !metadata.authors.iter().any(|a| !a.trim().is_empty()) {
            out.push(GateViolation::MissingAuthors);
        }

        out
    }

    pub fn check(&self, metadata: &RawMetadata) -> std::result::Result<(), Vec<GateViolation>> {
        let violations = self.violations(metadata);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    fn title_violations(&self, title: &str) -> Vec<GateViolation> {
        let mut out = Vec::new();
        let lower = title.to_lowercase();

        let len = title.chars().count();
        if len < self.config.min_title_len {
            out.push(GateViolation::TitleTooShort {
                len,
                min: self.config.min_title_len,
            });
        }

        if is_url_like(&lower) {
            out.push(GateViolation::TitleIsUrl);
        }

        let generic = GENERIC_TITLE_PREFIXES
            .iter()
            .any(|prefix| lower.starts_with(prefix))
            || CAPTURE_LABEL.is_match(lower.trim())
            || GENERIC_TITLES.contains(&lower.trim_end_matches('.'));
        if generic {
            out.push(GateViolation::GenericTitle(title.to_string()));
        }

        if title.contains('…') || title.contains("...") {
            out.push(GateViolation::TitleEllipsis);
        }

        out
    }
}

fn is_url_like(lower: &str) -> bool {
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("www.")
        || lower.starts_with("doi.org/")
        || (!lower.contains(char::is_whitespace) && DOMAIN_LIKE.is_match(lower))
}
