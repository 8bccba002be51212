//! Bibliography export. Only records that carry a real bibliography key are
//! written; placeholders never reach the bibliography file.

pub mod bibtex;
pub mod csl;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use bibweave_core::models::BibliographicRecord;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};
use crate::keys::is_placeholder_key;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BibFormat {
    #[default]
    Bibtex,
    CslJson,
}

impl BibFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Bibtex => "bib",
            Self::CslJson => "json",
        }
    }
}

impl fmt::Display for BibFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bibtex => write!(f, "bibtex"),
            Self::CslJson => write!(f, "csl-json"),
        }
    }
}

impl FromStr for BibFormat {
    type Err = ScienceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bibtex" | "bib" => Ok(Self::Bibtex),
            "csl-json" | "csl" | "json" => Ok(Self::CslJson),
            other => Err(ScienceError::Parse(format!("unknown bibliography format: {other}"))),
        }
    }
}

pub trait Citable {
    fn to_bibtex(&self) -> String;
    fn to_csl_item(&self) -> csl::CslItem;
}

impl Citable for BibliographicRecord {
    fn to_bibtex(&self) -> String {
        bibtex::generate_bibtex(self)
    }

    fn to_csl_item(&self) -> csl::CslItem {
        csl::record_to_csl_item(self)
    }
}

/// Records in the given order, each key once, placeholders dropped.
pub fn exportable<'a>(records: impl IntoIterator<Item = &'a BibliographicRecord>) -> Vec<&'a BibliographicRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    records
        .into_iter()
        .filter(|r| !r.key.is_empty() && !is_placeholder_key(&r.key))
        .filter(|r| seen.insert(r.key.clone()))
        .collect()
}

pub fn export<'a>(
    records: impl IntoIterator<Item = &'a BibliographicRecord>,
    format: BibFormat,
) -> Result<String> {
    let records = exportable(records);
    match format {
        BibFormat::Bibtex => Ok(records
            .iter()
            .map(|r| r.to_bibtex())
            .collect::<Vec<_>>()
            .join("\n")),
        BibFormat::CslJson => {
            let items: Vec<_> = records.iter().map(|r| r.to_csl_item()).collect();
            let mut json =
                serde_json::to_string_pretty(&items).map_err(|e| ScienceError::Parse(e.to_string()))?;
            json.push('\n');
            Ok(json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::placeholder_key;

    #[test]
    fn export_skips_placeholders_and_repeats() {
        let a = BibliographicRecord::new("doe2020", "First title");
        let b = BibliographicRecord::new(placeholder_key("https://example.com"), "Nothing");
        let c = BibliographicRecord::new("roe2019", "Second title");

        let out = export([&a, &b, &a, &c], BibFormat::Bibtex).unwrap();
        assert_eq!(out.matches("@misc{").count(), 2);
        assert!(out.find("doe2020").unwrap() < out.find("roe2019").unwrap());
        assert!(!out.contains("unresolved-"));

        let json = export([&a, &b, &c], BibFormat::CslJson).unwrap();
        let items: Vec<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn format_names() {
        assert_eq!("csl-json".parse::<BibFormat>().unwrap(), BibFormat::CslJson);
        assert_eq!("BibTeX".parse::<BibFormat>().unwrap(), BibFormat::Bibtex);
        assert!("ris".parse::<BibFormat>().is_err());
        assert_eq!(BibFormat::CslJson.to_string(), "csl-json");
    }
}
