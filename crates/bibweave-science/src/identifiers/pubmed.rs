use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

// Numeric article segment on the hosts that serve PubMed records.
static PUBMED_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:https?://)?(?:www\.)?(?:pubmed\.ncbi\.nlm\.nih\.gov/|ncbi\.nlm\.nih\.gov/pubmed/|europepmc\.org/(?:article|abstract)/med/)(\d{1,9})(?:[/?#].*)?$",
    )
    .unwrap()
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PubmedId {
    pub raw: String,
    pub id: String,
    pub url: String,
}

impl PubmedId {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let candidate = if let Some(caps) = PUBMED_URL.captures(input) {
            caps.get(1).map(|m| m.as_str()).unwrap_or_default()
        } else {
            let lowered = input.to_ascii_lowercase();
            ["pmid:", "pmid "]
                .iter()
                .find(|prefix| lowered.starts_with(*prefix))
                .map(|prefix| input[prefix.len()..].trim())
                .unwrap_or(input)
        };

        if candidate.is_empty()
            || candidate.len() > 9
            || !candidate.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ScienceError::InvalidPubmedId(input.to_string()));
        }

        let id = candidate.trim_start_matches('0').to_string();
        if id.is_empty() {
            return Err(ScienceError::InvalidPubmedId(input.to_string()));
        }
        let url = format!("https://pubmed.ncbi.nlm.nih.gov/{id}");
        Ok(Self {
            raw: input.to_string(),
            id,
            url,
        })
    }
}
