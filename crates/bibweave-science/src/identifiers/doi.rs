use crate::error::{Result, ScienceError};
use serde::{Deserialize, Serialize};

const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "https://www.doi.org/",
    "http://www.doi.org/",
    "doi.org/",
    "dx.doi.org/",
    "doi:",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Doi {
    pub raw: String,
    pub normalized: String,
    pub url: String,
}

impl Doi {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let lowered = input.to_ascii_lowercase();
        let stripped = DOI_PREFIXES
            .iter()
            .find(|prefix| lowered.starts_with(*prefix))
            .map(|prefix| input[prefix.len()..].trim_start())
            .unwrap_or(input);

        let decoded = urlencoding::decode(stripped)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| stripped.to_string());
        let cleaned = clean_doi_tail(&decoded);

        // Validate: must start with "10.", contain "/", and have non-empty suffix
        if !cleaned.starts_with("10.") {
            return Err(ScienceError::InvalidDoi(input.to_string()));
        }
        let slash_pos = cleaned
            .find('/')
            .ok_or_else(|| ScienceError::InvalidDoi(input.to_string()))?;
        let registrant = &cleaned[3..slash_pos];
        if registrant.is_empty() || !registrant.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(ScienceError::InvalidDoi(input.to_string()));
        }
        let suffix = &cleaned[slash_pos + 1..];
        if suffix.is_empty() || suffix.chars().any(char::is_whitespace) {
            return Err(ScienceError::InvalidDoi(input.to_string()));
        }

        let normalized = cleaned.to_lowercase();
        let url = format!("https://doi.org/{normalized}");

        Ok(Self {
            raw: input.to_string(),
            normalized,
            url,
        })
    }

    /// arXiv-registered DOIs (`10.48550/arXiv.<id>`) carry the arXiv ID.
    pub fn arxiv_suffix(&self) -> Option<&str> {
        self.normalized.strip_prefix("10.48550/arxiv.")
    }
}

/// Strips trailing sentence punctuation and unbalanced closing brackets.
fn clean_doi_tail(doi: &str) -> String {
    let mut doi = doi.trim().trim_end_matches(['.', ',', ';', ':']);
    loop {
        let before = doi.len();
        for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
            if doi.ends_with(close) && doi.matches(close).count() > doi.matches(open).count() {
                doi = doi[..doi.len() - 1].trim_end_matches(['.', ',', ';', ':']);
            }
        }
        if doi.len() == before {
            break;
        }
    }
    doi.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_doi() {
        let doi = Doi::parse("10.1000/xyz123").unwrap();
        assert_eq!(doi.normalized, "10.1000/xyz123");
        assert_eq!(doi.url, "https://doi.org/10.1000/xyz123");
    }

    #[test]
    fn doi_with_https_prefix() {
        let doi = Doi::parse("https://doi.org/10.1000/xyz123").unwrap();
        assert_eq!(doi.normalized, "10.1000/xyz123");
    }

    #[test]
    fn doi_with_doi_colon_prefix() {
        let doi = Doi::parse("doi:10.1000/xyz123").unwrap();
        assert_eq!(doi.normalized, "10.1000/xyz123");
    }

    #[test]
    fn doi_with_space_after_colon() {
        let doi = Doi::parse("DOI: 10.1000/xyz123").unwrap();
        assert_eq!(doi.normalized, "10.1000/xyz123");
    }

    #[test]
    fn doi_uppercase_normalized_to_lowercase() {
        let doi = Doi::parse("HTTPS://DOI.ORG/10.1000/XYZ123").unwrap();
        assert_eq!(doi.normalized, "10.1000/xyz123");
    }

    #[test]
    fn percent_encoded_suffix_is_decoded() {
        let doi = Doi::parse("https://doi.org/10.1002%2Fandp.19053220607").unwrap();
        assert_eq!(doi.normalized, "10.1002/andp.19053220607");
    }

    #[test]
    fn trailing_punctuation_and_unbalanced_paren_stripped() {
        let doi = Doi::parse("10.1016/0021-9681(87)90171-8).").unwrap();
        assert_eq!(doi.normalized, "10.1016/0021-9681(87)90171-8");
    }

    #[test]
    fn arxiv_doi_exposes_arxiv_suffix() {
        let doi = Doi::parse("https://doi.org/10.48550/arXiv.1706.03762").unwrap();
        assert_eq!(doi.arxiv_suffix(), Some("1706.03762"));
        assert_eq!(Doi::parse("10.1000/x").unwrap().arxiv_suffix(), None);
    }

    #[test]
    fn reject_not_a_doi() {
        assert!(Doi::parse("not-a-doi").is_err());
    }

    #[test]
    fn reject_doi_without_suffix() {
        assert!(Doi::parse("10.1000").is_err());
        assert!(Doi::parse("10.1000/").is_err());
    }

    #[test]
    fn reject_empty_string() {
        assert!(Doi::parse("").is_err());
    }

    #[test]
    fn doi_with_dx_doi_org() {
        let doi = Doi::parse("http://dx.doi.org/10.1000/xyz123").unwrap();
        assert_eq!(doi.normalized, "10.1000/xyz123");
    }
}
