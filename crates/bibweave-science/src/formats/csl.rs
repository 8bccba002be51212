//! CSL-JSON items, the format pandoc and Zotero read. Struct field order is
//! the serialized order.

use bibweave_core::models::BibliographicRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CslItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<CslName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<CslDate>,
    #[serde(rename = "DOI", default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(rename = "ISBN", default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(rename = "PMID", default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub csl_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Zotero-style `Key: value` lines for identifiers CSL has no variable for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CslName {
    Structured {
        family: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        given: String,
    },
    Literal {
        literal: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CslDate {
    #[serde(rename = "date-parts")]
    pub date_parts: Vec<Vec<i32>>,
}

pub fn record_to_csl_item(record: &BibliographicRecord) -> CslItem {
    let ids = &record.identifiers;
    CslItem {
        id: record.key.clone(),
        title: record.title.clone(),
        author: record.authors.iter().filter_map(|a| csl_name(a)).collect(),
        issued: record.year.map(|year| CslDate {
            date_parts: vec![vec![year]],
        }),
        doi: ids.doi.clone(),
        isbn: ids.isbn.first().cloned(),
        pmid: ids.pmid.clone(),
        url: record.url.clone(),
        csl_type: record.entry_type.to_csl_type().to_string(),
        container_title: record.container_title.clone(),
        publisher: record.publisher.clone(),
        note: ids.arxiv_id.as_ref().map(|id| format!("arXiv: {id}")),
    }
}

fn csl_name(value: &str) -> Option<CslName> {
    let parts = split_name(value)?;
    if parts.given_names.is_empty() && parts.family.contains(char::is_whitespace) {
        return Some(CslName::Literal {
            literal: parts.family,
        });
    }
    Some(CslName::Structured {
        family: parts.family,
        given: parts.given_names.join(" "),
    })
}

#[derive(Debug, Clone)]
struct NameParts {
    family: String,
    given_names: Vec<String>,
}

/// `Family, Given` or `Given Family`. Multi-word names without a comma keep
/// everything before the last word as given names.
fn split_name(value: &str) -> Option<NameParts> {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Some((family, given)) = cleaned.split_once(',') {
        let family = family.trim();
        if family.is_empty() {
            return None;
        }
        let given_names = given
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();
        return Some(NameParts {
            family: family.to_string(),
            given_names,
        });
    }

    let tokens = cleaned.split_whitespace().collect::<Vec<_>>();
    let (family, given) = tokens.split_last()?;
    Some(NameParts {
        family: (*family).to_string(),
        given_names: given.iter().map(|t| (*t).to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use bibweave_core::models::{EntryType, RecordIdentifiers};
    use serde_json::json;

    use super::*;

    fn attention() -> BibliographicRecord {
        let mut record = BibliographicRecord::new("vaswani2017attention", "Attention Is All You Need");
        record.authors = vec![
            "Ashish Vaswani".to_string(),
            "Shazeer, Noam".to_string(),
            "Google Brain".to_string(),
        ];
        record.year = Some(2017);
        record.entry_type = EntryType::Preprint;
        record.identifiers = RecordIdentifiers {
            arxiv_id: Some("1706.03762".to_string()),
            ..Default::default()
        };
        record
    }

    #[test]
    fn serializes_csl_item() {
        let value = serde_json::to_value(record_to_csl_item(&attention())).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "vaswani2017attention",
                "title": "Attention Is All You Need",
                "author": [
                    {"family": "Vaswani", "given": "Ashish"},
                    {"family": "Shazeer", "given": "Noam"},
                    {"family": "Brain", "given": "Google"}
                ],
                "issued": {"date-parts": [[2017]]},
                "type": "article",
                "note": "arXiv: 1706.03762"
            })
        );
    }

    #[test]
    fn field_order_is_stable() {
        let text = serde_json::to_string(&record_to_csl_item(&attention())).unwrap();
        let pos = |field: &str| text.find(&format!("\"{field}\"")).unwrap();
        assert!(pos("id") < pos("title"));
        assert!(pos("title") < pos("author"));
        assert!(pos("author") < pos("issued"));
        assert!(pos("issued") < pos("type"));
    }

    #[test]
    fn single_names() {
        assert_eq!(
            csl_name("Plato"),
            Some(CslName::Structured {
                family: "Plato".into(),
                given: String::new()
            })
        );
        assert_eq!(csl_name("  "), None);
        assert_eq!(
            csl_name("World Health Organization,"),
            Some(CslName::Literal {
                literal: "World Health Organization".into()
            })
        );
    }
}
