use serde::{Deserialize, Serialize};

/// Stable identifiers attached to a bibliographic record, stored as they
/// arrived from the source. Normalization happens when the index is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIdentifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub isbn: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
}

impl RecordIdentifiers {
    pub fn is_empty(&self) -> bool {
        self.doi.is_none() && self.arxiv_id.is_none() && self.isbn.is_empty() && self.pmid.is_none()
    }

    /// Number of identifier slots that are filled.
    pub fn count(&self) -> usize {
        usize::from(self.doi.is_some())
            + usize::from(self.arxiv_id.is_some())
            + usize::from(!self.isbn.is_empty())
            + usize::from(self.pmid.is_some())
    }
}
