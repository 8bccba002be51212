use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bibweave_core::config::CacheConfig;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::http::{DiskCache, RateLimitedClient, USER_AGENT};
use crate::identifiers::{ArxivId, Doi, Identifier, PubmedId};
use crate::sources::{EnrichmentSource, RawMetadata};

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";
const PAPER_FIELDS: &str = "paperId,externalIds,title,year,authors,venue,publicationTypes,url";
const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct S2PaperId(String);

impl S2PaperId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_doi(doi: &Doi) -> Self {
        Self::new(format!("DOI:{}", doi.normalized))
    }

    pub fn from_arxiv(arxiv_id: &ArxivId) -> Self {
        Self::new(format!("ARXIV:{}", arxiv_id.id))
    }

    pub fn from_pmid(pmid: &PubmedId) -> Self {
        Self::new(format!("PMID:{}", pmid.id))
    }

    pub fn from_identifier(identifier: &Identifier) -> Option<Self> {
        match identifier {
            Identifier::Doi(doi) => Some(Self::from_doi(doi)),
            Identifier::Arxiv(id) => Some(Self::from_arxiv(id)),
            Identifier::Pubmed(pmid) => Some(Self::from_pmid(pmid)),
            Identifier::Isbn(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for S2PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct S2Paper {
    pub paper_id: String,
    pub external_ids: HashMap<String, String>,
    pub title: String,
    pub year: Option<i32>,
    pub authors: Vec<String>,
    pub venue: Option<String>,
    pub publication_types: Vec<String>,
    pub url: Option<String>,
}

impl S2Paper {
    pub fn from_json(v: &Value) -> Self {
        let paper_id = v
            .get("paperId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // Values are strings except CorpusId, which is numeric.
        let external_ids = v
            .get("externalIds")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| match v {
                        Value::String(s) => Some((k.clone(), s.clone())),
                        Value::Number(n) => Some((k.clone(), n.to_string())),
                        _ => None,
                    })
                    .collect::<HashMap<_, _>>()
            })
            .unwrap_or_default();

        let title = v
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        let year = v
            .get("year")
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok());

        let authors = v
            .get("authors")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|author| author.get("name").and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let venue = v
            .get("venue")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);

        let publication_types = v
            .get("publicationTypes")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Self {
            paper_id,
            external_ids,
            title,
            year,
            authors,
            venue,
            publication_types,
            url: v.get("url").and_then(Value::as_str).map(ToOwned::to_owned),
        }
    }

    pub fn into_metadata(self) -> RawMetadata {
        let ids = &self.external_ids;
        RawMetadata {
            title: Some(self.title.clone()).filter(|t| !t.is_empty()),
            authors: self.authors,
            year: self.year,
            doi: ids.get("DOI").cloned(),
            arxiv_id: ids.get("ArXiv").cloned(),
            pmid: ids.get("PubMed").cloned(),
            url: self.url,
            entry_type: self.publication_types.into_iter().next(),
            container_title: self.venue,
            source: "semantic_scholar".to_string(),
            ..Default::default()
        }
    }
}

pub struct SemanticScholarSource {
    client: RateLimitedClient,
    cache: DiskCache,
    api_key: Option<String>,
    base_url: String,
}

impl SemanticScholarSource {
    pub fn new(api_key: Option<String>, cache: &CacheConfig) -> Result<Self> {
        let min_interval = if api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
            Duration::from_millis(100)
        } else {
            Duration::from_secs(1)
        };

        Self::with_params(
            BASE_URL,
            api_key,
            min_interval,
            DiskCache::from_config(cache, "semantic_scholar"),
        )
    }

    pub fn with_params(
        base_url: &str,
        api_key: Option<String>,
        min_interval: Duration,
        cache: DiskCache,
    ) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::new(min_interval, 1, USER_AGENT)?,
            cache,
            api_key,
            base_url: base_url.to_string(),
        })
    }

    pub async fn fetch_paper(&self, id: &S2PaperId) -> Result<Option<S2Paper>> {
        let cache_key = format!("paper:{}", id.as_str());
        if let Some(cached) = self.cache.get::<S2Paper>(&cache_key).await {
            return Ok(Some(cached));
        }

        let mut url = parse_base_url(&self.base_url)?;
        {
            let mut segs = url.path_segments_mut().map_err(|_| {
                ScienceError::Parse("invalid Semantic Scholar base URL".to_string())
            })?;
            segs.pop_if_empty();
            segs.push("paper");
            segs.push(id.as_str());
        }
        url.query_pairs_mut().append_pair("fields", PAPER_FIELDS);

        let Some(body) = self
            .client
            .get_optional(url.as_str(), self.auth_headers()?)
            .await?
        else {
            return Ok(None);
        };
        let json: Value =
            serde_json::from_str(&body).map_err(|e| ScienceError::Parse(e.to_string()))?;

        let paper = S2Paper::from_json(&json);
        self.cache.set(&cache_key, &paper).await;
        Ok(Some(paper))
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            let value =
                HeaderValue::from_str(key).map_err(|e| ScienceError::Parse(e.to_string()))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl EnrichmentSource for SemanticScholarSource {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    fn supports(&self, identifier: &Identifier) -> bool {
        S2PaperId::from_identifier(identifier).is_some()
    }

    async fn lookup(&self, identifier: &Identifier) -> Result<Option<RawMetadata>> {
        let Some(id) = S2PaperId::from_identifier(identifier) else {
            return Ok(None);
        };
        Ok(self.fetch_paper(&id).await?.map(S2Paper::into_metadata))
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    Url::parse(base_url).map_err(|e| ScienceError::Parse(format!("invalid URL {base_url}: {e}")))
}
