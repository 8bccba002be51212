use std::time::Duration;

use async_trait::async_trait;
use bibweave_core::config::CacheConfig;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::http::{DiskCache, RateLimitedClient, USER_AGENT};
use crate::identifiers::{Doi, Identifier};
use crate::sources::{EnrichmentSource, RawMetadata};

const BASE_URL: &str = "https://api.crossref.org";

pub struct CrossRefSource {
    client: RateLimitedClient,
    cache: DiskCache,
    base_url: String,
}

impl CrossRefSource {
    pub fn new(polite_email: Option<String>, cache: &CacheConfig) -> Result<Self> {
        Self::with_params(
            BASE_URL,
            Duration::from_millis(100),
            polite_email,
            DiskCache::from_config(cache, "crossref"),
        )
    }

    pub fn with_params(
        base_url: &str,
        min_interval: Duration,
        polite_email: Option<String>,
        cache: DiskCache,
    ) -> Result<Self> {
        // Polite pool: CrossRef routes requests carrying a mailto to faster servers.
        let user_agent = match &polite_email {
            Some(email) => format!("{USER_AGENT} (mailto:{email})"),
            None => USER_AGENT.to_string(),
        };

        Ok(Self {
            client: RateLimitedClient::new(min_interval, 1, &user_agent)?,
            cache,
            base_url: base_url.to_string(),
        })
    }

    pub async fn fetch_by_doi(&self, doi: &Doi) -> Result<Option<CrossRefWork>> {
        let key = format!("doi:{}", doi.normalized);
        if let Some(cached) = self.cache.get::<CrossRefWork>(&key).await {
            return Ok(Some(cached));
        }

        let url = format!("{}/works/{}", self.base_url, doi.normalized);
        let Some(body) = self.client.get_optional(&url, HeaderMap::new()).await? else {
            return Ok(None);
        };
        let val: Value =
            serde_json::from_str(&body).map_err(|e| ScienceError::Parse(e.to_string()))?;

        let work = CrossRefWork::from_json(&val["message"])?;
        self.cache.set(&key, &work).await;

        Ok(Some(work))
    }
}

#[async_trait]
impl EnrichmentSource for CrossRefSource {
    fn name(&self) -> &str {
        "crossref"
    }

    fn supports(&self, identifier: &Identifier) -> bool {
        matches!(identifier, Identifier::Doi(_))
    }

    async fn lookup(&self, identifier: &Identifier) -> Result<Option<RawMetadata>> {
        let Identifier::Doi(doi) = identifier else {
            return Ok(None);
        };
        Ok(self.fetch_by_doi(doi).await?.map(CrossRefWork::into_metadata))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossRefWork {
    pub doi: String,
    pub title: Vec<String>,
    pub subtitle: Vec<String>,
    pub author: Vec<CrossRefAuthor>,
    pub published_year: Option<i32>,
    pub work_type: Option<String>,
    pub container_title: Vec<String>,
    pub publisher: Option<String>,
    pub isbn: Vec<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossRefAuthor {
    pub given: Option<String>,
    pub family: Option<String>,
    pub name: Option<String>,
}

fn strings(v: &Value) -> Vec<String> {
    v.as_array()
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl CrossRefWork {
    pub fn from_json(v: &Value) -> Result<Self> {
        let doi = v["DOI"]
            .as_str()
            .ok_or_else(|| ScienceError::Parse("Missing DOI in CrossRef response".to_string()))?
            .to_string();

        let author = v["author"]
            .as_array()
            .map(|a| a.iter().map(CrossRefAuthor::from_json).collect())
            .unwrap_or_default();

        Ok(Self {
            doi,
            title: strings(&v["title"]),
            subtitle: strings(&v["subtitle"]),
            author,
            published_year: parse_year(v),
            work_type: v["type"].as_str().map(str::to_string),
            container_title: strings(&v["container-title"]),
            publisher: v["publisher"].as_str().map(str::to_string),
            isbn: strings(&v["ISBN"]),
            url: v["URL"].as_str().map(str::to_string),
        })
    }

    pub fn into_metadata(self) -> RawMetadata {
        let title = self.title.first().map(|main| match self.subtitle.first() {
            Some(sub) => format!("{main}: {sub}"),
            None => main.clone(),
        });
        RawMetadata {
            title,
            authors: self
                .author
                .iter()
                .filter_map(CrossRefAuthor::display_name)
                .collect(),
            year: self.published_year,
            doi: Some(self.doi),
            isbn: self.isbn.into_iter().next(),
            url: self.url,
            entry_type: self.work_type,
            container_title: self.container_title.into_iter().next(),
            publisher: self.publisher,
            source: "crossref".to_string(),
            ..Default::default()
        }
    }
}

impl CrossRefAuthor {
    fn from_json(v: &Value) -> Self {
        Self {
            given: v["given"].as_str().map(|s| s.to_string()),
            family: v["family"].as_str().map(|s| s.to_string()),
            name: v["name"].as_str().map(|s| s.to_string()),
        }
    }

    /// `Family, Given`, or the organisation name.
    fn display_name(&self) -> Option<String> {
        match (&self.family, &self.given) {
            (Some(f), Some(g)) => Some(format!("{f}, {g}")),
            (Some(f), None) => Some(f.clone()),
            (None, Some(g)) => Some(g.clone()),
            (None, None) => self.name.clone(),
        }
    }
}

fn parse_year(v: &Value) -> Option<i32> {
    // CrossRef date parts: "published-print": {"date-parts": [[2017, 6, 12]]}
    v["published-print"]["date-parts"][0][0]
        .as_i64()
        .or_else(|| v["published-online"]["date-parts"][0][0].as_i64())
        .or_else(|| v["issued"]["date-parts"][0][0].as_i64())
        .or_else(|| v["created"]["date-parts"][0][0].as_i64())
        .map(|n| n as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn source(base_url: &str) -> CrossRefSource {
        CrossRefSource::with_params(base_url, Duration::ZERO, None, DiskCache::disabled()).unwrap()
    }

    #[tokio::test]
    async fn test_crossref_fetch_by_doi() {
        let mut server = Server::new_async().await;

        let _m = server
            .mock("GET", "/works/10.1038/nature14539")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                "status": "ok",
                "message": {
                    "DOI": "10.1038/nature14539",
                    "title": ["Human-level control through deep reinforcement learning"],
                    "author": [
                        {"given": "Volodymyr", "family": "Mnih"},
                        {"given": "Koray", "family": "Kavukcuoglu"}
                    ],
                    "published-print": {"date-parts": [[2015, 2, 26]]},
                    "type": "journal-article",
                    "container-title": ["Nature"],
                    "publisher": "Springer Science and Business Media LLC"
                }
            }"#,
            )
            .create_async()
            .await;

        let source = source(&server.url());
        let doi = Doi::parse("10.1038/nature14539").unwrap();
        let metadata = source
            .lookup(&Identifier::Doi(doi))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            metadata.title.as_deref(),
            Some("Human-level control through deep reinforcement learning")
        );
        assert_eq!(metadata.authors, vec!["Mnih, Volodymyr", "Kavukcuoglu, Koray"]);
        assert_eq!(metadata.year, Some(2015));
        assert_eq!(metadata.entry_type.as_deref(), Some("journal-article"));
        assert_eq!(metadata.container_title.as_deref(), Some("Nature"));
        assert_eq!(metadata.source, "crossref");
    }

    #[tokio::test]
    async fn unknown_doi_is_not_found() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/works/10.1000/nope")
            .with_status(404)
            .with_body("Resource not found.")
            .create_async()
            .await;

        let doi = Doi::parse("10.1000/nope").unwrap();
        assert!(source(&server.url()).fetch_by_doi(&doi).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn found_works_are_cached() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/works/10.1000/cached")
            .with_status(200)
            .with_body(r#"{"message": {"DOI": "10.1000/cached", "title": ["Cached work"]}}"#)
            .expect(1)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let source = CrossRefSource::with_params(
            &server.url(),
            Duration::ZERO,
            Some("me@example.org".into()),
            DiskCache::in_dir(tmp.path(), "crossref", Duration::from_secs(60)),
        )
        .unwrap();
        let doi = Doi::parse("10.1000/cached").unwrap();
        source.fetch_by_doi(&doi).await.unwrap();
        let again = source.fetch_by_doi(&doi).await.unwrap().unwrap();
        assert_eq!(again.title, vec!["Cached work"]);
        m.assert_async().await;
    }
}
