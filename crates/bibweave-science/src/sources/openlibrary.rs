use std::time::Duration;

use async_trait::async_trait;
use bibweave_core::config::CacheConfig;
use reqwest::Url;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ScienceError};
use crate::http::{DiskCache, RateLimitedClient, USER_AGENT};
use crate::identifiers::{Identifier, Isbn};
use crate::sources::{EnrichmentSource, RawMetadata};

const BASE_URL: &str = "https://openlibrary.org";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenLibraryWork {
    pub title: String,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub publishers: Vec<String>,
    pub publish_date: Option<String>,
    pub url: Option<String>,
}

fn names(v: &Value, field: &str) -> Vec<String> {
    v.get(field)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    item.get("name")
                        .and_then(Value::as_str)
                        .or_else(|| item.as_str())
                })
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
}

impl OpenLibraryWork {
    /// Parses one `jscmd=data` book entry.
    pub fn from_json(v: &Value) -> Self {
        let title = v
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        let subtitle = v
            .get("subtitle")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);

        let publish_date = v
            .get("publish_date")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        let url = v
            .get("url")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .or_else(|| {
                v.get("key")
                    .and_then(Value::as_str)
                    .map(|key| format!("{BASE_URL}{key}"))
            });

        Self {
            title,
            subtitle,
            authors: names(v, "authors"),
            publishers: names(v, "publishers"),
            publish_date,
            url,
        }
    }

    pub fn into_metadata(self, isbn: &Isbn) -> RawMetadata {
        let title = match self.subtitle {
            Some(sub) if !self.title.is_empty() => format!("{}: {sub}", self.title),
            _ => self.title,
        };
        RawMetadata {
            title: Some(title).filter(|t| !t.is_empty()),
            authors: self.authors,
            year: self
                .publish_date
                .as_deref()
                .and_then(parse_year_from_date_string),
            isbn: Some(isbn.isbn13.clone()),
            url: self.url,
            entry_type: Some("book".to_string()),
            publisher: self.publishers.into_iter().next(),
            source: "openlibrary".to_string(),
            ..Default::default()
        }
    }
}

pub struct OpenLibrarySource {
    client: RateLimitedClient,
    cache: DiskCache,
    base_url: String,
}

impl OpenLibrarySource {
    pub fn new(cache: &CacheConfig) -> Result<Self> {
        Self::with_params(
            BASE_URL,
            Duration::from_millis(500),
            DiskCache::from_config(cache, "openlibrary"),
        )
    }

    pub fn with_params(base_url: &str, min_interval: Duration, cache: DiskCache) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::new(min_interval, 1, USER_AGENT)?,
            cache,
            base_url: base_url.to_string(),
        })
    }

    pub async fn fetch_by_isbn(&self, isbn: &Isbn) -> Result<Option<OpenLibraryWork>> {
        let cache_key = format!("isbn:{}", isbn.isbn13);
        if let Some(cached) = self.cache.get::<OpenLibraryWork>(&cache_key).await {
            return Ok(Some(cached));
        }

        let mut url = parse_base_url(&self.base_url)?;
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| ScienceError::Parse("invalid Open Library base URL".to_string()))?;
            segs.pop_if_empty();
            segs.push("api");
            segs.push("books");
        }
        let bibkey = format!("ISBN:{}", isbn.isbn13);
        url.query_pairs_mut()
            .append_pair("bibkeys", &bibkey)
            .append_pair("format", "json")
            .append_pair("jscmd", "data");

        let Some(body) = self.client.get_optional(url.as_str(), HeaderMap::new()).await? else {
            return Ok(None);
        };
        let json: Value =
            serde_json::from_str(&body).map_err(|e| ScienceError::Parse(e.to_string()))?;

        // Unknown ISBNs come back as `{}`.
        let Some(raw_work) = json.get(&bibkey) else {
            return Ok(None);
        };

        let work = OpenLibraryWork::from_json(raw_work);
        self.cache.set(&cache_key, &work).await;
        Ok(Some(work))
    }
}

#[async_trait]
impl EnrichmentSource for OpenLibrarySource {
    fn name(&self) -> &str {
        "openlibrary"
    }

    fn supports(&self, identifier: &Identifier) -> bool {
        matches!(identifier, Identifier::Isbn(_))
    }

    async fn lookup(&self, identifier: &Identifier) -> Result<Option<RawMetadata>> {
        let Identifier::Isbn(isbn) = identifier else {
            return Ok(None);
        };
        Ok(self
            .fetch_by_isbn(isbn)
            .await?
            .map(|work| work.into_metadata(isbn)))
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    Url::parse(base_url).map_err(|e| ScienceError::Parse(format!("invalid URL {base_url}: {e}")))
}

fn parse_year_from_date_string(input: &str) -> Option<i32> {
    input.chars().collect::<Vec<_>>().windows(4).find_map(|w| {
        let candidate = w.iter().collect::<String>();
        if candidate.chars().all(|c| c.is_ascii_digit()) {
            candidate.parse::<i32>().ok()
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_books_api_entry() {
        let doc = json!({
            "url": "https://openlibrary.org/books/OL1M/structured-computer-organization",
            "title": "Structured Computer Organization",
            "authors": [{"name": "Andrew S. Tanenbaum", "url": "..."}],
            "publishers": [{"name": "Prentice Hall"}],
            "publish_date": "March 1999"
        });

        let work = OpenLibraryWork::from_json(&doc);
        let isbn = Isbn::parse("0137670109").unwrap();
        let metadata = work.into_metadata(&isbn);
        assert_eq!(metadata.title.as_deref(), Some("Structured Computer Organization"));
        assert_eq!(metadata.authors, vec!["Andrew S. Tanenbaum"]);
        assert_eq!(metadata.year, Some(1999));
        assert_eq!(metadata.publisher.as_deref(), Some("Prentice Hall"));
        assert_eq!(metadata.isbn.as_deref(), Some("9780137670109"));
    }

    #[test]
    fn year_from_free_form_dates() {
        assert_eq!(parse_year_from_date_string("1999"), Some(1999));
        assert_eq!(parse_year_from_date_string("Jan 12, 2004"), Some(2004));
        assert_eq!(parse_year_from_date_string("n.d."), None);
    }

    #[tokio::test]
    async fn empty_response_is_not_found() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/books")
            .match_query(Matcher::UrlEncoded("bibkeys".into(), "ISBN:9780137670109".into()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let source =
            OpenLibrarySource::with_params(&server.url(), Duration::ZERO, DiskCache::disabled())
                .unwrap();
        let isbn = Isbn::parse("0-13-767010-9").unwrap();
        assert!(source.fetch_by_isbn(&isbn).await.unwrap().is_none());
    }
}
