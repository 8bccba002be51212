use std::time::Duration;

use async_trait::async_trait;
use bibweave_core::config::CacheConfig;

use crate::arxiv::parser::parse_atom_response;
use crate::arxiv::types::ArxivMetadata;
use crate::error::Result;
use crate::http::{DiskCache, RateLimitedClient, USER_AGENT};
use crate::identifiers::{Identifier, arxiv::ArxivId};
use crate::sources::{EnrichmentSource, RawMetadata};

const BASE_URL: &str = "https://export.arxiv.org/api/query";

pub struct ArxivClient {
    client: RateLimitedClient,
    cache: DiskCache,
    base_url: String,
}

impl ArxivClient {
    pub fn new(cache: &CacheConfig) -> Result<Self> {
        // arXiv asks for at most one request every three seconds.
        Self::with_params(
            BASE_URL,
            Duration::from_secs(3),
            DiskCache::from_config(cache, "arxiv"),
        )
    }

    pub fn with_params(base_url: &str, min_interval: Duration, cache: DiskCache) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::new(min_interval, 1, USER_AGENT)?,
            cache,
            base_url: base_url.to_string(),
        })
    }

    pub async fn fetch_metadata(&self, id: &ArxivId) -> Result<Option<ArxivMetadata>> {
        let key = format!("metadata:{}", id.normalized());
        if let Some(cached) = self.cache.get::<ArxivMetadata>(&key).await {
            return Ok(Some(cached));
        }

        let url = if self.base_url.contains('?') {
            format!("{}&id_list={}", self.base_url, id.id)
        } else {
            format!("{}?id_list={}", self.base_url, id.id)
        };

        let xml = self.client.get(&url).await?;
        let Some(metadata) = parse_atom_response(&xml)?.into_iter().next() else {
            return Ok(None);
        };

        self.cache.set(&key, &metadata).await;
        Ok(Some(metadata))
    }
}

#[async_trait]
impl EnrichmentSource for ArxivClient {
    fn name(&self) -> &str {
        "arxiv"
    }

    fn supports(&self, identifier: &Identifier) -> bool {
        matches!(identifier, Identifier::Arxiv(_))
    }

    async fn lookup(&self, identifier: &Identifier) -> Result<Option<RawMetadata>> {
        let Identifier::Arxiv(id) = identifier else {
            return Ok(None);
        };
        Ok(self
            .fetch_metadata(id)
            .await?
            .map(ArxivMetadata::into_metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_arxiv_client_fetch_metadata() {
        let mut server = Server::new_async().await;
        let base_url = server.url();

        let _m = server
            .mock("GET", "/query?id_list=1706.03762")
            .with_status(200)
            .with_header("content-type", "application/atom+xml")
            .with_body(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v5</id>
    <updated>2023-08-02T03:09:44Z</updated>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All You Need</title>
    <summary>Abstract</summary>
    <author><name>Ashish Vaswani</name></author>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CL"/>
    <category term="cs.CL"/>
  </entry>
</feed>"#,
            )
            .create_async()
            .await;

        let client = ArxivClient::with_params(
            &format!("{}/query", base_url),
            Duration::from_secs(0),
            DiskCache::disabled(),
        )
        .unwrap();
        let id = Identifier::Arxiv(ArxivId::parse("1706.03762v2").unwrap());
        let metadata = client.lookup(&id).await.unwrap().unwrap();

        assert_eq!(metadata.title.as_deref(), Some("Attention Is All You Need"));
        assert_eq!(metadata.year, Some(2017));
        assert_eq!(metadata.arxiv_id.as_deref(), Some("1706.03762"));
        assert_eq!(metadata.authors, vec!["Ashish Vaswani"]);
    }

    #[tokio::test]
    async fn empty_feed_is_not_found() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/query?id_list=2401.99999")
            .with_status(200)
            .with_body(r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>ArXiv Query</title></feed>"#)
            .create_async()
            .await;

        let client = ArxivClient::with_params(
            &format!("{}/query", server.url()),
            Duration::ZERO,
            DiskCache::disabled(),
        )
        .unwrap();
        let id = ArxivId::parse("2401.99999").unwrap();
        assert!(client.fetch_metadata(&id).await.unwrap().is_none());
    }
}
