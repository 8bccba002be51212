use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::corpus::ParsedEntries;
use crate::corpus::json::{json_items, parse_json_items};
use crate::error::{CorpusError, Result, ScienceError};
use crate::http::{RateLimitedClient, USER_AGENT};

const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 1_000;

/// Paginated JSON listing in the Zotero web API shape: `start`/`limit` query
/// parameters, a bare array (or `{"items": [...]}`) per page.
pub struct RemoteCorpus {
    client: RateLimitedClient,
    base_url: String,
    api_key: Option<String>,
    page_size: usize,
}

impl RemoteCorpus {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        Self::with_params(base_url, api_key, Duration::from_millis(250), PAGE_SIZE)
    }

    pub fn with_params(
        base_url: &str,
        api_key: Option<String>,
        min_interval: Duration,
        page_size: usize,
    ) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::new(min_interval, 3, USER_AGENT)?,
            base_url: base_url.to_string(),
            api_key,
            page_size: page_size.max(1),
        })
    }

    fn page_url(&self, start: usize) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}format=json&start={start}&limit={}",
            self.base_url, self.page_size
        )
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = self
            .api_key
            .as_deref()
            .and_then(|key| HeaderValue::from_str(&format!("Bearer {key}")).ok())
        {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    pub async fn fetch(&self) -> Result<ParsedEntries> {
        let mut parsed = ParsedEntries::default();
        let mut start = 0usize;

        for page in 0..MAX_PAGES {
            let url = self.page_url(start);
            let body: Value = self
                .client
                .get_json_with_headers(&url, self.headers())
                .await
                .map_err(|e| self.remote_error(e))?;
            let items = json_items(body).ok_or_else(|| CorpusError::Remote {
                url: self.base_url.clone(),
                message: format!("page {page} is not a list of records"),
            })?;

            let count = items.len();
            let mut page_entries = parse_json_items(&items);
            for skipped in &mut page_entries.skipped {
                skipped.position += start;
            }
            parsed.records.append(&mut page_entries.records);
            parsed.skipped.append(&mut page_entries.skipped);
            tracing::debug!(page, count, "fetched corpus page");

            if count < self.page_size {
                break;
            }
            start += count;
        }

        Ok(parsed)
    }

    fn remote_error(&self, error: ScienceError) -> ScienceError {
        match error {
            ScienceError::Corpus(e) => ScienceError::Corpus(e),
            other => CorpusError::Remote {
                url: self.base_url.clone(),
                message: other.to_string(),
            }
            .into(),
        }
    }
}
