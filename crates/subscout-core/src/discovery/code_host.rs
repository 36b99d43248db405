//! Code-host search backend: scans issue and code search result pages.
//! Uncredentialed, so it bypasses the rotator.

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use std::sync::OnceLock;
use std::time::Duration;
use subscout_types::{Credential, DiscoverySource, PipelineError};
use tracing::debug;

use super::backend::{SearchBackend, SearchPage};

const BACKEND: &str = "code-host";

static ISSUE_LINK_REGEX: OnceLock<Regex> = OnceLock::new();

fn issue_link_regex() -> &'static Regex {
    ISSUE_LINK_REGEX.get_or_init(|| {
        Regex::new(r#"href="(/[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+/issues/\d+)""#)
            .expect("Issue link regex is valid")
    })
}

/// Distinct issue paths linked from a search results page, in page order.
pub fn issue_links(html: &str, limit: usize) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for cap in issue_link_regex().captures_iter(html) {
        let link = cap[1].to_string();
        if !links.contains(&link) {
            links.push(link);
        }
        if links.len() >= limit {
            break;
        }
    }
    links
}

pub struct CodeHostBackend {
    client: reqwest::Client,
    base_url: String,
    searches: Vec<String>,
    per_search_limit: usize,
    request_delay: Duration,
}

impl CodeHostBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        searches: Vec<String>,
        per_search_limit: usize,
        request_delay: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            searches,
            per_search_limit,
            request_delay,
        }
    }

    fn absolute(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn fetch(&self, path: &str) -> Result<String, PipelineError> {
        let url = self.absolute(path);
        let resp = self.client.get(&url).send().await.map_err(|e| {
            PipelineError::DiscoveryUnavailable { backend: BACKEND.into(), message: e.to_string() }
        })?;
        match resp.status() {
            s if s.is_success() => resp.text().await.map_err(|e| {
                PipelineError::DiscoveryUnavailable { backend: BACKEND.into(), message: e.to_string() }
            }),
            StatusCode::TOO_MANY_REQUESTS => Err(PipelineError::DiscoveryUnavailable {
                backend: BACKEND.into(),
                message: format!("rate limited on {}", url),
            }),
            s => Err(PipelineError::DiscoveryUnavailable {
                backend: BACKEND.into(),
                message: format!("HTTP {} on {}", s.as_u16(), url),
            }),
        }
    }
}

#[async_trait]
impl SearchBackend for CodeHostBackend {
    fn source(&self) -> DiscoverySource {
        DiscoverySource::CodeHost
    }

    fn requires_credential(&self) -> bool {
        false
    }

    fn queries(&self, _signature: &str, _extra: &[String]) -> Vec<String> {
        self.searches.clone()
    }

    async fn search(
        &self,
        query: &str,
        _credential: Option<&Credential>,
    ) -> Result<SearchPage, PipelineError> {
        let html = self.fetch(query).await?;
        let links = issue_links(&html, self.per_search_limit);
        let mut page = SearchPage { texts: vec![html], links: Vec::new(), cost: 0 };

        for link in links {
            tokio::time::sleep(self.request_delay).await;
            match self.fetch(&link).await {
                Ok(text) => page.texts.push(text),
                Err(e) => debug!("Skipping issue page {}: {}", link, e),
            }
            page.links.push(self.absolute(&link));
        }
        debug!(query, pages = page.texts.len(), "Code-host search completed");
        Ok(page)
    }
}
