//! Web search backend (SerpAPI-compatible), credentialed.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use subscout_types::{Credential, DiscoverySource, PipelineError};
use tracing::debug;

use super::backend::{signature_queries, SearchBackend, SearchPage};
use crate::credential::AccountQuota;
use crate::modules::file_utils::truncate_reason;

const BACKEND: &str = "search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    #[serde(default)]
    account_status: Option<String>,
    #[serde(default)]
    searches_per_month: Option<u32>,
    #[serde(default)]
    total_searches_left: Option<u32>,
}

pub struct SerpApiBackend {
    client: reqwest::Client,
    base_url: String,
    results_per_query: u32,
    time_range: String,
    max_pages: usize,
}

fn unavailable(message: impl std::fmt::Display) -> PipelineError {
    PipelineError::DiscoveryUnavailable {
        backend: BACKEND.to_string(),
        message: truncate_reason(&message.to_string(), 200),
    }
}

/// Map a backend error message to the taxonomy.
fn classify_error_message(message: &str, credential: &Credential) -> Option<PipelineError> {
    let lower = message.to_ascii_lowercase();
    if lower.contains("invalid api key") || lower.contains("invalid_api_key") {
        return Some(PipelineError::CredentialInvalid {
            credential: credential.masked_secret(),
            message: message.to_string(),
        });
    }
    if lower.contains("run out of searches") || lower.contains("plan searches") {
        return Some(PipelineError::CredentialExhausted { credential: credential.masked_secret() });
    }
    if lower.contains("hasn't returned any results") {
        return None;
    }
    Some(unavailable(message))
}

fn classify_status(status: StatusCode, body: &str, credential: &Credential) -> Option<PipelineError> {
    if status.is_success() {
        return None;
    }
    let message = serde_json::from_str::<SearchResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(PipelineError::CredentialInvalid {
            credential: credential.masked_secret(),
            message,
        }),
        StatusCode::TOO_MANY_REQUESTS => {
            Some(PipelineError::CredentialExhausted { credential: credential.masked_secret() })
        }
        s if s.is_server_error() => Some(unavailable(message)),
        _ => classify_error_message(&message, credential).or_else(|| Some(unavailable(message))),
    }
}

impl SerpApiBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        results_per_query: u32,
        time_range: impl Into<String>,
        max_pages: usize,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            results_per_query,
            time_range: time_range.into(),
            max_pages,
        }
    }

    async fn fetch_page(&self, link: &str) -> Option<String> {
        match self.client.get(link).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                debug!("Result page {} returned {}", link, resp.status());
                None
            }
            Err(e) => {
                debug!("Result page {} failed: {}", link, e);
                None
            }
        }
    }
}

#[async_trait]
impl SearchBackend for SerpApiBackend {
    fn source(&self) -> DiscoverySource {
        DiscoverySource::Search
    }

    fn requires_credential(&self) -> bool {
        true
    }

    fn queries(&self, signature: &str, extra: &[String]) -> Vec<String> {
        signature_queries(signature, extra)
    }

    async fn search(
        &self,
        query: &str,
        credential: Option<&Credential>,
    ) -> Result<SearchPage, PipelineError> {
        let credential = credential.ok_or(PipelineError::NoCredentialAvailable)?;
        let num = self.results_per_query.to_string();
        let resp = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("num", num.as_str()),
                ("tbs", self.time_range.as_str()),
                ("filter", "0"),
                ("api_key", credential.secret.as_str()),
            ])
            .send()
            .await
            .map_err(unavailable)?;

        let status = resp.status();
        let body = resp.text().await.map_err(unavailable)?;
        if let Some(err) = classify_status(status, &body, credential) {
            return Err(err);
        }

        let parsed: SearchResponse = serde_json::from_str(&body).map_err(unavailable)?;
        if let Some(message) = parsed.error.as_deref() {
            if let Some(err) = classify_error_message(message, credential) {
                return Err(err);
            }
        }

        let mut page = SearchPage { cost: 1, ..SearchPage::default() };
        for result in parsed.organic_results {
            page.texts.extend(result.title);
            page.texts.extend(result.snippet);
            if let Some(link) = result.link {
                page.texts.push(link.clone());
                page.links.push(link);
            }
        }
        for link in page.links.clone().iter().take(self.max_pages) {
            if let Some(text) = self.fetch_page(link).await {
                page.texts.push(text);
            }
        }
        debug!(query, results = page.links.len(), "Web search completed");
        Ok(page)
    }

    async fn account_quota(
        &self,
        credential: &Credential,
    ) -> Result<Option<AccountQuota>, PipelineError> {
        let resp = self
            .client
            .get(format!("{}/account", self.base_url))
            .query(&[("api_key", credential.secret.as_str())])
            .send()
            .await
            .map_err(unavailable)?;

        let status = resp.status();
        let body = resp.text().await.map_err(unavailable)?;
        if let Some(err) = classify_status(status, &body, credential) {
            return Err(err);
        }
        let account: AccountResponse = serde_json::from_str(&body).map_err(unavailable)?;
        Ok(account.total_searches_left.map(|left| AccountQuota {
            searches_left: left,
            searches_per_month: account.searches_per_month.unwrap_or(0),
            active: account.account_status.as_deref().map_or(true, |s| s.eq_ignore_ascii_case("active")),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use subscout_types::CredentialStatus;

    fn credential() -> Credential {
        Credential {
            id: "id".into(),
            secret: "abcdef123456".into(),
            searches_used: 0,
            searches_quota: 100,
            reset_at: Utc::now(),
            status: CredentialStatus::Active,
            registered_on: None,
            last_error: None,
        }
    }

    #[test]
    fn test_error_messages_classified() {
        let c = credential();
        assert!(matches!(
            classify_error_message("Invalid API key. Your API key should be here", &c),
            Some(PipelineError::CredentialInvalid { .. })
        ));
        assert!(matches!(
            classify_error_message("Your account has run out of searches.", &c),
            Some(PipelineError::CredentialExhausted { .. })
        ));
        assert!(classify_error_message("Google hasn't returned any results for this query.", &c).is_none());
    }

    #[test]
    fn test_status_classified() {
        let c = credential();
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "{}", &c),
            Some(PipelineError::CredentialInvalid { .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "", &c),
            Some(PipelineError::CredentialExhausted { .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "", &c),
            Some(PipelineError::DiscoveryUnavailable { .. })
        ));
        assert!(classify_status(StatusCode::OK, "", &c).is_none());
    }
}
