use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use subscout_types::PipelineError;

use crate::error::AppResult;

/// A completed HTTP exchange with a subscription endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// `subscription-userinfo` header, if present
    pub userinfo: Option<String>,
}

/// Transport seam for probes.
#[async_trait]
pub trait SubscriptionFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, PipelineError>;
}

/// reqwest-backed fetcher with a per-request timeout and a body size cap.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Panels often serve self-signed certificates, so validation is relaxed
    /// for probes only. Search backends use their own client.
    pub fn new(user_agent: &str, timeout: Duration, max_body_bytes: usize) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(timeout)
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client, timeout, max_body_bytes })
    }

    fn map_error(&self, url: &str, e: &reqwest::Error) -> PipelineError {
        if e.is_timeout() {
            PipelineError::ProbeTimeout { url: url.to_string(), timeout_secs: self.timeout.as_secs() }
        } else {
            PipelineError::ProbeConnectionError { url: url.to_string(), message: e.to_string() }
        }
    }
}

#[async_trait]
impl SubscriptionFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, PipelineError> {
        let resp = self.client.get(url).send().await.map_err(|e| self.map_error(url, &e))?;
        let status = resp.status().as_u16();
        let userinfo = resp
            .headers()
            .get("subscription-userinfo")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_error(url, &e))?;
            let room = self.max_body_bytes.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= self.max_body_bytes {
                tracing::debug!("Body of {} truncated at {} bytes", url, self.max_body_bytes);
                break;
            }
        }
        Ok(FetchResponse { status, body, userinfo })
    }
}
