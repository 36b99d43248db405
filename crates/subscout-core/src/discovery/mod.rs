//! URL discovery through external search surfaces.
//!
//! Credentialed backends are charged through the [`QuotaAwareRotator`]. Once
//! the rotator runs dry, or a backend reports itself unavailable, that backend
//! becomes a no-op for the rest of the run; validation of known URLs goes on.

mod backend;
mod code_host;
mod normalize;
mod serpapi;


pub use backend::{signature_queries, SearchBackend, SearchPage};
pub use code_host::{issue_links, CodeHostBackend};
pub use normalize::{extract_subscription_urls, html_unescape, normalize_subscribe_url};
pub use serpapi::SerpApiBackend;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use subscout_types::{
    CandidateUrl, CredentialStatus, DiscoveryMode, DiscoverySource, PipelineError,
};
use tracing::{debug, info, warn};

use crate::credential::QuotaAwareRotator;

/// Result of one discovery cycle.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// New candidates, not previously known, sorted by URL
    pub candidates: Vec<CandidateUrl>,
    pub mode: DiscoveryMode,
    pub reason: Option<String>,
    pub errors: Vec<PipelineError>,
    pub queries_run: usize,
    pub per_source: BTreeMap<DiscoverySource, usize>,
}

struct QueryResult {
    backend_idx: usize,
    query_idx: usize,
    page: Option<SearchPage>,
    errors: Vec<PipelineError>,
}

pub struct DiscoveryService {
    backends: Vec<Arc<dyn SearchBackend>>,
    rotator: Arc<QuotaAwareRotator>,
    extra_queries: Vec<String>,
    concurrency: usize,
}

impl DiscoveryService {
    pub fn new(
        backends: Vec<Arc<dyn SearchBackend>>,
        rotator: Arc<QuotaAwareRotator>,
        extra_queries: Vec<String>,
        concurrency: usize,
    ) -> Self {
        Self { backends, rotator, extra_queries, concurrency: concurrency.max(1) }
    }

    /// Pull current quotas from backends that expose an account endpoint.
    pub async fn refresh_quotas(&self) -> Vec<PipelineError> {
        let mut errors = Vec::new();
        for backend in self.backends.iter().filter(|b| b.requires_credential()) {
            for credential in self.rotator.snapshot().await {
                if credential.status == CredentialStatus::Invalid {
                    continue;
                }
                match backend.account_quota(&credential).await {
                    Ok(Some(quota)) => self.rotator.apply_account_quota(&credential.id, quota).await,
                    Ok(None) => {}
                    Err(e) => {
                        if e.should_retire_credential() {
                            self.rotator.record_failure(&credential, &e).await;
                        }
                        debug!("Quota refresh failed for {}: {}", credential.masked_secret(), e);
                        errors.push(e);
                    }
                }
            }
        }
        errors
    }

    async fn run_query(
        &self,
        backend_idx: usize,
        query_idx: usize,
        query: String,
        halted: &[AtomicBool],
    ) -> QueryResult {
        let backend = &self.backends[backend_idx];
        let mut result = QueryResult { backend_idx, query_idx, page: None, errors: Vec::new() };
        if halted[backend_idx].load(Ordering::Acquire) {
            return result;
        }

        if !backend.requires_credential() {
            match backend.search(&query, None).await {
                Ok(page) => result.page = Some(page),
                Err(e) => {
                    warn!("{} query failed: {}", backend.source(), e);
                    result.errors.push(e);
                }
            }
            return result;
        }

        loop {
            let credential = match self.rotator.acquire_credential().await {
                Ok(c) => c,
                Err(e) => {
                    halted[backend_idx].store(true, Ordering::Release);
                    result.errors.push(e);
                    return result;
                }
            };
            match backend.search(&query, Some(&credential)).await {
                Ok(page) => {
                    self.rotator.record_usage(&credential, page.cost).await;
                    result.page = Some(page);
                    return result;
                }
                Err(e) if e.should_retire_credential() => {
                    // Retry the same query with the next credential.
                    self.rotator.record_failure(&credential, &e).await;
                    result.errors.push(e);
                }
                Err(e) => {
                    self.rotator.record_failure(&credential, &e).await;
                    warn!("{} backend unavailable, skipping remaining queries: {}", backend.source(), e);
                    halted[backend_idx].store(true, Ordering::Release);
                    result.errors.push(e);
                    return result;
                }
            }
        }
    }

    /// Find candidate URLs matching `signature` that are not already in
    /// `known` (history) or in this cycle's result set.
    pub async fn discover(
        &self,
        signature: &str,
        known: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> DiscoveryOutcome {
        let mut outcome = DiscoveryOutcome::default();

        let gate = if self.backends.iter().any(|b| b.requires_credential()) {
            self.rotator.discovery_gate().await
        } else {
            Ok(())
        };
        if let Err(e) = &gate {
            warn!("Web search skipped: {}", e);
            outcome.errors.push(e.clone());
        }

        let mut jobs = Vec::new();
        for (backend_idx, backend) in self.backends.iter().enumerate() {
            if backend.requires_credential() && gate.is_err() {
                continue;
            }
            for (query_idx, query) in
                backend.queries(signature, &self.extra_queries).into_iter().enumerate()
            {
                jobs.push((backend_idx, query_idx, query));
            }
        }

        let halted: Vec<AtomicBool> = self.backends.iter().map(|_| AtomicBool::new(false)).collect();
        let mut results: Vec<QueryResult> = stream::iter(jobs)
            .map(|(b, q, query)| self.run_query(b, q, query, &halted))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|r| (r.backend_idx, r.query_idx));

        let mut seen: HashSet<String> = HashSet::new();
        for result in results {
            outcome.errors.extend(result.errors);
            let Some(page) = result.page else { continue };
            outcome.queries_run += 1;
            let source = self.backends[result.backend_idx].source();
            for text in page.texts.iter().chain(page.links.iter()) {
                for url in extract_subscription_urls(text, signature) {
                    if known.contains(&url) || !seen.insert(url.clone()) {
                        continue;
                    }
                    *outcome.per_source.entry(source).or_insert(0) += 1;
                    outcome.candidates.push(CandidateUrl::new(url, source, now));
                }
            }
        }
        outcome.candidates.sort_by(|a, b| a.url.cmp(&b.url));

        if outcome.queries_run == 0 {
            outcome.mode = DiscoveryMode::HistoryOnly;
            outcome.reason = Some(
                outcome
                    .errors
                    .first()
                    .map_or_else(|| "no discovery backend configured".to_string(), |e| e.to_string()),
            );
        } else if let Some(first) = outcome.errors.first() {
            outcome.reason = Some(format!("partial: {}", first));
        }
        info!(
            "Discovery finished: {} new candidate(s) from {} quer(ies), mode {}",
            outcome.candidates.len(),
            outcome.queries_run,
            outcome.mode
        );
        outcome
    }
}
