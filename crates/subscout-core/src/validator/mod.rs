//! Subscription probing with bounded concurrency.
//!
//! Every eligible candidate first waits for a slot on its host, then for a
//! slot in the worker pool of fixed size. Only the timed fetch holds a pool
//! slot, so a busy host never starves the others. A run-level
//! [`CancellationToken`] cuts outstanding probes short and records them as
//! timeouts.

mod backoff;
mod fetcher;
mod host_limiter;

#[cfg(test)]
mod tests;

pub use backoff::BackoffPolicy;
pub use fetcher::{FetchResponse, HttpFetcher, SubscriptionFetcher};
pub use host_limiter::HostRateLimiter;

use chrono::{DateTime, Utc};
use futures::future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use subscout_types::{CandidateUrl, PipelineError, ProbeOutcome, ValidationResult};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const RATE_LIMIT_STATUSES: [u16; 4] = [403, 429, 503, 509];
const RATE_LIMIT_HINTS: [&str; 3] = ["rate limit", "too many requests", "请求过于频繁"];

/// Outcome of validating one batch of candidates.
#[derive(Debug, Clone, Default)]
pub struct ValidationBatch {
    /// One result per probed URL, sorted by URL
    pub results: Vec<ValidationResult>,
    /// Every input candidate with its updated backoff state
    pub candidates: Vec<CandidateUrl>,
    /// Inside their backoff window; not probed
    pub deferred: Vec<String>,
    /// Quarantined; not probed
    pub quarantined: Vec<String>,
}

impl ValidationBatch {
    pub fn alive(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.outcome.is_alive())
    }

    pub fn dead_count(&self) -> usize {
        self.results.len() - self.alive().count()
    }
}

pub struct SubscriptionValidator {
    fetcher: Arc<dyn SubscriptionFetcher>,
    policy: BackoffPolicy,
    limiter: HostRateLimiter,
    pool: Semaphore,
    worker_pool_size: usize,
    probe_timeout: Duration,
}

fn failed(url: &str, error: PipelineError, latency_ms: Option<u64>) -> ValidationResult {
    let kind = error.probe_failure_kind().unwrap_or(subscout_types::ProbeFailureKind::HttpError);
    ValidationResult {
        url: url.to_string(),
        outcome: ProbeOutcome::Dead(kind),
        http_status: match &error {
            PipelineError::ProbeHttpError { status, .. } => Some(*status),
            _ => None,
        },
        latency_ms,
        body: None,
        userinfo: None,
        error: Some(error),
        rate_limited: false,
    }
}

fn looks_rate_limited(status: u16, body: &[u8]) -> bool {
    if RATE_LIMIT_STATUSES.contains(&status) {
        return true;
    }
    if status == 200 {
        return false;
    }
    let head = String::from_utf8_lossy(&body[..body.len().min(512)]).to_lowercase();
    RATE_LIMIT_HINTS.iter().any(|h| head.contains(h))
}

impl SubscriptionValidator {
    pub fn new(
        fetcher: Arc<dyn SubscriptionFetcher>,
        policy: BackoffPolicy,
        limiter: HostRateLimiter,
        worker_pool_size: usize,
        probe_timeout: Duration,
    ) -> Self {
        let worker_pool_size = worker_pool_size.max(1);
        Self {
            fetcher,
            policy,
            limiter,
            pool: Semaphore::new(worker_pool_size),
            worker_pool_size,
            probe_timeout,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Probe one URL. Never fails; every failure becomes a dead result.
    ///
    /// The per-request timeout covers the fetch only. Waiting for a host or
    /// pool slot is bounded by the run deadline.
    pub async fn probe(&self, url: &str, host: &str, cancel: &CancellationToken) -> ValidationResult {
        let timeout_error = || PipelineError::ProbeTimeout {
            url: url.to_string(),
            timeout_secs: self.probe_timeout.as_secs(),
        };

        let attempt = async {
            let _host = self.limiter.acquire(host).await;
            let _worker = self.pool.acquire().await.ok();
            let started = Instant::now();
            let response = tokio::time::timeout(self.probe_timeout, self.fetcher.fetch(url)).await;
            (response, started.elapsed().as_millis() as u64)
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(url, "Probe cancelled by run deadline");
                failed(url, timeout_error(), None)
            }
            (response, latency_ms) = attempt => match response {
                Err(_) => failed(url, timeout_error(), Some(latency_ms)),
                Ok(Err(e)) => failed(url, e, Some(latency_ms)),
                Ok(Ok(resp)) => {
                    let rate_limited = looks_rate_limited(resp.status, &resp.body);
                    let has_body = resp.body.iter().any(|b| !b.is_ascii_whitespace());
                    if resp.status == 200 && has_body {
                        ValidationResult {
                            url: url.to_string(),
                            outcome: ProbeOutcome::Alive,
                            http_status: Some(resp.status),
                            latency_ms: Some(latency_ms),
                            body: Some(resp.body),
                            userinfo: resp.userinfo,
                            error: None,
                            rate_limited,
                        }
                    } else {
                        let mut result = failed(
                            url,
                            PipelineError::ProbeHttpError { url: url.to_string(), status: resp.status },
                            Some(latency_ms),
                        );
                        result.rate_limited = rate_limited;
                        result
                    }
                }
            }
        }
    }

    /// Probe every eligible candidate and apply the backoff transition.
    pub async fn validate(
        &self,
        candidates: Vec<CandidateUrl>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> ValidationBatch {
        let mut batch = ValidationBatch::default();
        let mut eligible = Vec::new();
        for candidate in candidates {
            if candidate.quarantined {
                batch.quarantined.push(candidate.url.clone());
                batch.candidates.push(candidate);
            } else if !candidate.is_eligible(now) {
                batch.deferred.push(candidate.url.clone());
                batch.candidates.push(candidate);
            } else {
                eligible.push(candidate);
            }
        }

        info!(
            "Probing {} candidate(s) with {} worker(s); {} deferred, {} quarantined",
            eligible.len(),
            self.worker_pool_size,
            batch.deferred.len(),
            batch.quarantined.len()
        );

        let probed: Vec<(CandidateUrl, ValidationResult)> =
            future::join_all(eligible.into_iter().map(|candidate| async move {
                let result = self.probe(&candidate.url, &candidate.host(), cancel).await;
                (candidate, result)
            }))
            .await;

        for (mut candidate, result) in probed {
            match result.outcome {
                ProbeOutcome::Alive => {
                    self.policy.on_success(&mut candidate, now, result.latency_ms.unwrap_or(0));
                }
                ProbeOutcome::Dead(kind) => {
                    self.policy.on_failure(&mut candidate, now, kind);
                    if candidate.quarantined {
                        info!(url = %candidate.url, "Quarantined after {} failures", candidate.consecutive_failures);
                    }
                }
            }
            batch.candidates.push(candidate);
            batch.results.push(result);
        }
        batch.results.sort_by(|a, b| a.url.cmp(&b.url));
        batch.candidates.sort_by(|a, b| a.url.cmp(&b.url));
        batch
    }
}
