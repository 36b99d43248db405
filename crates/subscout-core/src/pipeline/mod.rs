//! Run orchestration.
//!
//! ```text
//! load history + credentials
//!   → discover (quota-gated) → merge with history and seeds
//!   → validate (worker pool, run deadline) → extract alive bodies
//!   → prioritize + aggregate → write artifacts → persist history + ledger
//! ```
//!
//! Per-URL and per-line failures are tallied into the health summary. Only a
//! failure to persist results aborts the run.

pub mod artifacts;
pub mod report;

use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use subscout_types::{
    CandidateUrl, ConfigError, CredentialSpec, DiscoveryMode, DiscoverySource, ErrorTally,
    HealthSummary, PipelineConfig, PipelineError, ProxyNode, UrlMeta,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregate::{aggregate, prioritize, SourceNodes, SourceTier};
use crate::credential::CredentialStore;
use crate::discovery::{
    CodeHostBackend, DiscoveryOutcome, DiscoveryService, SearchBackend, SerpApiBackend,
};
use crate::error::AppResult;
use crate::extract::{traffic, NodeExtractor};
use crate::history::{HistoryStore, RunDiff, RunRecord};
use crate::modules::file_utils::ensure_writable_dir;
use crate::validator::{
    BackoffPolicy, HostRateLimiter, HttpFetcher, SubscriptionFetcher, SubscriptionValidator,
    ValidationBatch,
};

use self::artifacts::Artifacts;
use self::report::UrlObservation;

/// Timeout for discovery backend requests.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-invocation inputs that are not part of the pipeline configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Where history and the credential ledger live
    pub data_dir: PathBuf,
    /// Where artifacts are written
    pub output_dir: PathBuf,
    /// Also write url_meta.json, health.json and stats_daily.json
    pub emit_health: bool,
    pub discovery_enabled: bool,
    /// Merged credential records (config < keys file < environment)
    pub credentials: Vec<CredentialSpec>,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub nodes: Vec<ProxyNode>,
    pub url_meta: BTreeMap<String, UrlMeta>,
    pub health: HealthSummary,
    pub diff: RunDiff,
    /// Every candidate with its post-run backoff state, sorted by URL
    pub candidates: Vec<CandidateUrl>,
    pub artifacts: Vec<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn SubscriptionFetcher>,
    backends: Vec<Arc<dyn SearchBackend>>,
}

/// Extraction results for the alive URLs of one run.
#[derive(Default)]
struct Harvest {
    sources: Vec<SourceNodes>,
    url_meta: BTreeMap<String, UrlMeta>,
    node_lines: usize,
    malformed_lines: usize,
    discarded_lines: usize,
}

impl Pipeline {
    /// Build the HTTP fetcher and the configured discovery backends.
    pub fn from_config(config: PipelineConfig) -> AppResult<Self> {
        let fetcher = HttpFetcher::new(
            &config.user_agent,
            Duration::from_secs(config.probe_timeout_secs),
            config.max_body_bytes,
        )?;

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(SEARCH_TIMEOUT)
            .build()?;
        let d = &config.discovery;
        let mut backends: Vec<Arc<dyn SearchBackend>> = Vec::new();
        if d.enabled {
            backends.push(Arc::new(SerpApiBackend::new(
                client.clone(),
                d.search_base_url.as_str(),
                d.results_per_query,
                d.time_range.as_str(),
                d.max_pages_per_query,
            )));
        }
        if d.code_host {
            backends.push(Arc::new(CodeHostBackend::new(
                client,
                d.code_host_base_url.as_str(),
                d.code_host_searches.clone(),
                d.per_search_limit,
                Duration::from_millis(d.request_delay_ms),
            )));
        }

        Ok(Self::with_components(config, Arc::new(fetcher), backends))
    }

    pub fn with_components(
        config: PipelineConfig,
        fetcher: Arc<dyn SubscriptionFetcher>,
        backends: Vec<Arc<dyn SearchBackend>>,
    ) -> Self {
        Self { config, fetcher, backends }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.config.utc_offset_hours * 3600)
            .ok_or_else(|| ConfigError::invalid("utc_offset_hours", "offset out of range"))
    }

    fn validator(&self) -> SubscriptionValidator {
        let c = &self.config;
        SubscriptionValidator::new(
            Arc::clone(&self.fetcher),
            BackoffPolicy::new(c.backoff_floor_secs, c.backoff_ceiling_secs, c.quarantine_threshold),
            HostRateLimiter::new(c.per_host_concurrency, Duration::from_millis(c.per_host_interval_ms)),
            c.worker_pool_size,
            Duration::from_secs(c.probe_timeout_secs),
        )
    }

    /// One complete discovery → validate → extract → dedupe run.
    pub async fn run(&self, options: &RunOptions) -> AppResult<RunReport> {
        let started = Utc::now();
        let offset = self.offset()?;
        let today = started.with_timezone(&offset).date_naive();

        ensure_writable_dir(&options.data_dir).await?;
        ensure_writable_dir(&options.output_dir).await?;

        let mut history = HistoryStore::load(&options.data_dir).await?;
        let mut ledger = CredentialStore::load(
            &options.data_dir,
            &options.credentials,
            self.config.discovery.default_quota,
            offset,
            started,
        )
        .await?;
        let rotator = Arc::new(ledger.rotator(self.config.discovery.min_searches_left));
        let mut errors = ErrorTally::default();

        let mut candidates: BTreeMap<String, CandidateUrl> =
            history.candidates().into_iter().map(|c| (c.url.clone(), c)).collect();
        for seed in self.config.seed_urls.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            candidates
                .entry(seed.to_string())
                .or_insert_with(|| CandidateUrl::new(seed, DiscoverySource::History, started));
        }

        let discovery = self.discover(options, Arc::clone(&rotator), &candidates, started, &mut errors).await;
        for candidate in &discovery.candidates {
            candidates.entry(candidate.url.clone()).or_insert_with(|| candidate.clone());
        }

        let batch = self.validate(candidates.into_values().collect(), started).await;
        for error in batch.results.iter().filter_map(|r| r.error.as_ref()) {
            errors.record(error);
        }

        let mut harvest = self.harvest(&batch, &history, offset, &mut errors);
        prioritize(&mut harvest.sources);
        let outcome = aggregate(&harvest.sources, self.config.dedup, self.config.max_nodes);
        info!(
            "Aggregated {} node(s) into {} ({} duplicate(s), {} over cap)",
            outcome.before,
            outcome.nodes.len(),
            outcome.duplicates,
            outcome.truncated
        );

        let record = RunRecord {
            candidates: batch.candidates.clone(),
            alive_urls: batch.alive().map(|r| r.url.clone()).collect(),
            node_keys: outcome.keys().cloned().collect(),
        };
        let diff = history.commit(record, today, self.config.history_days, Utc::now());

        let mut protocol_counts = BTreeMap::new();
        for node in &outcome.nodes {
            *protocol_counts.entry(node.protocol().to_string()).or_insert(0) += 1;
        }
        let classified = harvest.node_lines + harvest.malformed_lines;
        let health = HealthSummary {
            generated_at: Some(Utc::now()),
            candidates: batch.candidates.len(),
            alive: batch.alive().count(),
            dead: batch.dead_count(),
            deferred: batch.deferred.len(),
            quarantined: batch.candidates.iter().filter(|c| c.quarantined).count(),
            new_sources: diff.added_urls.len(),
            removed_sources: diff.removed_urls.len(),
            nodes_before_dedup: outcome.before,
            nodes_after_dedup: outcome.nodes.len(),
            dedup_ratio: outcome.dedup_ratio(),
            parse_ok_rate: if classified == 0 {
                1.0
            } else {
                harvest.node_lines as f64 / classified as f64
            },
            discarded_lines: harvest.discarded_lines,
            protocol_counts,
            discovery_mode: discovery.mode,
            discovery_reason: discovery.reason.clone(),
            discovered: discovery.candidates.len(),
            credentials: rotator.usage().await,
            errors,
        };

        let written = artifacts::write_all(
            &options.output_dir,
            &Artifacts {
                nodes: &outcome.nodes,
                url_meta: &harvest.url_meta,
                health: &health,
                daily: &history.snapshot().daily,
            },
            options.emit_health,
        )
        .await?;

        history.persist().await?;
        ledger.absorb(rotator.snapshot().await);
        ledger.persist().await?;

        info!(
            "Run complete: {}/{} alive, {} node(s) published, {} new / {} removed source(s)",
            health.alive,
            health.candidates,
            health.nodes_after_dedup,
            health.new_sources,
            health.removed_sources
        );

        Ok(RunReport {
            nodes: outcome.nodes,
            url_meta: harvest.url_meta,
            health,
            diff,
            candidates: batch.candidates,
            artifacts: written,
        })
    }

    async fn discover(
        &self,
        options: &RunOptions,
        rotator: Arc<crate::credential::QuotaAwareRotator>,
        known: &BTreeMap<String, CandidateUrl>,
        now: DateTime<Utc>,
        errors: &mut ErrorTally,
    ) -> DiscoveryOutcome {
        if !options.discovery_enabled || self.backends.is_empty() {
            info!("Discovery disabled; validating known URLs only");
            return DiscoveryOutcome {
                mode: DiscoveryMode::Disabled,
                reason: Some("discovery disabled".to_string()),
                ..DiscoveryOutcome::default()
            };
        }

        let d = &self.config.discovery;
        let service =
            DiscoveryService::new(self.backends.clone(), rotator, d.extra_queries.clone(), d.query_concurrency);
        if d.refresh_quotas {
            for error in service.refresh_quotas().await {
                errors.record(&error);
            }
        }

        let known: HashSet<String> = known.keys().cloned().collect();
        let outcome = service.discover(&self.config.signature, &known, now).await;
        for error in &outcome.errors {
            errors.record(error);
        }
        if outcome.mode == DiscoveryMode::HistoryOnly {
            warn!(
                "Discovery degraded to history-only: {}",
                outcome.reason.as_deref().unwrap_or("unknown")
            );
        }
        outcome
    }

    /// Probe every candidate under the run-level deadline.
    async fn validate(&self, candidates: Vec<CandidateUrl>, now: DateTime<Utc>) -> ValidationBatch {
        let cancel = CancellationToken::new();
        let deadline = Duration::from_secs(self.config.run_deadline_secs);
        let timer = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(deadline).await;
                warn!("Run deadline of {}s reached; cancelling outstanding probes", deadline.as_secs());
                cancel.cancel();
            }
        });

        let batch = self.validator().validate(candidates, now, &cancel).await;
        timer.abort();
        batch
    }

    fn harvest(
        &self,
        batch: &ValidationBatch,
        history: &HistoryStore,
        offset: FixedOffset,
        errors: &mut ErrorTally,
    ) -> Harvest {
        let extractor = NodeExtractor::new();
        let by_url: BTreeMap<&str, &CandidateUrl> =
            batch.candidates.iter().map(|c| (c.url.as_str(), c)).collect();
        let mut harvest = Harvest::default();

        for result in batch.alive() {
            let body = result.body.as_deref().unwrap_or_default();
            let extraction = extractor.extract(body, &result.url);

            harvest.node_lines += extraction.nodes.len();
            harvest.malformed_lines += extraction.malformed.len();
            harvest.discarded_lines += extraction.discarded;
            for error in &extraction.malformed {
                errors.record(error);
            }
            if extraction.is_empty() {
                errors.record(&PipelineError::ExtractionEmpty { url: result.url.clone() });
            }

            let header = result.userinfo.as_deref().map(traffic::from_userinfo_header).unwrap_or_default();
            let candidate = by_url.get(result.url.as_str());
            let source = history
                .original_source(&result.url)
                .or_else(|| candidate.map(|c| c.source))
                .unwrap_or(DiscoverySource::History);
            let first_seen = candidate.map_or(Utc::now(), |c| c.first_seen).with_timezone(&offset).date_naive();

            let meta = report::url_meta(UrlObservation {
                url: &result.url,
                source,
                latency_ms: result.latency_ms,
                protocols: extraction.protocol_counts(),
                traffic: traffic::combine(header, extraction.traffic.clone()),
                first_seen,
            });
            harvest.url_meta.insert(result.url.clone(), meta);

            let tier = if history.was_alive(&result.url) {
                SourceTier::HistoryConfirmed
            } else {
                SourceTier::New
            };
            harvest.sources.push(SourceNodes {
                url: result.url.clone(),
                tier,
                latency_ms: result.latency_ms,
                nodes: extraction.nodes,
            });
        }
        harvest
    }
}
