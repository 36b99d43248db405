//! Report artifacts consumed by external renderers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::candidate::DiscoverySource;
use super::credential::CredentialUsage;
use crate::error::PipelineError;

/// Maximum number of recent error messages kept in the tally.
const RECENT_ERRORS_LIMIT: usize = 50;

/// Traffic metadata advertised by a subscription (all values in GB).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TrafficInfo {
    pub total_gb: Option<f64>,
    pub used_gb: Option<f64>,
    pub remaining_gb: Option<f64>,
    pub expire_date: Option<NaiveDate>,
}

impl TrafficInfo {
    /// Derive whichever of total/used/remaining is missing from the other two.
    pub fn fill_missing(&mut self) {
        match (self.total_gb, self.used_gb, self.remaining_gb) {
            (Some(t), Some(u), None) => self.remaining_gb = Some((t - u).max(0.0)),
            (Some(t), None, Some(r)) => self.used_gb = Some((t - r).max(0.0)),
            (None, Some(u), Some(r)) => self.total_gb = Some(u + r),
            _ => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_gb.is_none()
            && self.used_gb.is_none()
            && self.remaining_gb.is_none()
            && self.expire_date.is_none()
    }
}

/// Per-URL metadata record written to `url_meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UrlMeta {
    /// First 12 hex characters of SHA-256(url)
    pub id: String,
    pub url: String,
    pub host: String,
    pub source: DiscoverySource,
    pub available: bool,
    pub node_count: usize,
    pub protocols: BTreeMap<String, usize>,
    pub latency_ms: Option<u64>,
    pub quality_score: u8,
    #[serde(default)]
    pub traffic: TrafficInfo,
    pub first_seen: NaiveDate,
}

/// How discovery behaved in a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMode {
    /// Discovery ran (possibly partially)
    #[default]
    Full,
    /// Discovery was skipped for credential or backend reasons
    HistoryOnly,
    /// Discovery was disabled by configuration
    Disabled,
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryMode::Full => write!(f, "full"),
            DiscoveryMode::HistoryOnly => write!(f, "history-only"),
            DiscoveryMode::Disabled => write!(f, "disabled"),
        }
    }
}

/// Per-kind counters of recoverable errors plus a bounded list of recent messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorTally {
    pub counts: BTreeMap<String, u64>,
    pub recent: Vec<String>,
}

impl ErrorTally {
    pub fn record(&mut self, error: &PipelineError) {
        *self.counts.entry(error.kind().to_string()).or_insert(0) += 1;
        if self.recent.len() < RECENT_ERRORS_LIMIT {
            self.recent.push(error.to_string());
        }
    }

    /// Count a kind without keeping a message (high-volume per-line errors).
    pub fn bump(&mut self, kind: &str, by: u64) {
        if by > 0 {
            *self.counts.entry(kind.to_string()).or_insert(0) += by;
        }
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.counts.get(kind).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: ErrorTally) {
        for (kind, n) in other.counts {
            *self.counts.entry(kind).or_insert(0) += n;
        }
        let room = RECENT_ERRORS_LIMIT.saturating_sub(self.recent.len());
        self.recent.extend(other.recent.into_iter().take(room));
    }
}

/// Health/status summary written to `health.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HealthSummary {
    pub generated_at: Option<DateTime<Utc>>,
    pub candidates: usize,
    pub alive: usize,
    pub dead: usize,
    /// Inside their backoff window, not probed this run
    pub deferred: usize,
    pub quarantined: usize,
    pub new_sources: usize,
    pub removed_sources: usize,
    pub nodes_before_dedup: usize,
    pub nodes_after_dedup: usize,
    pub dedup_ratio: f64,
    /// Share of classified node lines that canonicalized successfully
    pub parse_ok_rate: f64,
    pub discarded_lines: usize,
    pub protocol_counts: BTreeMap<String, usize>,
    pub discovery_mode: DiscoveryMode,
    pub discovery_reason: Option<String>,
    pub discovered: usize,
    pub credentials: Vec<CredentialUsage>,
    pub errors: ErrorTally,
}
