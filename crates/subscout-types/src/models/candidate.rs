//! Candidate subscription URLs and probe results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a candidate URL was first found.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoverySource {
    /// Web search backend
    Search,
    /// Code-host search
    CodeHost,
    /// Carried over from a previous run or configured as a seed
    History,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoverySource::Search => write!(f, "search"),
            DiscoverySource::CodeHost => write!(f, "code-host"),
            DiscoverySource::History => write!(f, "history"),
        }
    }
}

/// Diagnostic class of a failed probe. All kinds share one backoff transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeFailureKind {
    Timeout,
    ConnectionRefused,
    HttpError,
}

impl fmt::Display for ProbeFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailureKind::Timeout => write!(f, "timeout"),
            ProbeFailureKind::ConnectionRefused => write!(f, "connection-refused"),
            ProbeFailureKind::HttpError => write!(f, "http-error"),
        }
    }
}

/// A discovered or historically known subscription endpoint.
///
/// Records are never deleted. Once `quarantined` is set the URL is never
/// probed again but stays in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateUrl {
    /// Normalized endpoint, also the identity of the record
    pub url: String,
    /// Discovery source tag
    pub source: DiscoverySource,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub last_probe: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    /// Consecutive failed probes since the last success
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Backoff state: not probed before this instant
    #[serde(default)]
    pub next_eligible_probe: Option<DateTime<Utc>>,
    /// Current backoff interval in seconds
    #[serde(default)]
    pub backoff_secs: u64,
    #[serde(default)]
    pub last_failure: Option<ProbeFailureKind>,
    #[serde(default)]
    pub last_latency_ms: Option<u64>,
    #[serde(default)]
    pub quarantined: bool,
}

impl CandidateUrl {
    pub fn new(url: impl Into<String>, source: DiscoverySource, now: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            source,
            first_seen: now,
            last_seen: now,
            last_probe: None,
            last_success: None,
            consecutive_failures: 0,
            next_eligible_probe: None,
            backoff_secs: 0,
            last_failure: None,
            last_latency_ms: None,
            quarantined: false,
        }
    }

    /// Eligible when not quarantined and the backoff window has elapsed.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        !self.quarantined && self.next_eligible_probe.map_or(true, |t| now >= t)
    }

    /// Host part of the URL, lower-cased, used for per-host rate limiting.
    pub fn host(&self) -> String {
        url_host(&self.url)
    }
}

/// Extract the lower-cased host of an http(s) URL without a full parse.
pub fn url_host(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = if host_port.starts_with('[') {
        host_port.split_once(']').map_or(host_port, |(h, _)| h).trim_start_matches('[')
    } else {
        host_port.split(':').next().unwrap_or_default()
    };
    host.to_ascii_lowercase()
}

/// Probe outcome for one URL in one run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "kind", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Alive,
    Dead(ProbeFailureKind),
}

impl ProbeOutcome {
    pub fn is_alive(&self) -> bool {
        matches!(self, ProbeOutcome::Alive)
    }
}

/// Result of probing one candidate. Produced and consumed within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub url: String,
    pub outcome: ProbeOutcome,
    pub http_status: Option<u16>,
    pub latency_ms: Option<u64>,
    /// Raw body, present only when alive
    pub body: Option<Vec<u8>>,
    /// `subscription-userinfo` header, when the panel sends one
    pub userinfo: Option<String>,
    pub error: Option<crate::error::PipelineError>,
    /// Status or body suggested provider-side rate limiting
    pub rate_limited: bool,
}
