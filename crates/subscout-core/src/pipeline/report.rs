//! Per-URL metadata and quality scoring.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use subscout_types::{url_host, DiscoverySource, TrafficInfo, UrlMeta};

/// `round(0.6 × (100 − min(100, latency_ms / 20)) + 0.4 × (100 if nodes > 0))`
pub fn quality_score(latency_ms: Option<u64>, node_count: usize) -> u8 {
    let responsiveness = latency_ms.map_or(0.0, |ms| 100.0 - (ms as f64 / 20.0).min(100.0));
    let yield_score = if node_count > 0 { 100.0 } else { 0.0 };
    (0.6 * responsiveness + 0.4 * yield_score).round().clamp(0.0, 100.0) as u8
}

/// First 12 hex characters of SHA-256(url).
pub fn source_id(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    digest[..12].to_string()
}

/// Inputs for one alive URL's metadata record.
pub struct UrlObservation<'a> {
    pub url: &'a str,
    pub source: DiscoverySource,
    pub latency_ms: Option<u64>,
    pub protocols: BTreeMap<String, usize>,
    pub traffic: TrafficInfo,
    pub first_seen: NaiveDate,
}

pub fn url_meta(observation: UrlObservation<'_>) -> UrlMeta {
    let node_count = observation.protocols.values().sum();
    UrlMeta {
        id: source_id(observation.url),
        url: observation.url.to_string(),
        host: url_host(observation.url),
        source: observation.source,
        available: true,
        node_count,
        protocols: observation.protocols,
        latency_ms: observation.latency_ms,
        quality_score: quality_score(observation.latency_ms, node_count),
        traffic: observation.traffic,
        first_seen: observation.first_seen,
    }
}
