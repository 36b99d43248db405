//! Deduplicator/Aggregator.
//!
//! Sources are processed in priority order; the first occurrence of each
//! canonical key wins and later duplicates are dropped. A node cap truncates
//! the lowest-priority tail.

use serde::Serialize;
use std::collections::HashSet;
use subscout_types::{CanonicalKey, ProxyNode};

/// Priority tier of a reachable source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceTier {
    /// Known before this run and alive on its previous probe
    HistoryConfirmed,
    /// Discovered this run, or not alive last time
    New,
}

/// Nodes extracted from one reachable subscription.
#[derive(Debug, Clone)]
pub struct SourceNodes {
    pub url: String,
    pub tier: SourceTier,
    pub latency_ms: Option<u64>,
    pub nodes: Vec<ProxyNode>,
}

#[derive(Debug, Clone, Default)]
pub struct AggregateOutcome {
    /// Final ordered node list
    pub nodes: Vec<ProxyNode>,
    /// Node count across all sources before deduplication
    pub before: usize,
    /// Nodes dropped as duplicates
    pub duplicates: usize,
    /// Nodes dropped by the cap
    pub truncated: usize,
}

impl AggregateOutcome {
    /// Share of input nodes removed as duplicates, in `0.0..=1.0`.
    pub fn dedup_ratio(&self) -> f64 {
        if self.before == 0 {
            0.0
        } else {
            self.duplicates as f64 / self.before as f64
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &CanonicalKey> {
        self.nodes.iter().map(|n| &n.key)
    }
}

/// Order sources by tier, then latency (unknown last), then URL.
pub fn prioritize(sources: &mut [SourceNodes]) {
    sources.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then_with(|| a.latency_ms.unwrap_or(u64::MAX).cmp(&b.latency_ms.unwrap_or(u64::MAX)))
            .then_with(|| a.url.cmp(&b.url))
    });
}

/// Merge `sources` (already in priority order) into the final node list.
///
/// With `dedup` off only byte-identical raw lines are collapsed.
pub fn aggregate(sources: &[SourceNodes], dedup: bool, cap: Option<usize>) -> AggregateOutcome {
    let mut outcome = AggregateOutcome::default();
    let mut seen_keys: HashSet<&CanonicalKey> = HashSet::new();
    let mut seen_raw: HashSet<&str> = HashSet::new();

    for node in sources.iter().flat_map(|s| s.nodes.iter()) {
        outcome.before += 1;
        let fresh = if dedup { seen_keys.insert(&node.key) } else { seen_raw.insert(node.raw.as_str()) };
        if fresh {
            outcome.nodes.push(node.clone());
        } else {
            outcome.duplicates += 1;
        }
    }

    if let Some(cap) = cap {
        if outcome.nodes.len() > cap {
            outcome.truncated = outcome.nodes.len() - cap;
            outcome.nodes.truncate(cap);
        }
    }
    outcome
}
