//! Persisted history state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::candidate::CandidateUrl;
use super::node::CanonicalKey;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Day-bucketed counters for trend reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCounters {
    pub date: NaiveDate,
    /// URLs alive this run that were not alive in the previous run
    pub added: usize,
    /// URLs alive in the previous run that are not alive now
    pub removed: usize,
    pub alive: usize,
    #[serde(default)]
    pub search_added: usize,
    #[serde(default)]
    pub code_host_added: usize,
}

impl DailyCounters {
    pub fn empty(date: NaiveDate) -> Self {
        Self { date, added: 0, removed: 0, alive: 0, search_added: 0, code_host_added: 0 }
    }
}

/// Full history state between runs. Read once at start, replaced atomically at end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunSnapshot {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Every candidate URL ever observed, keyed by normalized URL
    #[serde(default)]
    pub urls: BTreeMap<String, CandidateUrl>,
    /// Canonical keys published by the last run
    #[serde(default)]
    pub node_keys: BTreeSet<CanonicalKey>,
    /// URLs that were alive in the last run
    #[serde(default)]
    pub alive_urls: BTreeSet<String>,
    #[serde(default)]
    pub daily: Vec<DailyCounters>,
}
