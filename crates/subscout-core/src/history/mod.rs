//! Durable run history.
//!
//! [`HistoryStore`] is read once at run start and written once at run end by
//! the pipeline task that owns it. The snapshot file is replaced atomically.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use subscout_types::{
    CandidateUrl, CanonicalKey, DailyCounters, DiscoverySource, RunSnapshot, SNAPSHOT_VERSION,
};
use tracing::info;

use crate::error::AppResult;
use crate::modules::file_utils::{atomic_write_json, read_json_or_set_aside};

pub const SNAPSHOT_FILE: &str = "history.json";

/// Set differences between two runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunDiff {
    pub added_urls: Vec<String>,
    pub removed_urls: Vec<String>,
    pub added_nodes: usize,
    pub removed_nodes: usize,
}

/// What a finished run reports back to history.
#[derive(Debug, Clone, Default)]
pub struct RunRecord {
    /// Every candidate touched this run, with its updated backoff state
    pub candidates: Vec<CandidateUrl>,
    pub alive_urls: BTreeSet<String>,
    pub node_keys: BTreeSet<CanonicalKey>,
}

pub struct HistoryStore {
    path: PathBuf,
    snapshot: RunSnapshot,
}

impl HistoryStore {
    /// Load the snapshot from `data_dir`. A missing file starts empty; a
    /// corrupt one is moved aside and history restarts.
    pub async fn load(data_dir: &Path) -> AppResult<Self> {
        let path = data_dir.join(SNAPSHOT_FILE);
        let snapshot: RunSnapshot =
            read_json_or_set_aside(&path, "History snapshot").await?.unwrap_or_default();
        info!(
            "Loaded history: {} URL(s), {} node key(s)",
            snapshot.urls.len(),
            snapshot.node_keys.len()
        );
        Ok(Self { path, snapshot })
    }

    pub fn snapshot(&self) -> &RunSnapshot {
        &self.snapshot
    }

    pub fn known_urls(&self) -> HashSet<String> {
        self.snapshot.urls.keys().cloned().collect()
    }

    /// Known candidates, sources re-tagged as `history`.
    pub fn candidates(&self) -> Vec<CandidateUrl> {
        self.snapshot
            .urls
            .values()
            .cloned()
            .map(|mut c| {
                c.source = DiscoverySource::History;
                c
            })
            .collect()
    }

    /// Whether `url` was alive in the previous run.
    pub fn was_alive(&self, url: &str) -> bool {
        self.snapshot.alive_urls.contains(url)
    }

    /// Original discovery source of a known URL.
    pub fn original_source(&self, url: &str) -> Option<DiscoverySource> {
        self.snapshot.urls.get(url).map(|c| c.source)
    }

    pub fn diff(&self, record: &RunRecord) -> RunDiff {
        let prev = &self.snapshot.alive_urls;
        RunDiff {
            added_urls: record.alive_urls.difference(prev).cloned().collect(),
            removed_urls: prev.difference(&record.alive_urls).cloned().collect(),
            added_nodes: record.node_keys.difference(&self.snapshot.node_keys).count(),
            removed_nodes: self.snapshot.node_keys.difference(&record.node_keys).count(),
        }
    }

    /// Fold a finished run into the snapshot. Today's bucket is overwritten on
    /// re-run; only the last `keep_days` buckets are retained.
    pub fn commit(
        &mut self,
        record: RunRecord,
        today: NaiveDate,
        keep_days: usize,
        now: DateTime<Utc>,
    ) -> RunDiff {
        let diff = self.diff(&record);

        let mut search_added = 0;
        let mut code_host_added = 0;
        for mut candidate in record.candidates {
            match self.snapshot.urls.get(&candidate.url) {
                Some(existing) => {
                    candidate.source = existing.source;
                    candidate.first_seen = existing.first_seen;
                }
                None => match candidate.source {
                    DiscoverySource::Search => search_added += 1,
                    DiscoverySource::CodeHost => code_host_added += 1,
                    DiscoverySource::History => {}
                },
            }
            self.snapshot.urls.insert(candidate.url.clone(), candidate);
        }

        let bucket = DailyCounters {
            date: today,
            added: diff.added_urls.len(),
            removed: diff.removed_urls.len(),
            alive: record.alive_urls.len(),
            search_added,
            code_host_added,
        };
        self.snapshot.daily.retain(|d| d.date != today);
        self.snapshot.daily.push(bucket);
        self.snapshot.daily.sort_by_key(|d| d.date);
        let excess = self.snapshot.daily.len().saturating_sub(keep_days);
        self.snapshot.daily.drain(..excess);

        self.snapshot.alive_urls = record.alive_urls;
        self.snapshot.node_keys = record.node_keys;
        self.snapshot.version = SNAPSHOT_VERSION;
        self.snapshot.updated_at = Some(now);
        diff
    }

    pub async fn persist(&self) -> AppResult<()> {
        atomic_write_json(&self.path, &self.snapshot).await
    }
}
