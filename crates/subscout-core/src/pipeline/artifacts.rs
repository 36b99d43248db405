//! Output artifacts consumed by external renderers.
//!
//! ```text
//! <output>/sub/all.txt            always
//! <output>/sub/url_meta.json      --emit-health
//! <output>/health.json            --emit-health
//! <output>/sub/stats_daily.json   --emit-health
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use subscout_types::{DailyCounters, HealthSummary, ProxyNode, UrlMeta};
use tracing::info;

use crate::error::AppResult;
use crate::modules::file_utils::{atomic_write_bytes, atomic_write_json};

pub const NODES_FILE: &str = "sub/all.txt";
pub const URL_META_FILE: &str = "sub/url_meta.json";
pub const HEALTH_FILE: &str = "health.json";
pub const STATS_FILE: &str = "sub/stats_daily.json";

/// Day buckets written to the stats artifact.
pub const STATS_DAYS: usize = 60;

pub struct Artifacts<'a> {
    pub nodes: &'a [ProxyNode],
    pub url_meta: &'a BTreeMap<String, UrlMeta>,
    pub health: &'a HealthSummary,
    pub daily: &'a [DailyCounters],
}

/// Render the node list: one raw line per node, newline-terminated.
pub fn render_nodes(nodes: &[ProxyNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        out.push_str(&node.raw);
        out.push('\n');
    }
    out
}

/// Write every artifact and return the paths written.
pub async fn write_all(
    output_dir: &Path,
    artifacts: &Artifacts<'_>,
    emit_health: bool,
) -> AppResult<Vec<PathBuf>> {
    let mut written = Vec::new();

    let nodes_path = output_dir.join(NODES_FILE);
    atomic_write_bytes(&nodes_path, render_nodes(artifacts.nodes).as_bytes()).await?;
    written.push(nodes_path);

    if emit_health {
        let meta_path = output_dir.join(URL_META_FILE);
        atomic_write_json(&meta_path, artifacts.url_meta).await?;
        written.push(meta_path);

        let health_path = output_dir.join(HEALTH_FILE);
        atomic_write_json(&health_path, artifacts.health).await?;
        written.push(health_path);

        let skip = artifacts.daily.len().saturating_sub(STATS_DAYS);
        let stats_path = output_dir.join(STATS_FILE);
        atomic_write_json(&stats_path, &artifacts.daily[skip..]).await?;
        written.push(stats_path);
    }

    info!("Wrote {} artifact(s) to {}", written.len(), output_dir.display());
    Ok(written)
}
