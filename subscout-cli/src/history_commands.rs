use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;
use std::path::Path;

use subscout_core::HistoryStore;
use subscout_types::DailyCounters;

const RECENT_DAYS: usize = 7;

#[derive(Serialize)]
struct HistorySummary {
    updated_at: Option<chrono::DateTime<Utc>>,
    urls: usize,
    alive: usize,
    backing_off: usize,
    quarantined: usize,
    node_keys: usize,
    recent_days: Vec<DailyCounters>,
}

pub async fn show_history(data_dir: &Path, json: bool) -> Result<()> {
    let store = HistoryStore::load(data_dir).await?;
    let snapshot = store.snapshot();
    let now = Utc::now();

    let skip = snapshot.daily.len().saturating_sub(RECENT_DAYS);
    let summary = HistorySummary {
        updated_at: snapshot.updated_at,
        urls: snapshot.urls.len(),
        alive: snapshot.alive_urls.len(),
        backing_off: snapshot
            .urls
            .values()
            .filter(|c| !c.quarantined && !c.is_eligible(now))
            .count(),
        quarantined: snapshot.urls.values().filter(|c| c.quarantined).count(),
        node_keys: snapshot.node_keys.len(),
        recent_days: snapshot.daily[skip..].to_vec(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let Some(updated_at) = summary.updated_at else {
        println!("{}", "No runs recorded yet.".yellow());
        return Ok(());
    };

    println!("{} {}", "Last run:".bold(), updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "{} {} tracked, {} alive, {} backing off, {} quarantined",
        "URLs:".bold(),
        summary.urls,
        summary.alive.to_string().green(),
        summary.backing_off,
        summary.quarantined.to_string().red()
    );
    println!("{} {} canonical key(s)", "Nodes:".bold(), summary.node_keys);

    if !summary.recent_days.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Date", "Added", "Removed", "Alive", "Search", "Code host"]);
        for day in &summary.recent_days {
            table.add_row(vec![
                day.date.to_string(),
                day.added.to_string(),
                day.removed.to_string(),
                day.alive.to_string(),
                day.search_added.to_string(),
                day.code_host_added.to_string(),
            ]);
        }
        println!("\n{table}");
    }
    Ok(())
}
