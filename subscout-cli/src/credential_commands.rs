use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use std::path::Path;

use subscout_core::modules::config::{load_config, load_credential_specs};
use subscout_core::CredentialStore;
use subscout_types::CredentialStatus;

async fn open_store(config_path: Option<&Path>, data_dir: &Path) -> Result<CredentialStore> {
    let config = load_config(config_path, data_dir).context("Failed to load configuration")?;
    let specs = load_credential_specs(&config, data_dir).context("Failed to load credentials")?;
    let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600)
        .context("utc_offset_hours out of range")?;
    let store =
        CredentialStore::load(data_dir, &specs, config.discovery.default_quota, offset, Utc::now())
            .await?;
    Ok(store)
}

pub async fn list_credentials(config_path: Option<&Path>, data_dir: &Path, json: bool) -> Result<()> {
    let store = open_store(config_path, data_dir).await?;
    let usage: Vec<_> = store.credentials().iter().map(|c| c.usage()).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&usage)?);
        return Ok(());
    }

    if usage.is_empty() {
        println!("{}", "No search credentials configured.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Key", "Used", "Quota", "Left", "Resets", "Status"]);

    for u in &usage {
        let status = match u.status {
            CredentialStatus::Active => Cell::new("active").fg(Color::Green),
            CredentialStatus::Exhausted => Cell::new("exhausted").fg(Color::Yellow),
            CredentialStatus::Invalid => Cell::new("invalid").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&u.id),
            Cell::new(&u.masked),
            Cell::new(u.used),
            Cell::new(u.quota),
            Cell::new(u.remaining),
            Cell::new(u.reset_at.format("%Y-%m-%d").to_string()),
            status,
        ]);
    }

    println!("{table}");
    let left: u32 = usage.iter().filter(|u| u.status == CredentialStatus::Active).map(|u| u.remaining).sum();
    println!("\n{} credential(s), {} searches left", usage.len(), left);
    Ok(())
}

pub async fn reset_credential(config_path: Option<&Path>, data_dir: &Path, identifier: &str) -> Result<()> {
    let mut store = open_store(config_path, data_dir).await?;
    let Some(id) = store.reset(identifier) else {
        anyhow::bail!("No unique credential matches '{}'", identifier);
    };
    store.persist().await?;
    println!("{} credential {}", "Re-activated".green(), id);
    Ok(())
}
