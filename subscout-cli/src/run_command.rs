use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use subscout_core::modules::config::{load_config, load_credential_specs, validate_config};
use subscout_core::{Pipeline, RunOptions};
use subscout_types::DiscoveryMode;

use crate::cli::RunArgs;

pub async fn run(args: RunArgs, config_path: Option<&Path>, data_dir: &Path) -> Result<()> {
    let mut config = load_config(config_path, data_dir).context("Failed to load configuration")?;
    if let Some(cap) = args.max_nodes {
        config.max_nodes = Some(cap);
    }
    if args.no_dedup {
        config.dedup = false;
    }
    if args.code_host_discovery {
        config.discovery.code_host = true;
    }
    if args.skip_discovery {
        config.discovery.enabled = false;
        config.discovery.code_host = false;
    }
    validate_config(&config).context("Invalid configuration")?;

    let credentials = load_credential_specs(&config, data_dir).context("Failed to load credentials")?;
    let options = RunOptions {
        data_dir: data_dir.to_path_buf(),
        output_dir: args.output_dir,
        emit_health: args.emit_health,
        discovery_enabled: !args.skip_discovery,
        credentials,
    };

    let pipeline = Pipeline::from_config(config)?;
    let report = pipeline.run(&options).await.context("Run aborted")?;
    let health = &report.health;

    println!(
        "{} {}/{} alive, {} dead, {} deferred, {} quarantined",
        "Sources:".bold(),
        health.alive.to_string().green(),
        health.candidates,
        health.dead.to_string().red(),
        health.deferred,
        health.quarantined
    );
    println!(
        "{} {} published ({} before dedup, ratio {:.2})",
        "Nodes:".bold(),
        health.nodes_after_dedup.to_string().green(),
        health.nodes_before_dedup,
        health.dedup_ratio
    );
    println!(
        "{} +{} / -{} source(s), +{} / -{} node(s) vs previous run",
        "Changes:".bold(),
        report.diff.added_urls.len(),
        report.diff.removed_urls.len(),
        report.diff.added_nodes,
        report.diff.removed_nodes
    );
    match health.discovery_mode {
        DiscoveryMode::Full => match health.discovery_reason.as_deref() {
            Some(reason) => println!(
                "{} {} new candidate(s) ({})",
                "Discovery:".bold(),
                health.discovered,
                reason.yellow()
            ),
            None => println!("{} {} new candidate(s)", "Discovery:".bold(), health.discovered),
        },
        mode => println!(
            "{} {} ({})",
            "Discovery:".bold(),
            mode.to_string().yellow(),
            health.discovery_reason.as_deref().unwrap_or("-")
        ),
    }
    if !health.errors.counts.is_empty() {
        let summary: Vec<String> =
            health.errors.counts.iter().map(|(kind, n)| format!("{kind}={n}")).collect();
        println!("{} {}", "Errors:".bold(), summary.join(", ").dimmed());
    }
    for path in &report.artifacts {
        println!("  {} {}", "wrote".cyan(), path.display());
    }
    Ok(())
}
