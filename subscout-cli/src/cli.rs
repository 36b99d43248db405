use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "subscout",
    about = "Subscout - proxy subscription discovery, validation and dedup",
    version = env!("CARGO_PKG_VERSION"),
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, env = "SUBSCOUT_CONFIG", help = "Path to subscout.json")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, env = "SUBSCOUT_DATA_DIR", help = "History and credential ledger directory")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, global = true, env = "SUBSCOUT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run discovery, validation, extraction and dedup once")]
    Run(RunArgs),

    #[command(subcommand, about = "Inspect and reset search credentials")]
    Credentials(CredentialCommands),

    #[command(subcommand, about = "Inspect run history")]
    History(HistoryCommands),
}

#[derive(Args)]
pub struct RunArgs {
    #[arg(short, long, env = "SUBSCOUT_OUTPUT_DIR", help = "Directory for published artifacts")]
    pub output_dir: PathBuf,

    #[arg(long, help = "Cap on published nodes")]
    pub max_nodes: Option<usize>,

    #[arg(long, help = "Disable canonical-key dedup (exact duplicates still collapse)")]
    pub no_dedup: bool,

    #[arg(long, help = "Validate known URLs only")]
    pub skip_discovery: bool,

    #[arg(long, help = "Also scan the code host for subscription links")]
    pub code_host_discovery: bool,

    #[arg(long, help = "Write url_meta.json, health.json and stats_daily.json")]
    pub emit_health: bool,
}

#[derive(Subcommand)]
pub enum CredentialCommands {
    #[command(about = "List credentials with quota usage (secrets masked)")]
    List {
        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(about = "Re-activate an invalid or exhausted credential")]
    Reset {
        #[arg(help = "Credential id or unique id prefix")]
        identifier: String,
    },
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    #[command(about = "Summarize the stored snapshot")]
    Show {
        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },
}
