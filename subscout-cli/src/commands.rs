use anyhow::Result;
use std::path::Path;

use crate::cli::{CredentialCommands, HistoryCommands};

mod credential_commands_impl {
    pub use crate::credential_commands::*;
}
mod history_commands_impl {
    pub use crate::history_commands::*;
}

pub async fn handle_credential_command(
    cmd: CredentialCommands,
    config_path: Option<&Path>,
    data_dir: &Path,
) -> Result<()> {
    match cmd {
        CredentialCommands::List { json } => {
            credential_commands_impl::list_credentials(config_path, data_dir, json).await
        }
        CredentialCommands::Reset { identifier } => {
            credential_commands_impl::reset_credential(config_path, data_dir, &identifier).await
        }
    }
}

pub async fn handle_history_command(cmd: HistoryCommands, data_dir: &Path) -> Result<()> {
    match cmd {
        HistoryCommands::Show { json } => history_commands_impl::show_history(data_dir, json).await,
    }
}
