//! CLI argument definitions for SecureVault.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// SecureVault -- a PIN-locked personal vault.
#[derive(Parser)]
#[command(
    name = "securevault",
    version,
    about = "SecureVault -- PIN-locked personal vault",
    long_about = "Keeps bank accounts, cards, documents, policies, deposits and website \
                  logins behind a 6-digit PIN, encrypting sensitive fields before they \
                  leave this device."
)]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set the PIN on this device.
    Setup,

    /// Show vault and session status.
    Status,

    /// Wipe all local data (PIN hash, session, biometric credential, preferences).
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },

    /// Start the interactive vault shell.
    Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_config_flag() {
        let cli = Cli::try_parse_from(["securevault", "reset", "--yes", "-c", "vault.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Reset { yes: true }));
        assert_eq!(cli.config, Some(PathBuf::from("vault.toml")));
    }
}
