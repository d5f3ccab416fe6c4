//! CLI entry point for SecureVault.
//!
//! This binary provides the `securevault` command with subcommands for PIN
//! setup, status, resetting local data, and the interactive vault shell.

mod app;
mod cli;
mod config;
mod shell;

use std::io::{self, BufRead, Write as _};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::app::Vault;
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.command {
        Commands::Status => "warn",
        _ => "info",
    };
    init_tracing(level);

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let vault = Vault::open(config)?;

    match cli.command {
        Commands::Setup => cmd_setup(&vault).await,
        Commands::Status => print_status(&vault).await,
        Commands::Reset { yes } => cmd_reset(&vault, yes),
        Commands::Shell => shell::run(&vault).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: setup
// ---------------------------------------------------------------------------

async fn cmd_setup(vault: &Vault) -> Result<()> {
    println!();
    println!("  SecureVault Setup");
    println!("  =================");
    println!();

    if vault.session.is_setup()? {
        println!("  [!] A PIN is already set up on this device; it will be replaced.");
    }

    let pin = read_line("  Choose a 6-digit PIN: ")?;
    securevault_auth::validate_pin(&pin)?;
    let confirm = read_line("  Confirm PIN: ")?;
    if pin != confirm {
        bail!("PINs do not match");
    }

    vault.session.setup(&pin)?;
    println!("  [+] PIN stored on this device");

    if vault.backend.is_placeholder() {
        println!("  [!] Backend is not configured; `login` will not work until");
        println!("      SUPABASE_URL and SUPABASE_ANON_KEY are set.");
    }

    println!();
    println!("  Setup complete! Run `securevault shell` to open your vault.");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

pub(crate) async fn print_status(vault: &Vault) -> Result<()> {
    let status = vault.session.status()?;
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    println!();
    println!("  SecureVault Status");
    println!("  ==================");
    println!();
    println!("  Data directory:   {}", vault.config.storage.data_dir.display());
    println!("  Vault API:        {}", vault.config.api.url);
    if vault.backend.is_placeholder() {
        println!("  Backend:          NOT CONFIGURED (placeholder mode)");
    } else {
        println!("  Backend:          CONFIGURED");
    }
    println!("  PIN set up:       {}", yes_no(status.is_setup));
    println!("  Session:          {}", if status.is_authenticated { "unlocked" } else { "locked" });
    println!("  Session key:      {}", yes_no(status.has_session_key));
    println!("  Biometrics:       {}", yes_no(status.biometric_enabled));
    println!(
        "  Theme:            {}",
        vault.credentials.theme()?.unwrap_or_default()
    );
    println!(
        "  Auto-lock after:  {}s",
        vault.session.config().inactivity_timeout.as_secs()
    );
    match vault.monitor.is_running().await {
        Ok(true) => println!("  API service:      RUNNING"),
        Ok(false) => println!("  API service:      STOPPED (run `health` in the shell)"),
        Err(e) => println!("  API service:      UNREACHABLE ({e})"),
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: reset
// ---------------------------------------------------------------------------

fn cmd_reset(vault: &Vault, yes: bool) -> Result<()> {
    if !yes {
        let answer = read_line("  This erases the PIN and all local settings. Type 'yes' to continue: ")?;
        if answer != "yes" {
            println!("  Aborted.");
            return Ok(());
        }
    }
    vault.session.clear_local_data()?;
    println!("  Local data cleared.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read input")?;
    Ok(line.trim().to_string())
}

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
