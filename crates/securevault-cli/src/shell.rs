//! Subcommand: `securevault shell` — interactive vault shell.
//!
//! Every entered line counts as user activity and resets the inactivity
//! timer. Session events are watched alongside stdin so an inactivity logout
//! is reported as soon as it happens.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use securevault_auth::{LogoutReason, SessionEvent};
use securevault_crypto::Theme;
use securevault_store::expiry::notification_id;
use securevault_store::{Attachment, Bucket, RecordKind, ServiceHealth, VaultRecord};

use crate::app::Vault;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ThemeAction {
    Show,
    Toggle,
    Set(Theme),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BiometricAction {
    Status,
    Enable,
    Disable,
    Unlock,
}

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Quit,
    Status,
    Login { pin: String },
    Lock,
    List { kind: RecordKind },
    Show { kind: RecordKind, id: String },
    Add { kind: RecordKind, fields: Value },
    Update {
        kind: RecordKind,
        id: String,
        patch: Map<String, Value>,
    },
    Remove { kind: RecordKind, id: String },
    Expiring,
    Dismiss { kind: RecordKind, id: String },
    ChangePin { old: String, new: String },
    /// Finish an interrupted re-encryption, optionally naming the old PIN.
    Rekey { old: Option<String> },
    Theme(ThemeAction),
    Attach {
        bucket: Bucket,
        path: PathBuf,
        name: String,
        detail: String,
    },
    Detach { bucket: Bucket, url: String },
    Biometric(BiometricAction),
    Health,
}

impl Command {
    fn needs_session(&self) -> bool {
        matches!(
            self,
            Self::List { .. }
                | Self::Show { .. }
                | Self::Add { .. }
                | Self::Update { .. }
                | Self::Remove { .. }
                | Self::Expiring
                | Self::Dismiss { .. }
                | Self::ChangePin { .. }
                | Self::Rekey { .. }
                | Self::Attach { .. }
                | Self::Detach { .. }
        )
    }
}

/// Parse one input line. `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(w, r)| (w, r.trim()));

    let command = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "status" => Command::Status,
        "lock" | "logout" => Command::Lock,
        "expiring" => Command::Expiring,
        "health" => Command::Health,
        "login" => Command::Login {
            pin: single(rest, "login <pin>")?,
        },
        "list" | "ls" => Command::List {
            kind: kind_arg(rest)?,
        },
        "show" => {
            let (kind, id) = kind_and_id(rest, "show <kind> <id>")?;
            Command::Show { kind, id }
        }
        "remove" | "rm" => {
            let (kind, id) = kind_and_id(rest, "remove <kind> <id>")?;
            Command::Remove { kind, id }
        }
        "dismiss" => {
            let (kind, id) = kind_and_id(rest, "dismiss <kind> <id>")?;
            Command::Dismiss { kind, id }
        }
        "add" => {
            let (kind, json) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: add <kind> <json object>"))?;
            Command::Add {
                kind: kind_arg(kind)?,
                fields: Value::Object(json_object(json)?),
            }
        }
        "update" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let (Some(kind), Some(id), Some(json)) = (parts.next(), parts.next(), parts.next())
            else {
                bail!("usage: update <kind> <id> <json object>");
            };
            Command::Update {
                kind: kind_arg(kind)?,
                id: id.to_string(),
                patch: json_object(json)?,
            }
        }
        "change-pin" => {
            let args: Vec<&str> = rest.split_whitespace().collect();
            let [old, new] = args.as_slice() else {
                bail!("usage: change-pin <old> <new>");
            };
            Command::ChangePin {
                old: old.to_string(),
                new: new.to_string(),
            }
        }
        "rekey" => Command::Rekey {
            old: match rest {
                "" => None,
                pin => Some(single(pin, "rekey [old pin]")?),
            },
        },
        "theme" => Command::Theme(match rest.to_ascii_lowercase().as_str() {
            "" => ThemeAction::Show,
            "toggle" => ThemeAction::Toggle,
            other => ThemeAction::Set(
                Theme::parse(other).ok_or_else(|| anyhow!("unknown theme {other:?}"))?,
            ),
        }),
        "attach" => {
            let args: Vec<&str> = rest.split_whitespace().collect();
            let [bucket, path, name, detail] = args.as_slice() else {
                bail!("usage: attach <document|policy> <file> <name> <owner|policy number>");
            };
            Command::Attach {
                bucket: bucket_arg(bucket)?,
                path: PathBuf::from(path),
                name: name.to_string(),
                detail: detail.to_string(),
            }
        }
        "detach" => {
            let args: Vec<&str> = rest.split_whitespace().collect();
            let [bucket, url] = args.as_slice() else {
                bail!("usage: detach <document|policy> <url>");
            };
            Command::Detach {
                bucket: bucket_arg(bucket)?,
                url: url.to_string(),
            }
        }
        "biometric" => Command::Biometric(match rest.to_ascii_lowercase().as_str() {
            "" | "status" => BiometricAction::Status,
            "on" | "enable" => BiometricAction::Enable,
            "off" | "disable" => BiometricAction::Disable,
            "unlock" => BiometricAction::Unlock,
            other => bail!("unknown biometric action {other:?}"),
        }),
        other => bail!("unknown command {other:?}; try `help`"),
    };
    Ok(Some(command))
}

fn single(rest: &str, usage: &str) -> Result<String> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(value), None) => Ok(value.to_string()),
        _ => bail!("usage: {usage}"),
    }
}

fn kind_arg(raw: &str) -> Result<RecordKind> {
    RecordKind::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = RecordKind::ALL.iter().map(|k| k.table_name()).collect();
        anyhow!("unknown record kind {raw:?} (one of: {})", known.join(", "))
    })
}

fn kind_and_id(rest: &str, usage: &str) -> Result<(RecordKind, String)> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    let [kind, id] = args.as_slice() else {
        bail!("usage: {usage}");
    };
    Ok((kind_arg(kind)?, id.to_string()))
}

fn bucket_arg(raw: &str) -> Result<Bucket> {
    match raw.to_ascii_lowercase().as_str() {
        "document" | "documents" => Ok(Bucket::Documents),
        "policy" | "policies" => Ok(Bucket::Policy),
        other => bail!("unknown bucket {other:?}"),
    }
}

fn json_object(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw).context("invalid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("expected a JSON object"),
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Run the shell until `quit` or end of input.
pub async fn run(vault: &Vault) -> Result<()> {
    println!();
    println!("  SecureVault v{}", env!("CARGO_PKG_VERSION"));
    if !vault.session.is_setup()? {
        println!("  No PIN set up on this device. Run `securevault setup` first.");
    }
    println!("  Type `help` for commands, `quit` to exit.");
    println!();

    let mut events = vault.session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt(vault);
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    break;
                };
                vault.session.record_activity();
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(e) = execute(vault, command).await {
                            tracing::debug!(error = %e, "command failed");
                            println!("  Error: {e:#}");
                        }
                    }
                    Err(e) => println!("  {e}"),
                }
            }
            event = events.recv() => {
                if let Ok(SessionEvent::LoggedOut { reason: LogoutReason::Inactivity }) = event {
                    vault.records.clear_caches();
                    println!();
                    println!("  Session locked after inactivity.");
                }
            }
        }
    }

    tracing::info!("shell closed");
    Ok(())
}

fn prompt(vault: &Vault) {
    let marker = if vault.session.is_authenticated() {
        "unlocked"
    } else {
        "locked"
    };
    print!("vault ({marker})> ");
    let _ = std::io::stdout().flush();
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

pub async fn execute(vault: &Vault, command: Command) -> Result<()> {
    if command.needs_session() && !vault.session.is_authenticated() {
        bail!("vault is locked; use `login <pin>` first");
    }

    match command {
        Command::Help => print_help(),
        Command::Quit => {}
        Command::Status => crate::print_status(vault).await?,
        Command::Login { pin } => {
            vault.session.login(&pin).await?;
            println!("  Unlocked.");
        }
        Command::Lock => {
            if vault.keys.rotation_pending() {
                println!("  Re-encryption was not finished; run `rekey <old pin>` after login.");
            }
            vault.session.logout();
            vault.records.clear_caches();
            println!("  Locked.");
        }
        Command::List { kind } => {
            let records = vault.records.list(kind).await?;
            if records.is_empty() {
                println!("  No {} records.", kind.label());
            }
            for record in &records {
                println!("  {:>6}  {}", record.id(), record.title());
            }
        }
        Command::Show { kind, id } => {
            let record = vault
                .records
                .find(kind, &id)
                .await?
                .ok_or_else(|| anyhow!("no {} with id {id}", kind.label()))?;
            print_record(&record)?;
        }
        Command::Add { kind, fields } => {
            let record = vault.records.create(kind, fields).await?;
            println!("  Added {} {}.", kind.label(), record.id());
        }
        Command::Update { kind, id, patch } => {
            let record = vault.records.update(kind, &id, patch).await?;
            println!("  Updated {}.", record.title());
        }
        Command::Remove { kind, id } => {
            vault.records.remove(kind, &id).await?;
            println!("  Removed {} {id}.", kind.label());
        }
        Command::Expiring => {
            let today = chrono::Local::now().date_naive();
            let items = vault.expiring(today).await?;
            if items.is_empty() {
                println!("  Nothing expiring in the next 30 days.");
            }
            for item in items {
                let days = item.days_left(today);
                let when = if days < 0 {
                    format!("expired {} days ago", -days)
                } else {
                    format!("in {days} days")
                };
                println!(
                    "  [{}] {} {} ({}, {when})",
                    item.kind, item.id, item.name, item.description
                );
            }
        }
        Command::Dismiss { kind, id } => {
            vault
                .credentials
                .dismiss_notification(&notification_id(kind, &id))?;
            println!("  Dismissed.");
        }
        Command::ChangePin { old, new } => {
            vault.session.change_pin(&old, &new).await?;
            println!("  PIN changed.");
            rekey(vault).await;
        }
        Command::Rekey { old } => {
            if let Some(old) = old {
                vault.session.recover_previous_key(&old).await?;
            }
            if vault.keys.rotation_pending() {
                rekey(vault).await;
            } else {
                println!("  Nothing to re-encrypt.");
            }
        }
        Command::Theme(action) => {
            let theme = match action {
                ThemeAction::Show => vault.credentials.theme()?.unwrap_or_default(),
                ThemeAction::Toggle => vault.credentials.toggle_theme()?,
                ThemeAction::Set(theme) => {
                    vault.credentials.set_theme(theme)?;
                    theme
                }
            };
            println!("  Theme: {theme}");
        }
        Command::Attach {
            bucket,
            path,
            name,
            detail,
        } => {
            let file = Attachment::from_path(&path)?;
            let url = match bucket {
                Bucket::Documents => vault.attachments.upload_document(file, &name, &detail).await?,
                Bucket::Policy => vault.attachments.upload_policy(file, &name, &detail).await?,
            };
            println!("  Uploaded: {url}");
        }
        Command::Detach { bucket, url } => {
            vault.attachments.delete(bucket, &url).await?;
            println!("  Deleted.");
        }
        Command::Biometric(action) => biometric(vault, action).await?,
        Command::Health => {
            let outcome = match vault.monitor.ensure_running().await? {
                ServiceHealth::Running => "running".to_string(),
                ServiceHealth::Recovered { attempts } => {
                    format!("restarted (up after {attempts} checks)")
                }
                ServiceHealth::Unavailable { attempts } => {
                    format!("unavailable after {attempts} checks")
                }
            };
            println!("  Vault API: {outcome}");
        }
    }
    Ok(())
}

/// Re-encrypt under the current key. A failure is reported, not raised: the
/// old key stays retired and `rekey` picks up where this stopped.
async fn rekey(vault: &Vault) {
    match vault.finish_rekey().await {
        Ok(rewritten) => println!("  {rewritten} records re-encrypted."),
        Err(e) => {
            tracing::warn!(error = %e, "re-encryption incomplete");
            println!("  Re-encryption incomplete: {e}");
            println!("  Records stay readable; run `rekey` to retry.");
        }
    }
}

async fn biometric(vault: &Vault, action: BiometricAction) -> Result<()> {
    let binder = &vault.biometrics;
    match action {
        BiometricAction::Status => {
            println!("  Supported: {}", binder.is_supported());
            println!("  Enabled:   {}", binder.is_enabled());
        }
        BiometricAction::Enable => {
            if !vault.session.is_authenticated() {
                bail!("unlock with your PIN before enabling biometrics");
            }
            if binder.register_credential().await {
                println!("  Biometric unlock enabled.");
            } else {
                println!("  Biometric unlock is not available on this device.");
            }
        }
        BiometricAction::Disable => {
            binder.clear_credential()?;
            println!("  Biometric unlock disabled.");
        }
        BiometricAction::Unlock => {
            if vault.session.unlock_with_biometric(binder).await {
                println!("  Unlocked. Secure fields stay hidden until you log in with your PIN.");
            } else {
                println!("  Biometric unlock failed.");
            }
        }
    }
    Ok(())
}

fn print_record(record: &VaultRecord) -> Result<()> {
    println!("  {} ({})", record.title(), record.kind().label());
    let value = record.to_value()?;
    let Value::Object(fields) = value else {
        return Ok(());
    };
    for (name, value) in fields {
        match value {
            Value::Null => {}
            Value::String(s) if s.is_empty() => {}
            Value::String(s) => println!("    {name}: {s}"),
            other => println!("    {name}: {other}"),
        }
    }
    Ok(())
}

fn print_help() {
    println!();
    println!("  Session:");
    println!("    login <pin>                      - Unlock with your 6-digit PIN");
    println!("    lock                             - Lock the vault");
    println!("    change-pin <old> <new>           - Change PIN and re-encrypt records");
    println!("    rekey [old pin]                  - Finish an interrupted re-encryption");
    println!("    biometric [on|off|unlock]        - Manage biometric unlock");
    println!("  Records (kinds: bank_accounts, credit_cards, general_documents,");
    println!("           insurance_policies, deposits, websites):");
    println!("    list <kind>                      - List records");
    println!("    show <kind> <id>                 - Show one record");
    println!("    add <kind> <json>                - Create a record");
    println!("    update <kind> <id> <json>        - Update fields of a record");
    println!("    remove <kind> <id>               - Delete a record");
    println!("    attach <document|policy> <file> <name> <owner|number>");
    println!("    detach <document|policy> <url>   - Delete an uploaded file");
    println!("  Other:");
    println!("    expiring                         - Items expiring within 30 days");
    println!("    dismiss <kind> <id>              - Hide an expiry notification");
    println!("    theme [light|dark|toggle]        - Show or change the theme");
    println!("    health                           - Check (and restart) the vault API");
    println!("    status                           - Show vault status");
    println!("    quit / exit                      - Leave the shell");
    println!();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
