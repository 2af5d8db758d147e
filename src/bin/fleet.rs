//! fleet - headless administration of the fleet store
//!
//! Manages the accounts, server address, chat messages and log sink that the
//! engine reads and writes, and validates the configuration file.
//!
//! # Usage
//!
//! ```text
//! fleet accounts list
//! fleet accounts add alice@example.com hunter2
//! fleet accounts import accounts.txt
//! fleet server set play.example.net:25565
//! fleet messages add "vote for us at example.net/vote" --interval 300
//! fleet messages disable 2
//! fleet logs recent --account alice@example.com --limit 20
//! fleet config check
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fleet_core::{
    AccountId, ChatMessage, ChatMessageId, ChatMessageUpdate, Credentials, FleetConfig, LogEntry,
    ServerConfig, DEFAULT_MESSAGE_INTERVAL_SECS,
};
use fleet_protocol::{LogQuery, Store, StoreError};
use fleetd::checker::AccountChecker;
use fleetd::store::FileStore;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Default number of entries for `logs recent`.
const DEFAULT_LOG_LIMIT: usize = 50;

// ============================================================================
// CLI Arguments
// ============================================================================

/// fleet - supervisor for automated game-client sessions
#[derive(Parser, Debug)]
#[command(name = "fleet", version, about)]
struct Args {
    /// Config file (default: $FLEET_CONFIG or <config_dir>/fleet/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage stored accounts
    #[command(subcommand)]
    Accounts(AccountsCommand),
    /// Show or change the target server
    #[command(subcommand)]
    Server(ServerCommand),
    /// Manage the chat messages used by message loops
    #[command(subcommand)]
    Messages(MessagesCommand),
    /// Read or clear the persistent log
    #[command(subcommand)]
    Logs(LogsCommand),
    /// Inspect the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum AccountsCommand {
    /// List accounts with their last known status
    List,
    /// Add one account
    Add { id: String, secret: String },
    /// Import `email:password` lines from a file
    Import { path: PathBuf },
    /// Remove an account
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum ServerCommand {
    /// Print the server sessions connect to
    Show,
    /// Store a new server address (`host` or `host:port`)
    Set { address: String },
}

#[derive(Subcommand, Debug)]
enum MessagesCommand {
    /// List stored messages
    List,
    /// Store a new, enabled message
    Add {
        text: String,
        /// Seconds between two sends when looping
        #[arg(long, short = 'i', default_value_t = DEFAULT_MESSAGE_INTERVAL_SECS)]
        interval: u64,
    },
    /// Change the text or interval of a message
    Edit {
        id: u64,
        #[arg(long, short = 't')]
        text: Option<String>,
        #[arg(long, short = 'i')]
        interval: Option<u64>,
    },
    /// Delete a message
    Remove { id: u64 },
    /// Include a message when loops start
    Enable { id: u64 },
    /// Keep a message but leave it out of loops
    Disable { id: u64 },
}

#[derive(Subcommand, Debug)]
enum LogsCommand {
    /// Print the most recent entries
    Recent {
        /// Only entries for this account
        #[arg(long, short = 'a')]
        account: Option<String>,
        #[arg(long, short = 'n', default_value_t = DEFAULT_LOG_LIMIT)]
        limit: usize,
    },
    /// Delete every entry
    Clear,
    /// Write every entry to a JSON-lines file
    Export { path: PathBuf },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the config, then print the resolved values
    Check,
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("fleet=info".parse()?)
                .add_directive("fleetd=info".parse()?)
                .add_directive("fleet_core=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(FleetConfig::default_path);
    let config = FleetConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Command::Config(ConfigCommand::Check) = args.command {
        return check_config(&config_path, &config);
    }

    let data_dir = config.resolved_data_dir();
    debug!(data_dir = %data_dir.display(), "Opening store");
    let store = FileStore::open(&data_dir)
        .await
        .with_context(|| format!("Failed to open store in {}", data_dir.display()))?;

    match args.command {
        Command::Accounts(cmd) => run_accounts(&store, cmd).await,
        Command::Server(cmd) => run_server(&store, &config, cmd).await,
        Command::Messages(cmd) => run_messages(&store, cmd).await,
        Command::Logs(cmd) => run_logs(&store, cmd).await,
        Command::Config(_) => Ok(()),
    }
}

// ============================================================================
// Accounts
// ============================================================================

async fn run_accounts(store: &FileStore, cmd: AccountsCommand) -> Result<()> {
    match cmd {
        AccountsCommand::List => {
            let accounts = store.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts.");
                return Ok(());
            }
            for account in accounts {
                let last = account
                    .status
                    .last_connected_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<40} {:<12} last connected: {last}",
                    account.id().to_string(),
                    account.state().to_string()
                );
            }
        }
        AccountsCommand::Add { id, secret } => {
            let account = store
                .add_account(Credentials::new(id, secret))
                .await
                .context("Failed to add account")?;
            println!("Added {}", account.id());
        }
        AccountsCommand::Import { path } => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let (accounts, invalid) = AccountChecker::parse_lines(&text);

            let mut added = 0;
            let mut skipped = 0;
            for credentials in accounts {
                match store.add_account(credentials).await {
                    Ok(_) => added += 1,
                    Err(StoreError::AccountExists(id)) => {
                        debug!(account = %id, "Account already stored, skipping");
                        skipped += 1;
                    }
                    Err(e) => return Err(e).context("Failed to import account"),
                }
            }

            for line in &invalid {
                warn!(line = %line, "Skipping malformed line");
            }
            println!(
                "Imported {added} accounts ({skipped} already present, {} malformed lines)",
                invalid.len()
            );
        }
        AccountsCommand::Remove { id } => {
            let id = AccountId::new(id);
            store
                .remove_account(&id)
                .await
                .with_context(|| format!("Failed to remove {id}"))?;
            println!("Removed {id}");
        }
    }
    Ok(())
}

// ============================================================================
// Server
// ============================================================================

async fn run_server(store: &FileStore, config: &FleetConfig, cmd: ServerCommand) -> Result<()> {
    match cmd {
        ServerCommand::Show => match store.get_server_config().await? {
            Some(server) => println!("{server}"),
            None => println!("{} (from config)", config.server),
        },
        ServerCommand::Set { address } => {
            let server = ServerConfig::parse(&address)
                .with_context(|| format!("Invalid server address: {address}"))?;
            store.set_server_config(server.clone()).await?;
            println!("Server set to {server}");
        }
    }
    Ok(())
}

// ============================================================================
// Messages
// ============================================================================

async fn run_messages(store: &FileStore, cmd: MessagesCommand) -> Result<()> {
    match cmd {
        MessagesCommand::List => {
            let messages = store.list_chat_messages().await?;
            if messages.is_empty() {
                println!("No chat messages.");
                return Ok(());
            }
            for message in &messages {
                println!("{}", format_message(message));
            }
        }
        MessagesCommand::Add { text, interval } => {
            let message = store
                .add_chat_message(&text, interval)
                .await
                .context("Failed to add message")?;
            println!("Added message {} (every {}s)", message.id, message.interval_secs);
        }
        MessagesCommand::Edit { id, text, interval } => {
            let update = ChatMessageUpdate {
                text,
                interval_secs: interval,
                enabled: None,
            };
            if update.is_empty() {
                bail!("Nothing to change: pass --text and/or --interval");
            }
            let message = update_message(store, id, update).await?;
            println!("Updated {}", format_message(&message));
        }
        MessagesCommand::Remove { id } => {
            let id = ChatMessageId::new(id);
            store
                .remove_chat_message(id)
                .await
                .with_context(|| format!("Failed to remove message {id}"))?;
            println!("Removed message {id}");
        }
        MessagesCommand::Enable { id } => {
            let message = update_message(store, id, ChatMessageUpdate::enabled(true)).await?;
            println!("Enabled message {}", message.id);
        }
        MessagesCommand::Disable { id } => {
            let message = update_message(store, id, ChatMessageUpdate::enabled(false)).await?;
            println!("Disabled message {}", message.id);
        }
    }
    Ok(())
}

async fn update_message(
    store: &FileStore,
    id: u64,
    update: ChatMessageUpdate,
) -> Result<ChatMessage> {
    let id = ChatMessageId::new(id);
    store
        .update_chat_message(id, update)
        .await
        .with_context(|| format!("Failed to update message {id}"))
}

fn format_message(message: &ChatMessage) -> String {
    let status = if message.enabled { "enabled" } else { "disabled" };
    format!(
        "{:>4}  {:<8} {:>6}s  {}",
        message.id.to_string(),
        status,
        message.interval_secs,
        message.text
    )
}

// ============================================================================
// Logs
// ============================================================================

async fn run_logs(store: &FileStore, cmd: LogsCommand) -> Result<()> {
    match cmd {
        LogsCommand::Recent { account, limit } => {
            if limit == 0 {
                bail!("--limit must be greater than 0");
            }
            let mut query = LogQuery::recent(limit);
            if let Some(account) = account {
                query = query.for_account(AccountId::new(account));
            }
            for entry in store.query_logs(&query).await? {
                println!("{}", format_entry(&entry));
            }
        }
        LogsCommand::Clear => {
            let removed = store.clear_logs().await?;
            println!("Cleared {removed} log entries");
        }
        LogsCommand::Export { path } => {
            let entries = store.query_logs(&LogQuery::default()).await?;
            export_logs(&path, &entries)?;
            println!("Exported {} log entries to {}", entries.len(), path.display());
        }
    }
    Ok(())
}

fn format_entry(entry: &LogEntry) -> String {
    format!(
        "{} {:<7} {:<30} {}",
        entry.at.format("%Y-%m-%d %H:%M:%S"),
        entry.level.to_string(),
        entry.account.to_string(),
        entry.message
    )
}

fn export_logs(path: &Path, entries: &[LogEntry]) -> Result<()> {
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for entry in entries {
        let line = serde_json::to_string(entry)?;
        writeln!(file, "{line}")?;
    }
    Ok(())
}

// ============================================================================
// Config
// ============================================================================

fn check_config(path: &Path, config: &FleetConfig) -> Result<()> {
    config.validate().context("Config is invalid")?;

    let source = if path.exists() { "file" } else { "defaults" };
    println!("Config: {} ({source})", path.display());
    println!("Data directory: {}", config.resolved_data_dir().display());
    println!("Fallback server: {}", config.server);
    println!(
        "Connect: timeout {}s, spawn delay {}-{}s, mode {:?}, {} startup commands",
        config.connect.timeout_secs,
        config.connect.spawn_delay_min_secs,
        config.connect.spawn_delay_max_secs,
        config.connect.mode,
        config.connect.startup_commands.len()
    );
    println!(
        "Reconnect: enabled={}, base {}s, max {} attempts, duplicate-login +{}s",
        config.reconnect.enabled,
        config.reconnect.base_delay_secs,
        config.reconnect.max_attempts,
        config.reconnect.duplicate_login_delay_secs
    );
    println!(
        "Keepalive: every {}-{}s, retry {}s, pulse {}ms",
        config.keepalive.min_interval_secs,
        config.keepalive.max_interval_secs,
        config.keepalive.retry_secs,
        config.keepalive.pulse_ms
    );
    Ok(())
}
