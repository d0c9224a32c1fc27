//! ledgersync - operator CLI for the ledger synchronization engine
//!
//! ## Usage
//!
//! ```text
//! ledgersync new-db                      # Create a database
//! ledgersync new-db --force              # Reset an existing database
//! ledgersync upgrade-db                  # Apply pending schema migrations
//! ledgersync info                        # Print markers and row counts
//! ledgersync dump-entries --kind offer   # Print projected rows as JSON lines
//! ledgersync sample-config               # Print a configuration file
//! ```
//!
//! ## Configuration
//!
//! Settings come from the TOML file given with `--config`. Without one the
//! defaults apply and the database is `ledgersync.db`, or the path given
//! with `--db`.

mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ledgersync_common::{Config, EntryKind, LogFormat};

use crate::logging::LogConfig;

const DEFAULT_DB_PATH: &str = "ledgersync.db";

/// Ledger state synchronization engine
#[derive(Parser)]
#[command(name = "ledgersync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Path to the database (overrides config)
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Log output format (overrides config)
    #[arg(long, global = true)]
    log_format: Option<CliLogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliEntryKind {
    Account,
    Trustline,
    Offer,
}

impl From<CliEntryKind> for EntryKind {
    fn from(kind: CliEntryKind) -> Self {
        match kind {
            CliEntryKind::Account => EntryKind::Account,
            CliEntryKind::Trustline => EntryKind::TrustLine,
            CliEntryKind::Offer => EntryKind::Offer,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new database
    NewDb {
        /// Reset the database if it already exists
        #[arg(long)]
        force: bool,
    },

    /// Upgrade database schema
    UpgradeDb,

    /// Print sync markers and entry counts
    Info,

    /// Print projected entries as JSON lines
    DumpEntries {
        /// Only entries of this kind
        #[arg(long)]
        kind: Option<CliEntryKind>,
    },

    /// Print sample configuration
    SampleConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&cli, &config)?;

    match cli.command {
        Commands::NewDb { force } => cmd_new_db(&config, force),
        Commands::UpgradeDb => cmd_upgrade_db(&config),
        Commands::Info => cmd_info(&config),
        Commands::DumpEntries { kind } => cmd_dump_entries(&config, kind.map(EntryKind::from)),
        Commands::SampleConfig => cmd_sample_config(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::new(DEFAULT_DB_PATH),
    };
    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_logging(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let mut log_config = if cli.trace {
        LogConfig::verbose().with_level(ledgersync_common::LogLevel::Trace)
    } else if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::from(&config.logging)
    };
    let format = cli
        .log_format
        .map(LogFormat::from)
        .unwrap_or(config.logging.format);
    log_config = log_config.with_format(format);

    logging::init(&log_config)?;
    tracing::debug!(path = ?cli.config, "Logging initialized");
    Ok(())
}

fn cmd_new_db(config: &Config, force: bool) -> anyhow::Result<()> {
    let path = &config.database.path;
    commands::new_db(path, force)?;
    println!("Database ready at: {}", path.display());
    Ok(())
}

fn cmd_upgrade_db(config: &Config) -> anyhow::Result<()> {
    let version = commands::upgrade_db(&config.database.path)?;
    println!("Database schema is at version {version}");
    Ok(())
}

fn cmd_info(config: &Config) -> anyhow::Result<()> {
    println!("ledgersync {}", env!("CARGO_PKG_VERSION"));
    println!("Database: {}", config.database.path.display());
    if !config.database.path.exists() {
        println!();
        println!("Note: Database does not exist. Run 'new-db' to create it.");
        return Ok(());
    }
    let info = commands::database_info(config)?;
    print!("{info}");
    Ok(())
}

fn cmd_dump_entries(config: &Config, kind: Option<EntryKind>) -> anyhow::Result<()> {
    if !config.database.path.exists() {
        anyhow::bail!(
            "No database at {}. Run 'new-db' to create it.",
            config.database.path.display()
        );
    }
    for value in commands::dump_entries(&config.database.path, kind)? {
        println!("{}", serde_json::to_string(&value)?);
    }
    Ok(())
}

fn cmd_sample_config() -> anyhow::Result<()> {
    print!("{}", commands::sample_config()?);
    Ok(())
}
