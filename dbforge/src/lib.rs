//! Library side of the `dbforge` binary.
//!
//! Holds the argument definitions, the merging of command-line overrides
//! into the configuration file, and database URL resolution, so they can
//! be tested without spawning the binary.

use clap::{Args, Parser, Subcommand};
use dbforge_core::security::SecureConfig;
use dbforge_core::{AppConfig, DbForgeError, Result, RunSummary};
use std::env;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Environment variable holding a complete database URL.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Environment variable pointing at the secure configuration file.
pub const SECURE_CONFIG_ENV: &str = "DBFORGE_SECURE_CONFIG";

#[derive(Debug, Parser)]
#[command(name = "dbforge")]
#[command(about = "Convert filtered DBF records into SQL INSERT statements")]
#[command(version)]
#[command(long_about = "
DBForge - DBF (dBASE) to SQL conversion

Streams the records of a DBF table through the configured filters and
turns every accepted record into an INSERT statement. Statements are
written to a preview file, executed against a database, or both.

CREDENTIALS:
- DATABASE_URL environment variable
- Secure configuration file (--secure-config or DBFORGE_SECURE_CONFIG)

SUPPORTED TARGETS:
- PostgreSQL (postgres://)
- SQLite (sqlite:// or .db/.sqlite files)

EXAMPLES:
  dbforge --config dbforge.json
  dbforge convert --dbf data/CANCFDI.DBF --batch-size 500 --preview
  dbforge inspect data/CANCFDI.DBF
  DATABASE_URL=postgres://loader@localhost/ventas dbforge test
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Application configuration file
    #[arg(
        short,
        long,
        global = true,
        default_value = "dbforge.json",
        value_name = "FILE"
    )]
    pub config: PathBuf,

    /// Secure configuration file with database credentials
    #[arg(long, global = true, env = "DBFORGE_SECURE_CONFIG", value_name = "FILE")]
    pub secure_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert the configured DBF table (default)
    Convert(ConvertArgs),
    /// Show table name, record count and fields of a DBF file
    Inspect(InspectArgs),
    /// Test the database connection
    Test,
}

/// Overrides applied on top of the configuration file.
#[derive(Debug, Default, Clone, Args)]
pub struct ConvertArgs {
    /// DBF file to convert
    #[arg(long, value_name = "FILE")]
    pub dbf: Option<PathBuf>,

    /// Directory receiving the preview file
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Accepted records per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Write statements to the preview file
    #[arg(long, conflicts_with = "no_preview")]
    pub preview: bool,

    /// Do not write a preview file
    #[arg(long)]
    pub no_preview: bool,

    /// Execute statements against the database
    #[arg(long)]
    pub execute: bool,

    /// Target table name
    #[arg(long, value_name = "NAME")]
    pub table: Option<String>,

    /// Stop after this many accepted records
    #[arg(long, value_name = "N")]
    pub max_records: Option<usize>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// DBF file to inspect
    #[arg(value_name = "DBF")]
    pub dbf: PathBuf,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,
}

impl Cli {
    /// The subcommand to run; `convert` without overrides when omitted.
    pub fn resolved_command(&self) -> Command {
        match &self.command {
            Some(Command::Convert(args)) => Command::Convert(args.clone()),
            Some(Command::Inspect(args)) => Command::Inspect(InspectArgs {
                dbf: args.dbf.clone(),
            }),
            Some(Command::Test) => Command::Test,
            None => Command::Convert(ConvertArgs::default()),
        }
    }
}

/// Applies command-line overrides to a loaded configuration.
pub fn apply_overrides(config: &mut AppConfig, args: &ConvertArgs) {
    if let Some(dbf) = &args.dbf {
        config.paths.dbf_path = Some(dbf.clone());
    }
    if let Some(dir) = &args.output_dir {
        config.paths.sql_output = dir.clone();
    }
    if let Some(batch_size) = args.batch_size {
        config.features.batch_size = batch_size;
    }
    if args.preview {
        config.features.preview_mode = true;
    }
    if args.no_preview {
        config.features.preview_mode = false;
    }
    if args.execute {
        config.features.execute_query = true;
    }
    if let Some(table) = &args.table {
        config.features.target_table_name = Some(table.clone());
    }
    if let Some(max_records) = args.max_records {
        config.features.max_records = Some(max_records);
    }
}

/// Loads the configuration file and merges the overrides into it.
///
/// # Errors
/// Returns the load error, or a configuration error when the merged
/// settings are invalid.
pub fn resolve_settings(config_path: &Path, args: &ConvertArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(&mut config, args);
    config.validate()?;
    Ok(config)
}

/// Where the database URL came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// `DATABASE_URL` environment variable
    Environment,
    /// Secure configuration file
    SecureConfig(PathBuf),
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Environment => write!(f, "{} environment variable", DATABASE_URL_ENV),
            CredentialSource::SecureConfig(path) => {
                write!(f, "secure configuration '{}'", path.display())
            }
        }
    }
}

/// Resolves the database URL from secure sources.
///
/// `DATABASE_URL` wins over the secure configuration file.
///
/// # Security
/// The URL is returned in a zeroizing container and is never logged here.
///
/// # Errors
/// Returns a configuration error when no source provides a URL, or the
/// secure configuration file cannot be read.
pub fn get_database_url(
    secure_config: Option<&Path>,
) -> Result<(Zeroizing<String>, CredentialSource)> {
    if let Ok(url) = env::var(DATABASE_URL_ENV) {
        let url = Zeroizing::new(url);
        if !url.trim().is_empty() {
            return Ok((url, CredentialSource::Environment));
        }
    }

    if let Some(path) = secure_config {
        let url = SecureConfig::load(path)?.database_url()?;
        return Ok((url, CredentialSource::SecureConfig(path.to_path_buf())));
    }

    Err(DbForgeError::configuration(format!(
        "Database connection information required. Set {} or use --secure-config ({}).",
        DATABASE_URL_ENV, SECURE_CONFIG_ENV
    )))
}

/// Human-readable run report printed after `convert`.
pub fn format_summary(summary: &RunSummary, preview: Option<&Path>) -> String {
    let mut lines = vec![
        format!("Table:               {}", summary.table),
        format!("Insert mode:         {}", summary.insert_mode),
        format!("Records read:        {}", summary.records_read),
        format!("Records matched:     {}", summary.records_matched),
        format!("Records filtered:    {}", summary.records_filtered_out),
        format!("Records skipped:     {}", summary.records_skipped),
        format!("Batches flushed:     {}", summary.batches_flushed),
        format!("Statements:          {}", summary.statements_generated),
    ];
    if summary.rows_affected > 0 {
        lines.push(format!("Rows inserted:       {}", summary.rows_affected));
    }
    if let Some(path) = preview {
        lines.push(format!("Preview:             {}", path.display()));
    }
    lines.push(format!("Duration:            {} ms", summary.duration_ms));
    lines.join("\n")
}
