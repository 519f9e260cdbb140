//! DBF to SQL conversion tool.
//!
//! Reads a DBF table, keeps the records that pass the configured filters
//! and writes one INSERT statement per record (or per batch) to a preview
//! file, a target database, or both.
//!
//! # Security Guarantees
//! - Database URLs are resolved from the environment or a secure
//!   configuration file, never from the command line
//! - Credentials are zeroized after use and redacted in every log line

use anyhow::Context;
use clap::Parser;
use dbforge::{
    Cli, Command, ConvertArgs, InspectArgs, format_summary, get_database_url, resolve_settings,
};
use dbforge_core::error::redact_database_url;
use dbforge_core::executor::StatementExecutor;
use dbforge_core::logging::init_logging;
use dbforge_core::pipeline::preview_path;
use dbforge_core::{
    BatchPipeline, CancelFlag, ConnectionConfig, InsertGenerator, SqlDialect, create_executor,
    source,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    let outcome = match cli.resolved_command() {
        Command::Convert(args) => convert(&cli, &args).await,
        Command::Inspect(args) => inspect(&args),
        Command::Test => test_connection(&cli).await,
    };
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

/// Connects to the resolved target database.
async fn connect(cli: &Cli) -> anyhow::Result<Box<dyn StatementExecutor>> {
    let (database_url, source) = get_database_url(cli.secure_config.as_deref())?;
    info!("Database URL loaded from {}", source);

    let config = ConnectionConfig::from_url(&database_url)?;
    let executor = create_executor(&database_url, &config)
        .await
        .with_context(|| format!("failed to connect to {}", redact_database_url(&database_url)))?;
    Ok(executor)
}

/// Tests the database connection without converting anything.
async fn test_connection(cli: &Cli) -> anyhow::Result<()> {
    info!("Testing database connection...");
    let executor = connect(cli).await?;
    executor.test_connection().await?;

    info!("Connection test successful");
    println!(
        "Connection to {} database successful",
        executor.database_type()
    );
    Ok(())
}

fn inspect(args: &InspectArgs) -> anyhow::Result<()> {
    let table = source::open(&args.dbf)?;

    println!("File:     {}", table.path().display());
    println!("Table:    {}", table.table_name()?);
    println!("Records:  {}", table.record_count()?);
    println!("Fields:");
    for column in table.schema().columns() {
        println!(
            "  {:<11} {:<13} {}",
            column.name,
            format!("{:?} ({})", column.field_type, column.field_type),
            column.field_type.lane()
        );
    }
    Ok(())
}

async fn convert(cli: &Cli, args: &ConvertArgs) -> anyhow::Result<()> {
    let settings = resolve_settings(&cli.config, args)
        .with_context(|| format!("invalid configuration '{}'", cli.config.display()))?;
    let generation = settings.features.generation_config();

    let dbf_path = settings.dbf_path()?;
    let mut table = source::open(dbf_path)?;
    let table_name = settings.table_name()?;
    info!(
        "Converting '{}' into table '{}' ({} fields)",
        dbf_path.display(),
        table_name,
        table.schema().len()
    );

    // Filters are checked against the DBF schema before any record is read
    let filter = settings.filters.compile(table.schema())?;

    let executor = if generation.execute_query {
        Some(connect(cli).await?)
    } else {
        None
    };
    let dialect = executor
        .as_ref()
        .map_or(SqlDialect::default(), |e| SqlDialect::from(e.database_type()));
    let generator = InsertGenerator::new(
        table_name.as_str(),
        table.schema().columns().to_vec(),
        dialect,
    )?;

    let mut preview_file: Option<(PathBuf, BufWriter<File>)> = None;
    if generation.preview_mode {
        let path = preview_path(&settings.paths.sql_output, &table_name, generation.preview_ext);
        std::fs::create_dir_all(&settings.paths.sql_output).with_context(|| {
            format!(
                "failed to create output directory '{}'",
                settings.paths.sql_output.display()
            )
        })?;
        let file = File::create(&path)
            .with_context(|| format!("failed to create preview file '{}'", path.display()))?;
        info!("Writing preview to '{}'", path.display());
        preview_file = Some((path, BufWriter::new(file)));
    }

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current record");
            on_interrupt.cancel();
        }
    });

    let mut pipeline =
        BatchPipeline::new(generation, filter, generator).with_cancellation(cancel);
    if let Some((_, writer)) = preview_file.as_mut() {
        pipeline = pipeline.with_preview(writer);
    }
    if let Some(executor) = executor.as_deref() {
        pipeline = pipeline.with_executor(executor);
    }

    let summary = pipeline.run(table.records()).await?;
    drop(pipeline);

    if !cli.global.quiet {
        let preview = preview_file.as_ref().map(|(path, _)| path.as_path());
        println!("{}", format_summary(&summary, preview));
    }
    Ok(())
}
