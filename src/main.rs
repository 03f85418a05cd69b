// ABOUTME: CLI entry point for sqlite-pg-migrator
// ABOUTME: Parses commands, resolves configuration and routes to command handlers

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sqlite_pg_migrator::commands;
use sqlite_pg_migrator::config::{self, MigrationConfig};

/// Environment variable consulted when no target is given
const TARGET_ENV_VAR: &str = "DATABASE_URI";

#[derive(Parser)]
#[command(name = "sqlite-pg-migrator")]
#[command(about = "Copy CMS tables from a SQLite backup into PostgreSQL", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct TableArgs {
    /// Path to migration config TOML (table list, key columns, column hints)
    #[arg(long = "config")]
    config_path: Option<String>,
    /// Only these tables, in this order (comma-separated)
    #[arg(long, value_delimiter = ',')]
    tables: Option<Vec<String>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Empty each destination table and reload it from the SQLite source
    Migrate {
        /// Path to the SQLite database file
        #[arg(long)]
        source: Option<String>,
        /// PostgreSQL connection string (defaults to $DATABASE_URI)
        #[arg(long)]
        target: Option<String>,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Bind brace-leading text as plain text unless a column hint says json
        #[arg(long)]
        no_detect_json: bool,
        #[command(flatten)]
        table_args: TableArgs,
    },
    /// Compare per-table row counts between source and target
    Verify {
        /// Path to the SQLite database file
        #[arg(long)]
        source: Option<String>,
        /// PostgreSQL connection string (defaults to $DATABASE_URI)
        #[arg(long)]
        target: Option<String>,
        #[command(flatten)]
        table_args: TableArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate {
            source,
            target,
            yes,
            no_detect_json,
            table_args,
        } => {
            let mut config = build_config(&table_args)?;
            if no_detect_json {
                config.detect_json = false;
            }
            let (source, target) = resolve_endpoints(source, target, &config)?;
            commands::migrate(&source, &target, config, yes).await?;
            Ok(())
        }
        Commands::Verify {
            source,
            target,
            table_args,
        } => {
            let config = build_config(&table_args)?;
            let (source, target) = resolve_endpoints(source, target, &config)?;
            commands::verify(&source, &target, config).await
        }
    }
}

fn build_config(args: &TableArgs) -> Result<MigrationConfig> {
    let mut config = match &args.config_path {
        Some(path) => config::load_config_from_file(path)?,
        None => MigrationConfig::default(),
    };
    if let Some(tables) = &args.tables {
        config
            .select_tables(tables)
            .context("Invalid --tables list")?;
    }
    Ok(config)
}

/// Command-line flags win over the config file; the target falls back to $DATABASE_URI
fn resolve_endpoints(
    source: Option<String>,
    target: Option<String>,
    config: &MigrationConfig,
) -> Result<(String, String)> {
    let source = source
        .or_else(|| config.source.clone())
        .context("No source database given. Pass --source <path/to/payload.db>")?;
    let target = target
        .or_else(|| config.target.clone())
        .or_else(|| std::env::var(TARGET_ENV_VAR).ok())
        .with_context(|| {
            format!(
                "No target database given. Pass --target or set {}",
                TARGET_ENV_VAR
            )
        })?;
    Ok((source, target))
}
