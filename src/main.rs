//! litepersist CLI - JSON documents in a SQLite table

use anyhow::Context;
use clap::{Parser, Subcommand};
use litepersist::config::{self, ConnectionParams, PersistenceConfig};
use litepersist::data::generate_id;
use litepersist::{IdentifiableJsonSqlitePersistence, PagingParams, Row};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_TABLE: &str = "documents";

#[derive(Parser)]
#[command(name = "litepersist")]
#[command(version = "0.0.1")]
#[command(about = "Store and query JSON documents in a SQLite table")]
#[command(long_about = r#"
litepersist keeps JSON documents in a two-column SQLite table (id, data).

Example usage:
  litepersist init --database ./data/app.db --table notes
  litepersist create --json '{"title": "hello"}'
  litepersist list --filter "json_extract(data, '$.title')='hello'" --total
  litepersist patch --id <ID> --json '{"done": true}'
"#)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Table name (overrides the config)
    #[arg(short, long, global = true)]
    table: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file for the current settings
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Insert a document, generating an id when missing
    Create {
        /// Document as a JSON object
        #[arg(short, long)]
        json: String,
    },

    /// Insert or replace a document by id
    Put {
        /// Document as a JSON object
        #[arg(short, long)]
        json: String,
    },

    /// Get a document by id
    Get {
        #[arg(short, long)]
        id: String,
    },

    /// List documents page by page
    List {
        /// SQL condition, e.g. "json_extract(data, '$.key')='a'"
        #[arg(short, long)]
        filter: Option<String>,

        /// SQL ordering, e.g. "id DESC"
        #[arg(short, long)]
        sort: Option<String>,

        #[arg(long)]
        skip: Option<i64>,

        #[arg(long)]
        take: Option<i64>,

        /// Include the total count
        #[arg(long)]
        total: bool,
    },

    /// Count documents
    Count {
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Pick one document at random
    Random {
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Merge fields into a stored document
    Patch {
        #[arg(short, long)]
        id: String,

        /// Fields as a JSON object
        #[arg(short, long)]
        json: String,
    },

    /// Delete documents by id
    Delete {
        #[arg(short, long, num_args = 1.., required = true)]
        id: Vec<String>,
    },

    /// Delete every document in the table
    Clear,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let settings = build_config(&cli)?;

    if let Commands::Init { force } = cli.command {
        let path = cli.config.clone().unwrap_or_else(config::default_config_path);
        config::write_config(&path, &settings, force)?;
        tracing::info!("Wrote config to {}", path.display());
        return Ok(());
    }

    for connection in settings.connection_params() {
        if let Some(database) = connection.database.as_deref() {
            config::ensure_db_dir(Path::new(database))?;
        }
    }

    let trace_id = generate_id();
    let table = settings.table_name().unwrap_or(DEFAULT_TABLE).to_string();
    let mut persistence = IdentifiableJsonSqlitePersistence::<Row>::new(table);
    persistence.configure(&settings);
    persistence.ensure_table(None, None);
    persistence.open(&trace_id)?;

    let result = run(&persistence, &trace_id, cli.command);
    persistence.close(&trace_id)?;
    result
}

fn run(
    persistence: &IdentifiableJsonSqlitePersistence<Row>,
    trace_id: &str,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Init { .. } => {}

        Commands::Create { json } => {
            let created = persistence.create(trace_id, &parse_object(&json)?)?;
            print_json(&created)?;
        }

        Commands::Put { json } => {
            let stored = persistence.set(trace_id, &parse_object(&json)?)?;
            print_json(&stored)?;
        }

        Commands::Get { id } => {
            let item = persistence.get_one_by_id(trace_id, &id)?;
            print_json(&item)?;
        }

        Commands::List { filter, sort, skip, take, total } => {
            let page = persistence.get_page_by_filter(
                trace_id,
                filter.as_deref(),
                Some(PagingParams::new(skip, take, total)),
                sort.as_deref(),
                None,
            )?;
            print_json(&page)?;
        }

        Commands::Count { filter } => {
            let count = persistence.get_count_by_filter(trace_id, filter.as_deref())?;
            println!("{}", count);
        }

        Commands::Random { filter } => {
            let item = persistence.get_one_random(trace_id, filter.as_deref())?;
            print_json(&item)?;
        }

        Commands::Patch { id, json } => {
            let patched = persistence.update_partially(trace_id, &id, &parse_object(&json)?)?;
            print_json(&patched)?;
        }

        Commands::Delete { id } => {
            if let [single] = id.as_slice() {
                let deleted = persistence.delete_by_id(trace_id, single)?;
                print_json(&deleted)?;
            } else {
                let deleted = persistence.delete_by_ids(trace_id, &id)?;
                println!("{}", deleted);
            }
        }

        Commands::Clear => {
            persistence.clear(trace_id)?;
            tracing::info!("Cleared table {}", persistence.table_name());
        }
    }

    Ok(())
}

/// Config file (if any) with command-line overrides applied
fn build_config(cli: &Cli) -> anyhow::Result<PersistenceConfig> {
    let mut settings = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    if let Some(database) = &cli.database {
        settings.connections.clear();
        settings.connection = Some(ConnectionParams::from_database(database.to_string_lossy()));
    }
    if settings.connection_params().is_empty() {
        let cwd = std::env::current_dir()?;
        let database = config::default_database_path_in(&cwd);
        settings.connection = Some(ConnectionParams::from_database(database.to_string_lossy()));
    }

    if let Some(table) = &cli.table {
        settings.table = Some(table.clone());
    } else if settings.table_name().is_none() {
        settings.table = Some(DEFAULT_TABLE.to_string());
    }

    Ok(settings)
}

fn parse_object(json: &str) -> anyhow::Result<Row> {
    serde_json::from_str(json).context("expected a JSON object")
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
