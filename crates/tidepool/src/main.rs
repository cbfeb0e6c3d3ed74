//! Tidepool: collection sync, cache and query toolkit
//!
//! Main binary with subcommands over a JSON data file:
//! - `query`: search, filter, sort and paginate documents
//! - `export`: write documents as CSV or JSON
//! - `validate`: check import rows against required/optional fields
//! - `stats`: load through the cache and report its contents

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tidepool_service::ExportFormat;
use tidepool_store::{FilterCriteria, SortCriteria};
use tidepool_sync::SyncConfig;

mod args;
mod commands;
mod source;

use args::{parse_bool_env, parse_filter, parse_sort};

#[derive(Parser)]
#[command(name = "tidepool")]
#[command(about = "Collection sync, cache and query toolkit", long_about = None)]
struct Cli {
    /// Maximum age of a cached snapshot, in seconds
    #[arg(long, global = true, env = "TIDEPOOL_CACHE_TTL", default_value = "300")]
    cache_ttl: u64,

    /// Follow live updates instead of loading once.
    /// Accepts "1", "true", "yes", or "on".
    #[arg(long, global = true, env = "TIDEPOOL_REALTIME", value_parser = parse_bool_env, default_value = "false")]
    realtime: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_ttl(Duration::from_secs(self.cache_ttl))
            .with_realtime(self.realtime)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search, filter and sort documents
    Query {
        /// JSON file holding an array of documents
        #[arg(long)]
        file: PathBuf,

        /// Case-insensitive text to search for
        #[arg(long)]
        search: Option<String>,

        /// Fields searched by --search
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Filter as field:operator:value (repeatable, AND-combined)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<FilterCriteria>,

        /// Sort as field or field:asc / field:desc
        #[arg(long, value_parser = parse_sort)]
        sort: Option<SortCriteria>,

        /// 1-based page number; omit to print every match
        #[arg(long)]
        page: Option<usize>,

        /// Items per page
        #[arg(long, default_value = "20")]
        page_size: usize,
    },

    /// Export documents as CSV or JSON
    Export {
        /// JSON file holding an array of documents
        #[arg(long)]
        file: PathBuf,

        /// Output format (csv or json)
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Fields to keep, in output order
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,

        /// Filter as field:operator:value (repeatable, AND-combined)
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<FilterCriteria>,

        /// Write to this path instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate import rows against a field schema
    Validate {
        /// JSON file holding an array of rows
        #[arg(long)]
        file: PathBuf,

        /// Fields every row must have
        #[arg(long, value_delimiter = ',', required = true)]
        required: Vec<String>,

        /// Fields rows may have without a warning
        #[arg(long, value_delimiter = ',')]
        optional: Vec<String>,
    },

    /// Load a collection through the cache and print cache statistics
    Stats {
        /// JSON file holding an array of documents
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tidepool=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.sync_config();

    match cli.command {
        Commands::Query {
            file,
            search,
            fields,
            filters,
            sort,
            page,
            page_size,
        } => {
            commands::query(
                &file,
                config,
                commands::QueryArgs {
                    search,
                    fields,
                    filters,
                    sort,
                    page,
                    page_size,
                },
            )
            .await
        }

        Commands::Export {
            file,
            format,
            fields,
            filters,
            output,
        } => commands::export(&file, format, fields, filters, output).await,

        Commands::Validate {
            file,
            required,
            optional,
        } => {
            if commands::validate(&file, required, optional).await? {
                Ok(())
            } else {
                Err(miette::miette!("validation failed: some rows have errors"))
            }
        }

        Commands::Stats { file } => commands::stats(&file, config).await,
    }
}
