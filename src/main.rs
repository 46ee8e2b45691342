//! # Hyperstore CLI
//!
//! Command-line access to an array-set data directory.
//!
//! ## Usage
//!
//! ```bash
//! hyperstore create --id demo
//! hyperstore start demo 0 '{"dimensions":[{"name":"row","end":4}],"attributes":[{"name":"x","type":"float64"}]}'
//! hyperstore write demo 0/0/... values.json
//! hyperstore table-chunk demo 0 --rows 0-4 --columns 0 --sort 0:ascending
//! ```
//!
//! Logging follows `[logging]` in the configuration file. `HYPERSTORE_LOG`
//! overrides the level filter.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::OnceLock;

use hyperstore::{
    parse_array_list, parse_statistics_list, schema_from_json, ArrayStore, ByteOrder, Config,
    Encoded, LoggingConfig, ReadOutput,
};

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Hyperstore CLI.
#[derive(Parser, Debug)]
#[command(name = "hyperstore")]
#[command(about = "Store and query multi-dimensional array sets")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to hyperstore.toml in the working directory)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Override the storage data directory
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an empty array set
    Create {
        /// Id for the new set; generated when omitted
        #[arg(long)]
        id: Option<String>,
    },

    /// List array-set ids
    List,

    /// Delete an array set
    Delete { id: String },

    /// List the array indices of a set
    Arrays { id: String },

    /// Create or replace an array from a JSON schema
    Start {
        id: String,
        array: u64,
        /// `{"dimensions": [...], "attributes": [...]}`
        schema: String,
    },

    /// Delete one array
    DeleteArray { id: String, array: u64 },

    /// Write hyperchunks from a file (JSON list, or packed binary with --byteorder)
    Write {
        id: String,
        hyperchunks: String,
        file: PathBuf,
        #[arg(long)]
        byteorder: Option<ByteOrder>,
    },

    /// Read hyperchunks as JSON, or as packed binary with --byteorder
    Read {
        id: String,
        hyperchunks: String,
        #[arg(long)]
        byteorder: Option<ByteOrder>,
        /// Binary output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Array schemas and attribute statistics
    Metadata {
        id: String,
        /// `0;2;5`
        #[arg(long)]
        arrays: Option<String>,
        /// `0/1;2/0`
        #[arg(long)]
        statistics: Option<String>,
    },

    /// Table view of a 1-D array
    TableMetadata {
        id: String,
        array: u64,
        #[arg(long)]
        index: Option<String>,
    },

    /// Rows and columns of a table view
    TableChunk {
        id: String,
        array: u64,
        #[arg(long)]
        rows: String,
        #[arg(long)]
        columns: String,
        #[arg(long)]
        index: Option<String>,
        /// `column:ascending` or `column:descending`
        #[arg(long)]
        sort: Option<String>,
    },

    /// Sorted positions (or, with --unsorted, physical rows) of table rows
    TableIndices {
        id: String,
        array: u64,
        #[arg(long)]
        rows: String,
        #[arg(long)]
        index: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        unsorted: bool,
        #[arg(long)]
        byteorder: Option<ByteOrder>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {path}"))?,
        None => Config::load().unwrap_or_default(),
    };
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }

    init_tracing(&config.logging);

    let store = ArrayStore::new(config)?;
    run(&store, args.command)
}

fn run(store: &ArrayStore, command: Commands) -> Result<()> {
    match command {
        Commands::Create { id } => println!("{}", store.create_arrayset(id.as_deref())?),
        Commands::List => {
            for id in store.list_arraysets()? {
                println!("{id}");
            }
        }
        Commands::Delete { id } => store.delete_arrayset(&id)?,
        Commands::Arrays { id } => print_json(&store.array_indices(&id)?)?,
        Commands::Start { id, array, schema } => {
            let schema: serde_json::Value = serde_json::from_str(&schema).context("parsing schema")?;
            let (dimensions, attributes) = schema_from_json(&schema)?;
            print_json(store.start_array(&id, array, dimensions, attributes)?.metadata())?;
        }
        Commands::DeleteArray { id, array } => store.delete_array(&id, array)?,
        Commands::Write {
            id,
            hyperchunks,
            file,
            byteorder,
        } => {
            let data = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            store.write_hyperchunks(&id, &hyperchunks, &data, byteorder)?;
        }
        Commands::Read {
            id,
            hyperchunks,
            byteorder,
            output,
        } => match store.read(&id, &hyperchunks, byteorder)? {
            ReadOutput::Json(value) => print_json(&value)?,
            ReadOutput::Stream(stream) => {
                let mut sink: Box<dyn Write> = match output {
                    Some(path) => Box::new(fs::File::create(path)?),
                    None => Box::new(io::stdout().lock()),
                };
                for buffer in stream {
                    sink.write_all(&buffer?)?;
                }
                sink.flush()?;
            }
        },
        Commands::Metadata {
            id,
            arrays,
            statistics,
        } => {
            let arrays = arrays.as_deref().map(parse_array_list).transpose()?;
            let statistics = statistics.as_deref().map(parse_statistics_list).transpose()?;
            print_json(&store.metadata(&id, arrays.as_deref(), statistics.as_deref())?)?;
        }
        Commands::TableMetadata { id, array, index } => {
            print_json(&store.table_metadata(&id, array, index.as_deref())?)?;
        }
        Commands::TableChunk {
            id,
            array,
            rows,
            columns,
            index,
            sort,
        } => {
            let chunk = store.table_chunk(&id, array, &rows, &columns, index.as_deref(), sort.as_deref())?;
            print_json(&chunk)?;
        }
        Commands::TableIndices {
            id,
            array,
            rows,
            index,
            sort,
            unsorted,
            byteorder,
        } => {
            let encoded = if unsorted {
                store.table_unsorted_indices(&id, array, &rows, index.as_deref(), sort.as_deref(), byteorder)?
            } else {
                store.table_sorted_indices(&id, array, &rows, index.as_deref(), sort.as_deref(), byteorder)?
            };
            match encoded {
                Encoded::Json(value) => print_json(&value)?,
                Encoded::Binary(bytes) => {
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
            }
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    // HYPERSTORE_LOG takes precedence over the configured level
    let level = env::var("HYPERSTORE_LOG").unwrap_or_else(|_| logging_config.level.clone());
    let json = logging_config.format == "json";

    let (writer, guard) = if logging_config.file.is_empty() {
        tracing_appender::non_blocking(io::stderr())
    } else {
        match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&logging_config.file)
        {
            Ok(file) => tracing_appender::non_blocking(file),
            Err(e) => {
                eprintln!("ERROR: Unable to open log file '{}': {e}", logging_config.file);
                return;
            }
        }
    };
    let _ = TRACE_GUARD.set(guard);

    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(writer.clone())
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
