//! hubstore Log Inspector
//!
//! Replays a log database file and prints its tables.

use std::path::PathBuf;

use clap::Parser;
use hubstore::config::LogStoreOptions;
use hubstore::logdb::LogStore;
use hubstore::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// hubstore log inspector
#[derive(Parser, Debug)]
#[command(name = "hubstore-inspect")]
#[command(about = "Replay a hubstore log file and list its tables")]
#[command(version)]
struct Args {
    /// Log database file
    path: PathBuf,

    /// Block size the file was written with
    #[arg(short, long, default_value = "4096")]
    block_size: u32,

    /// Print every row of every table
    #[arg(short, long)]
    dump: bool,

    /// Only show tables whose name contains this text
    #[arg(short, long)]
    table: Option<String>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hubstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("hubstore inspect v{}", hubstore::VERSION);

    if !args.path.is_file() {
        tracing::error!("No such file: {}", args.path.display());
        std::process::exit(1);
    }

    let options = LogStoreOptions {
        block_size: args.block_size,
        ..LogStoreOptions::default()
    };
    let mut store = match LogStore::open(&args.path, options) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open log: {}", e);
            std::process::exit(1);
        }
    };

    let stats = store.replay_stats();
    println!(
        "{} tables, {} records replayed, {} truncated",
        stats.tables, stats.records_replayed, stats.tables_truncated
    );

    for table in store.table_names() {
        if let Some(filter) = &args.table {
            if !table.contains(filter.as_str()) {
                continue;
            }
        }

        let count = store.record_count(&table).unwrap_or(0);
        println!("{} ({} rows)", table, count);

        if args.dump {
            for index in 0..count {
                match store.get_by_index(&table, index) {
                    Ok(raw) => println!(
                        "  [{}] key={} value={} metadata={}",
                        index,
                        describe(raw.key.as_deref()),
                        describe(raw.value.as_deref()),
                        describe(raw.metadata.as_deref()),
                    ),
                    Err(e) => println!("  [{}] <error: {}>", index, e),
                }
            }
        }
    }
}

fn describe(field: Option<&[u8]>) -> String {
    match field {
        None => "-".to_string(),
        Some(bytes) => match Value::from_bytes(bytes) {
            Ok(value) => value.to_string(),
            Err(_) => format!("<{} raw bytes>", bytes.len()),
        },
    }
}
