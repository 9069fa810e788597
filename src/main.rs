use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use toybox_fulfillment::application::engine::FulfillmentEngine;
use toybox_fulfillment::config::Settings;
use toybox_fulfillment::domain::ports::DatabaseRef;
use toybox_fulfillment::infrastructure::clock::SystemClock;
use toybox_fulfillment::infrastructure::gateway::MockGateway;
use toybox_fulfillment::infrastructure::in_memory::InMemoryDatabase;
use toybox_fulfillment::infrastructure::seed::seed_demo_catalog;
use toybox_fulfillment::interfaces::csv::toy_box_writer::ToyBoxWriter;
use toybox_fulfillment::interfaces::jsonl::command_reader::CommandReader;
use toybox_fulfillment::telemetry::init_tracing;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands, one JSON object per line
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    #[command(flatten)]
    settings: Settings,
}

#[cfg(feature = "storage-rocksdb")]
fn open_database(path: PathBuf) -> Result<InMemoryDatabase> {
    use toybox_fulfillment::infrastructure::rocksdb::RocksDBStore;
    RocksDBStore::open_database(path).into_diagnostic()
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_database(_path: PathBuf) -> Result<InMemoryDatabase> {
    eprintln!(
        "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
    );
    Ok(InMemoryDatabase::new())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing("warn");

    let db: DatabaseRef = match cli.db_path {
        Some(path) => Arc::new(open_database(path)?),
        None => Arc::new(InMemoryDatabase::new()),
    };
    seed_demo_catalog(db.as_ref()).await.into_diagnostic()?;

    let settings = cli.settings;
    let gateway = Arc::new(MockGateway::new(
        settings.gateway_latency(),
        settings.gateway_success_rate,
    ));
    let engine = FulfillmentEngine::new(db, Arc::new(SystemClock), gateway, settings);

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(BufReader::new(file));
    for command in reader.commands() {
        match command {
            Ok(command) => match command.apply(&engine).await {
                Ok(outcome) => tracing::debug!(%outcome, "applied command"),
                Err(e) => eprintln!("Error applying command: {}", e),
            },
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    let boxes = engine.all_toy_boxes().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = ToyBoxWriter::new(stdout.lock());
    writer.write_boxes(&boxes).into_diagnostic()?;

    Ok(())
}
