//! skirmish - run a scripted encounter and print its combat log

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skirmish::clock::SystemClock;
use skirmish::combat::RandomRoller;
use skirmish::db::Database;
use skirmish::encounter::{EncounterRepository, MemoryEncounterStore, SqliteEncounterStore};
use skirmish::sim::{Scenario, Simulation};
use skirmish::Config;

/// Turn-based encounter simulator
#[derive(Parser, Debug)]
#[command(name = "skirmish", version, about = "Run a scripted encounter")]
struct Args {
    /// Scenario TOML file
    #[arg(short, long)]
    scenario: PathBuf,

    /// Configuration file (SKIRMISH_* environment variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed the dice for a reproducible fight
    #[arg(long)]
    seed: Option<u64>,

    /// End the encounter without a winner after this many rounds
    #[arg(long, default_value_t = 20)]
    max_rounds: u32,

    /// SQLite database file; overrides storage.db_path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(args.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    let db_path = args
        .db
        .map(|p| p.to_string_lossy().into_owned())
        .or(config.storage.db_path.clone());
    let repo: Arc<dyn EncounterRepository> = match db_path.as_deref() {
        Some(path) => {
            info!("Storing encounters in {}", path);
            let db = Database::new(Some(path)).await?;
            Arc::new(SqliteEncounterStore::new(db.pool().clone()))
        }
        None => Arc::new(MemoryEncounterStore::new()),
    };
    let dice = match args.seed {
        Some(seed) => RandomRoller::seeded(seed),
        None => RandomRoller::new(),
    };

    let scenario = Scenario::load(&args.scenario)?;
    let sim = Simulation::new(repo, Arc::new(dice), Arc::new(SystemClock), &config.engine);
    let report = sim.run(&scenario, args.max_rounds).await?;

    for entry in report.encounter.log() {
        println!("{}", entry);
    }
    println!();
    println!("{}", report.summary());
    Ok(())
}
