mod config;
mod output;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pairjudge_core::RevisionPolicy;
use pairjudge_store::{Error as StoreError, JudgingEngine, RatingStore, SqliteStore};
use std::io::{self, BufRead, IsTerminal};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::PairjudgeConfig;

#[derive(Parser)]
#[command(name = "pairjudge", version, about = "Rank items by adaptive pairwise comparative judgment")]
struct Cli {
    /// SQLite database file (default: ./pairjudge.db)
    #[arg(long, global = true, env = "PAIRJUDGE_DB")]
    db: Option<PathBuf>,

    /// Path to config file (default: ~/.config/pairjudge/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create a default config file at ~/.config/pairjudge/config.toml
    Init,
    /// Add items to the rankable set
    Add(AddArgs),
    /// Present the next pair for a judging session
    Next {
        /// Judging session id; pairs already shown in it are never repeated
        #[arg(long)]
        session: String,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Record the winner of a presented comparison
    Judge {
        comparison: String,
        winner: String,
    },
    /// Change the winner of an already judged comparison
    Revise {
        comparison: String,
        winner: String,

        /// Override the configured revision policy: replay, restore or reject
        #[arg(long)]
        policy: Option<RevisionPolicy>,
    },
    /// Show the current ranking
    Rankings {
        /// Output JSON instead of table
        #[arg(long)]
        json: bool,
    },
    /// Show the Scale Separation Reliability of the current ratings
    Reliability,
}

#[derive(clap::Args)]
struct AddArgs {
    /// Item ids
    items: Vec<String>,

    /// File with one item per line, or a JSON array of strings
    #[arg(long = "items")]
    items_file: Option<PathBuf>,
}

/// Parse a string as either a JSON array of strings or plain text (one item per line).
fn parse_items_from_str(content: &str) -> Result<Vec<String>> {
    let trimmed = content.trim();
    if trimmed.starts_with('[') {
        let items: Vec<String> =
            serde_json::from_str(trimmed).context("File looks like JSON but failed to parse")?;
        Ok(items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    } else {
        Ok(trimmed
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

/// Load items from all sources: --items file, positional args, or stdin.
fn load_items(args: &AddArgs) -> Result<Vec<String>> {
    let mut items = Vec::new();

    if let Some(ref path) = args.items_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read items file {}", path.display()))?;
        items = parse_items_from_str(&content)?;
    }

    items.extend(args.items.iter().cloned());

    // From stdin (only if no file and no inline items)
    if items.is_empty() {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            bail!("No items provided. Pass item ids, --items <file>, or pipe items via stdin.");
        }
        let lines = stdin
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .context("Failed to read from stdin")?;
        items = parse_items_from_str(&lines.join("\n"))?;
    }

    Ok(items)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => config::config_path()?,
    };

    if let Commands::Init = cli.command {
        config::create_default_config(&config_path)?;
        println!("Created config at {}", config_path.display());
        println!("Edit it to set your database path, rating constants and revision policy.");
        return Ok(());
    }

    let cfg = config::load_config(&config_path)?;
    run(cli.command, cli.db, &cfg).await
}

async fn open_engine(
    db_path: &Path,
    cfg: &PairjudgeConfig,
    policy: Option<RevisionPolicy>,
) -> Result<JudgingEngine<SqliteStore>> {
    let store = SqliteStore::open(db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    JudgingEngine::new(store, cfg.engine_config(policy)).context("Invalid configuration")
}

async fn run(command: Commands, db: Option<PathBuf>, cfg: &PairjudgeConfig) -> Result<()> {
    let db_path = cfg.database(db);
    let policy = match &command {
        Commands::Revise { policy, .. } => *policy,
        _ => None,
    };
    let engine = open_engine(&db_path, cfg, policy).await?;

    match command {
        Commands::Init => {}
        Commands::Add(args) => {
            let items = load_items(&args)?;
            let mut added = 0;
            for id in &items {
                match engine.add_item(id).await {
                    Ok(_) => added += 1,
                    Err(StoreError::DuplicateItem(id)) => eprintln!("Skipping existing item \"{id}\""),
                    Err(e) => return Err(e).with_context(|| format!("Failed to add item \"{id}\"")),
                }
            }
            info!(added, requested = items.len(), "Added items");
            println!("Added {added} item(s) to {}", db_path.display());
        }
        Commands::Next { session, json } => match engine.next_pair(&session).await? {
            Some(comparison) => output::print_comparison(&comparison, json)?,
            None if json => println!("null"),
            None => println!("No informative pairs left for session \"{session}\""),
        },
        Commands::Judge { comparison, winner } => {
            let update = engine.apply_judgment(&comparison, &winner).await?;
            let judged = load_comparison(&engine, &comparison).await?;
            output::print_update(&winner, judged.loser_of(&winner)?, &update);
        }
        Commands::Revise {
            comparison, winner, ..
        } => {
            let update = engine.revise_judgment(&comparison, &winner).await?;
            let revised = load_comparison(&engine, &comparison).await?;
            output::print_update(&winner, revised.loser_of(&winner)?, &update);
            println!("Revised {} time(s)", revised.revision_count);
        }
        Commands::Rankings { json } => {
            let rankings = engine.rankings().await?;
            let reliability = engine.reliability().await?;
            let total = engine.store().judged_after(0).await?.len();
            if json {
                output::print_json(&rankings, reliability, total)?;
            } else {
                output::print_table(&rankings, reliability, total);
            }
        }
        Commands::Reliability => {
            println!("{:.4}", engine.reliability().await?);
        }
    }

    Ok(())
}

async fn load_comparison(
    engine: &JudgingEngine<SqliteStore>,
    comparison_id: &str,
) -> Result<pairjudge_core::Comparison> {
    engine
        .store()
        .load_comparison(comparison_id)
        .await?
        .ok_or_else(|| StoreError::UnknownComparison(comparison_id.to_string()).into())
}
