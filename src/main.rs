use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use rssd::config::Config;
use rssd::feed::{ingest_file, ingest_url, Ingested};
use rssd::storage::{Database, Flag, Item, StorageError, Store, ALL_ITEMS};

/// Get the config directory path (~/.config/rssd/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("rssd"))
}

#[derive(Parser, Debug)]
#[command(name = "rssd", version, about = "Ingest RSS feeds into a local SQLite store")]
struct Args {
    /// Database file (overrides `database_path` from the config file)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Config file (default: ~/.config/rssd/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a feed over HTTP and store it
    Add { url: String },
    /// Store a feed from a local XML file
    Load { file: PathBuf },
    /// Remove a feed and all of its items
    Remove { id: i64 },
    /// List items, newest first
    Items {
        /// Maximum rows to show (0 = all)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one item
    Show { id: i64 },
    /// Mark an item as read
    Read { id: i64 },
    /// Mark an item as unread
    Unread { id: i64 },
    /// Star an item
    Star { id: i64 },
    /// Remove the star from an item
    Unstar { id: i64 },
    /// Hide an item
    Ignore { id: i64 },
    /// Stop hiding an item
    Unignore { id: i64 },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode JSON output")?
    );
    Ok(())
}

fn print_item(item: &Item) {
    let mut marks = String::new();
    marks.push(if item.read { ' ' } else { '*' });
    marks.push(if item.starred { '★' } else { ' ' });
    marks.push(if item.ignored { '-' } else { ' ' });
    println!(
        "{:>6} {} {} {}  {}",
        item.id,
        marks,
        item.publication_date.format("%Y-%m-%d %H:%M"),
        item.title,
        item.link
    );
}

fn print_ingested(ingested: &Ingested) {
    println!(
        "Stored feed {} ({}): {} items",
        ingested.feed.id,
        ingested.feed.title,
        ingested.feed.items.len()
    );
    for skipped in &ingested.skipped {
        println!("  skipped {:?}: {}", skipped.item.link, skipped.reason);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = args
        .db
        .clone()
        .unwrap_or_else(|| config.database_path(&config_dir));
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(StorageError::Locked) => {
            eprintln!(
                "Error: the database at {} is locked by another process.",
                db_path.display()
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    run(&db, &config, &args).await
}

async fn run(store: &dyn Store, config: &Config, args: &Args) -> Result<()> {
    let options = config.ingest_options();

    match &args.command {
        Command::Add { url } => {
            let client = config.http_client().context("Failed to build HTTP client")?;
            let ingested = ingest_url(store, &client, url, &options)
                .await
                .with_context(|| format!("Failed to add feed {}", url))?;
            if args.json {
                print_json(&ingested)?;
            } else {
                print_ingested(&ingested);
            }
        }
        Command::Load { file } => {
            let ingested = ingest_file(store, file, &options)
                .await
                .with_context(|| format!("Failed to load feed from {}", file.display()))?;
            if args.json {
                print_json(&ingested)?;
            } else {
                print_ingested(&ingested);
            }
        }
        Command::Remove { id } => {
            let removed = store
                .remove_feed(*id)
                .await
                .with_context(|| format!("Failed to remove feed {}", id))?;
            if args.json {
                print_json(&serde_json::json!({ "feed_id": id, "removed_items": removed }))?;
            } else {
                println!("Removed feed {} ({} items)", id, removed);
            }
        }
        Command::Items { limit } => {
            let limit = limit.unwrap_or(config.list_limit);
            let items = store.list_items(limit).await.context("Failed to list items")?;
            if args.json {
                print_json(&items)?;
            } else if items.is_empty() {
                println!("No items.");
            } else {
                items.iter().for_each(print_item);
                if limit != ALL_ITEMS && items.len() == limit {
                    println!("(showing {}; use --limit 0 for all)", limit);
                }
            }
        }
        Command::Show { id } => {
            let item = store.get_item(*id).await?;
            if args.json {
                print_json(&item)?;
            } else {
                print_item(&item);
            }
        }
        Command::Read { id } => set_flag(store, *id, Flag::Read, true, args.json).await?,
        Command::Unread { id } => set_flag(store, *id, Flag::Read, false, args.json).await?,
        Command::Star { id } => set_flag(store, *id, Flag::Starred, true, args.json).await?,
        Command::Unstar { id } => set_flag(store, *id, Flag::Starred, false, args.json).await?,
        Command::Ignore { id } => set_flag(store, *id, Flag::Ignored, true, args.json).await?,
        Command::Unignore { id } => {
            set_flag(store, *id, Flag::Ignored, false, args.json).await?
        }
    }

    Ok(())
}

async fn set_flag(store: &dyn Store, id: i64, flag: Flag, value: bool, json: bool) -> Result<()> {
    store
        .set_flag(id, flag, value)
        .await
        .with_context(|| format!("Failed to update item {}", id))?;
    if json {
        print_json(&store.get_item(id).await?)?;
    }
    Ok(())
}
