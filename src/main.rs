use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};

use alltime_ledger::config::{load_or_create_config, Config};
use alltime_ledger::db_manager::DbManager;
use alltime_ledger::metadata::{
    ItunesCatalog, MemoryMetadataCache, MetadataCache, MetadataResolver, RetryPolicy,
    SqliteMetadataCache, TieredMetadataCache,
};
use alltime_ledger::model::{LeaderboardEntry, LeaderboardSnapshot};
use alltime_ledger::scoring::ScoringPolicy;
use alltime_ledger::snapshot_cache::{SnapshotCache, SqliteSnapshotStore};
use alltime_ledger::source::WikipediaSource;

const DEFAULT_TOP: usize = 25;

#[derive(Parser, Debug)]
#[command(name = "alltime-ledger", about = "All-time Top 2000 leaderboard")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the leaderboard, rebuilding it when the cached snapshot is stale
    Show {
        #[arg(long, default_value_t = DEFAULT_TOP)]
        top: usize,
    },
    /// Rebuild the leaderboard now
    Refresh,
    /// Resolve artwork and preview URLs for the top songs
    Enrich {
        #[arg(long, default_value_t = DEFAULT_TOP)]
        top: usize,
    },
    /// Resolve artwork and preview URLs for one song
    Lookup { artist: String, title: String },
    /// Forget cached catalog misses so they are looked up again
    ClearMisses,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = load_or_create_config();
    let db = Arc::new(Mutex::new(DbManager::new()?));

    match cli.command.unwrap_or(Command::Show { top: DEFAULT_TOP }) {
        Command::Show { top } => {
            let snapshot = snapshot_cache(&config, &db).get_leaderboard()?;
            print_leaderboard(&snapshot, top);
        }
        Command::Refresh => {
            let snapshot = snapshot_cache(&config, &db).refresh()?;
            info!(
                "Leaderboard rebuilt: {} songs, cutoff {}",
                snapshot.entries.len(),
                snapshot.effective_cutoff_year
            );
            print_leaderboard(&snapshot, DEFAULT_TOP);
        }
        Command::Enrich { top } => {
            let snapshot = snapshot_cache(&config, &db).get_leaderboard()?;
            let entries = snapshot.top(top);
            let pairs = entries
                .iter()
                .map(|entry| (entry.record.artist.clone(), entry.record.title.clone()))
                .collect();
            let resolver = Arc::new(metadata_resolver(&config, &db));
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let resolved = runtime.block_on(resolver.resolve_many(pairs));
            for (entry, metadata) in entries.iter().zip(resolved) {
                println!(
                    "{:>5}. {} - {}\n       cover:   {}\n       preview: {}",
                    entry.all_time_rank,
                    entry.record.artist,
                    entry.record.title,
                    metadata.cover_url.as_deref().unwrap_or("-"),
                    metadata.preview_url.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Lookup { artist, title } => {
            let resolver = metadata_resolver(&config, &db);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let metadata = runtime.block_on(resolver.resolve_metadata(&artist, &title));
            println!("cover:   {}", metadata.cover_url.as_deref().unwrap_or("-"));
            println!("preview: {}", metadata.preview_url.as_deref().unwrap_or("-"));
        }
        Command::ClearMisses => {
            let removed = SqliteMetadataCache::new(Arc::clone(&db)).clear_negative_entries()?;
            println!("Removed {removed} cached catalog misses");
        }
    }
    Ok(())
}

fn snapshot_cache(config: &Config, db: &Arc<Mutex<DbManager>>) -> SnapshotCache {
    SnapshotCache::new(
        Arc::new(SqliteSnapshotStore::new(Arc::clone(db))),
        Arc::new(WikipediaSource::new(&config.source)),
        ScoringPolicy::from(&config.scoring),
        config.snapshot.ttl(),
    )
}

fn metadata_resolver(config: &Config, db: &Arc<Mutex<DbManager>>) -> MetadataResolver {
    let tiers: Vec<Arc<dyn MetadataCache>> = vec![
        Arc::new(MemoryMetadataCache::default()),
        Arc::new(SqliteMetadataCache::new(Arc::clone(db))),
    ];
    MetadataResolver::new(
        Arc::new(TieredMetadataCache::new(tiers)),
        Arc::new(ItunesCatalog::new(&config.metadata)),
        RetryPolicy::from(&config.metadata),
    )
}

fn rank_change_label(entry: &LeaderboardEntry) -> String {
    match entry.rank_change() {
        None => "new".to_string(),
        Some(0) => "=".to_string(),
        Some(change) if change > 0 => format!("+{change}"),
        Some(change) => change.to_string(),
    }
}

fn print_leaderboard(snapshot: &LeaderboardSnapshot, top: usize) {
    println!(
        "All-time leaderboard through {} ({} songs)",
        snapshot.effective_cutoff_year,
        snapshot.entries.len()
    );
    for entry in snapshot.top(top) {
        let year = if entry.record.release_year > 0 {
            format!(" ({})", entry.record.release_year)
        } else {
            String::new()
        };
        println!(
            "{:>5}. {:>5} {:>7}  {} - {}{}  [{} editions]",
            entry.all_time_rank,
            rank_change_label(entry),
            entry.total_score,
            entry.record.artist,
            entry.record.title,
            year,
            entry.record.editions_listed()
        );
    }
}
