use clap::Parser;
use log::{info, warn};
use server::config::GameConfig;
use server::leaderboard::Leaderboard;
use server::network::{Server, ServerMessage, ServerOptions};
use server::seed_api::SeedApi;
use server::seeds::{SeedCatalog, SeedCategory};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Parses `category=weight`, e.g. `village=3`.
fn parse_weight(value: &str) -> Result<(SeedCategory, u32), String> {
    let (category, weight) = value
        .split_once('=')
        .ok_or_else(|| format!("expected <category>=<weight>, got '{}'", value))?;
    let category = category.parse::<SeedCategory>().map_err(|e| e.to_string())?;
    let weight = weight
        .parse::<u32>()
        .map_err(|e| format!("invalid weight '{}': {}", weight, e))?;
    Ok((category, weight))
}

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Scheduler ticks per second
    #[clap(short, long, default_value = "20")]
    tick_rate: u32,
    /// Maximum number of connected players
    #[clap(short, long, default_value = "32")]
    max_clients: usize,
    /// Seconds a battle or coop request stays open
    #[clap(long, default_value = "30")]
    request_timeout: u64,
    /// Countdown before a run starts, in seconds
    #[clap(long, default_value = "5")]
    countdown: u32,
    /// Seconds without activity before a participant is removed from their run
    #[clap(long, default_value = "300")]
    afk_timeout: u64,
    /// Directory holding one seed file per category
    #[clap(long)]
    seeds_dir: Option<PathBuf>,
    /// Category weight for seed selection, e.g. `village=3` (repeatable)
    #[clap(long = "seed-weight", value_parser = parse_weight)]
    seed_weights: Vec<(SeedCategory, u32)>,
    /// File the leaderboard is kept in
    #[clap(long)]
    leaderboard_file: Option<PathBuf>,
    /// Base URL of the filtered-seed service; the category filter is appended
    #[clap(long)]
    seed_api_url: Option<String>,
    /// Player names allowed to use admin commands (repeatable)
    #[clap(long = "admin")]
    admins: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let mut config = GameConfig {
        request_timeout: Duration::from_secs(args.request_timeout),
        countdown_seconds: args.countdown,
        afk_timeout: Duration::from_secs(args.afk_timeout),
        ..GameConfig::default()
    };
    if args.tick_rate > 0 {
        config.tick = Duration::from_secs_f64(1.0 / args.tick_rate as f64);
    }
    if config.afk_warning_lead >= config.afk_timeout {
        config.afk_warning_lead = config.afk_timeout / 5;
    }

    let weights: HashMap<SeedCategory, u32> = args.seed_weights.into_iter().collect();
    let seeds = match &args.seeds_dir {
        Some(dir) => SeedCatalog::load(dir, &weights)?,
        None => SeedCatalog::new(),
    };

    let leaderboard = match &args.leaderboard_file {
        Some(path) => Leaderboard::open(path, config.leaderboard_size),
        None => Leaderboard::new(config.leaderboard_size),
    };

    let seed_api = match &args.seed_api_url {
        Some(url) => Some(SeedApi::new(url)?),
        None => None,
    };

    let options = ServerOptions {
        config,
        max_clients: args.max_clients,
        seeds,
        leaderboard,
        seed_api,
        admins: args.admins,
        ..ServerOptions::default()
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, options).await?;

    let shutdown = server.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
        }
        let _ = shutdown.send(ServerMessage::Shutdown);
    });

    server.run().await?;
    Ok(())
}
