use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartsense::commands::{ConfigCommand, MealCommand, ShoppingCommand, SyncCommand};
use cartsense::config::Config;
use cartsense::db::LocalStore;
use cartsense::remote::HttpRemoteStore;
use cartsense::sync::{try_auto_sync, SyncMealRepository, SyncShoppingRepository};

#[derive(Parser)]
#[command(name = "cartsense")]
#[command(version)]
#[command(about = "Offline-first shopping list and saved meals", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the shopping list
    Shopping(ShoppingCommand),

    /// Manage saved meals
    Meal(MealCommand),

    /// Sync with remote server
    Sync(SyncCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

impl Commands {
    /// Returns true if the command queued a mutation that should sync afterwards.
    fn is_write(&self) -> bool {
        match self {
            Commands::Shopping(cmd) => cmd.command.is_write(),
            Commands::Meal(cmd) => cmd.command.is_write(),
            Commands::Sync(_) | Commands::Config(_) => false,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cartsense=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    let Some(command) = cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    if let Commands::Config(cmd) = &command {
        return cmd.run(&config);
    }

    let store = match LocalStore::open(&config.database_path.value).await {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("Local storage unavailable: {}", e);
            LocalStore::unavailable()
        }
    };

    // Without local storage, reads and writes go straight to the server
    let fallback = if store.is_available() {
        None
    } else {
        match HttpRemoteStore::from_config(&config.sync) {
            Ok(remote) => {
                eprintln!("Warning: local storage unavailable, using the server directly");
                Some(remote)
            }
            Err(_) => None,
        }
    };

    match &command {
        Commands::Shopping(cmd) => {
            let repo = match fallback {
                Some(remote) => SyncShoppingRepository::with_fallback(&store, remote),
                None => SyncShoppingRepository::new(&store),
            };
            cmd.run(&repo).await?;
        }
        Commands::Meal(cmd) => {
            let repo = match fallback {
                Some(remote) => SyncMealRepository::with_fallback(&store, remote),
                None => SyncMealRepository::new(&store),
            };
            cmd.run(&repo).await?;
        }
        Commands::Sync(cmd) => {
            cmd.run(&store, &config).await?;
        }
        Commands::Config(_) => {}
    }

    // Auto-sync AFTER write commands (only if command succeeded)
    if command.is_write() {
        try_auto_sync(&store, &config.sync).await;
    }

    Ok(())
}
