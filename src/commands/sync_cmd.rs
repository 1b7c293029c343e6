//! Sync CLI commands for pushing queued changes to the server.

use clap::{Args, Subcommand};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Config;
use crate::db::{LocalStore, QueueError};
use crate::models::Collection;
use crate::network::{spawn_probe, NetworkObserver};
use crate::remote::{check_server, HttpRemoteStore, RemoteError};
use crate::sync::{AutoSync, SyncEngine, SyncError, SyncIndicator};

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration, pending changes and server status
    Status,

    /// Keep syncing in the foreground, draining whenever the server comes back
    Watch,
}

impl SyncCommand {
    pub async fn run(&self, store: &LocalStore, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(store, config).await,
            Some(SyncSubcommand::Status) => self.status(store, config).await,
            Some(SyncSubcommand::Watch) => self.watch(store, config).await,
        }
    }

    async fn sync(&self, store: &LocalStore, config: &Config) -> Result<(), SyncCommandError> {
        let remote = HttpRemoteStore::from_config(&config.sync)?;
        let engine = SyncEngine::new(store, remote);

        println!("Syncing with server...");
        println!();

        let summary = engine.drain_all().await?;
        println!("  ✓ {} change(s) pushed", summary.synced);
        if summary.failed > 0 {
            println!("  ✗ {} change(s) still pending", summary.failed);
            for error in &summary.errors {
                println!("      {}", error);
            }
        }

        for collection in Collection::ALL {
            match engine.hydrate(collection).await {
                Ok(count) => println!("  ✓ {} refreshed ({} items)", collection, count),
                Err(e) => println!("  ✗ {} not refreshed: {}", collection, e),
            }
        }

        println!();
        if summary.is_clean() {
            println!("Sync complete.");
        } else {
            println!("Sync finished with errors. Pending changes will be retried.");
        }

        Ok(())
    }

    async fn status(&self, store: &LocalStore, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        print_pending(store).await?;
        println!();

        if !config.sync.is_configured() {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"http://localhost:8080\"");
            println!("    api_key: \"your-api-key\"");
            println!("    auto_sync: false");
            println!();
            println!("Or set environment variables:");
            println!("  CARTSENSE_SYNC_URL");
            println!("  CARTSENSE_SYNC_API_KEY");
            return Ok(());
        }

        let (Some(server_url), Some(api_key)) = (&config.sync.server_url, &config.sync.api_key)
        else {
            return Ok(());
        };

        println!("Server:    {}", server_url);
        println!(
            "API Key:   {}...",
            api_key.chars().take(8).collect::<String>()
        );
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!();

        if check_server(server_url).await {
            println!("Server status: ✓ connected");
        } else {
            println!("Server status: ✗ unreachable");
        }

        Ok(())
    }

    async fn watch(&self, store: &LocalStore, config: &Config) -> Result<(), SyncCommandError> {
        let remote = HttpRemoteStore::from_config(&config.sync)?;
        let server_url = remote.base_url().to_string();
        let engine = Arc::new(SyncEngine::new(store, remote));

        let observer = NetworkObserver::new(check_server(&server_url).await);
        let probe = spawn_probe(
            observer.clone(),
            server_url.clone(),
            config.sync.probe_interval(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = AutoSync::new(engine.clone(), observer, &config.sync).spawn(shutdown_rx);

        println!("Watching {} (Ctrl-C to stop)", server_url);
        println!("{}", engine.indicator().await?);

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Could not listen for Ctrl-C: {}", e);
        }

        let _ = shutdown_tx.send(true);
        let _ = worker.await;
        probe.abort();

        println!("{}", engine.indicator().await?);
        Ok(())
    }
}

async fn print_pending(store: &LocalStore) -> Result<(), SyncCommandError> {
    if !store.is_available() {
        println!("Local storage: unavailable");
        return Ok(());
    }

    let queue = store.queue();
    let total = queue.count().await?;
    println!("Local changes: {}", SyncIndicator::from_pending(total));
    for collection in Collection::ALL {
        let count = queue.count_by_collection(collection).await?;
        if count > 0 {
            println!("  {}: {}", collection, count);
        }
    }
    Ok(())
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    Remote(RemoteError),
    Sync(SyncError),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::Remote(RemoteError::NotConfigured) => write!(
                f,
                "Sync is not configured. Run 'cartsense sync status' for setup help."
            ),
            SyncCommandError::Remote(e) => write!(f, "{}", e),
            SyncCommandError::Sync(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::Remote(e) => Some(e),
            SyncCommandError::Sync(e) => Some(e),
        }
    }
}

impl From<RemoteError> for SyncCommandError {
    fn from(e: RemoteError) -> Self {
        SyncCommandError::Remote(e)
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::Sync(e)
    }
}

impl From<QueueError> for SyncCommandError {
    fn from(e: QueueError) -> Self {
        SyncCommandError::Sync(SyncError::Queue(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_configured_message() {
        let err = SyncCommandError::from(RemoteError::NotConfigured);
        assert!(err.to_string().contains("cartsense sync status"));
    }

    #[tokio::test]
    async fn test_print_pending_handles_unavailable_store() {
        let store = LocalStore::unavailable();
        assert!(print_pending(&store).await.is_ok());
    }
}
