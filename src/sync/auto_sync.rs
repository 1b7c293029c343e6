//! Background draining of the pending-operation queue.
//!
//! A drain runs on every offline-to-online edge. While online, a retry timer
//! drains again after a delay that backs off exponentially as long as drains
//! keep leaving failures behind.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::db::LocalStore;
use crate::network::{NetworkObserver, Transition};
use crate::remote::{check_server, HttpRemoteStore, RemoteStore};
use crate::sync::engine::{SyncEngine, SyncSummary};

/// Exponential retry delay with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Current delay plus up to 10% jitter.
    pub fn delay(&self) -> Duration {
        let spread = u64::try_from(self.current.as_millis() / 10).unwrap_or(u64::MAX);
        let jitter = if spread == 0 {
            0
        } else {
            rand::rng().random_range(0..=spread)
        };
        self.current.saturating_add(Duration::from_millis(jitter))
    }

    pub fn increase(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

pub struct AutoSync<R> {
    engine: Arc<SyncEngine<R>>,
    observer: NetworkObserver,
    backoff: Backoff,
}

impl<R: RemoteStore + 'static> AutoSync<R> {
    pub fn new(engine: Arc<SyncEngine<R>>, observer: NetworkObserver, config: &SyncConfig) -> Self {
        Self::with_backoff(
            engine,
            observer,
            Backoff::new(config.retry_interval(), config.max_backoff()),
        )
    }

    pub fn with_backoff(
        engine: Arc<SyncEngine<R>>,
        observer: NetworkObserver,
        backoff: Backoff,
    ) -> Self {
        Self {
            engine,
            observer,
            backoff,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Runs until `shutdown` flips or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut network = self.observer.subscribe();

        if self.observer.is_online() {
            self.drain_once().await;
        }

        loop {
            let online = self.observer.is_online();
            let delay = self.backoff.delay();

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                transition = network.next_transition() => match transition {
                    Some(Transition::WentOnline) => {
                        self.backoff.reset();
                        self.drain_once().await;
                    }
                    Some(Transition::WentOffline) => {
                        tracing::debug!("Offline, pausing retries");
                    }
                    None => break,
                },
                _ = tokio::time::sleep(delay), if online => {
                    self.drain_once().await;
                }
            }
        }

        tracing::debug!("Auto-sync stopped");
    }

    async fn drain_once(&mut self) -> Option<SyncSummary> {
        match self.engine.drain_all().await {
            Ok(summary) => {
                if summary.is_clean() {
                    self.backoff.reset();
                } else {
                    self.backoff.increase();
                    tracing::warn!(
                        "Auto-sync left {} operation(s) queued, retrying in {:?}",
                        summary.failed,
                        self.backoff.current()
                    );
                }
                if summary.synced > 0 {
                    tracing::info!("Auto-sync pushed {} operation(s)", summary.synced);
                }
                Some(summary)
            }
            Err(e) => {
                self.backoff.increase();
                tracing::warn!("Auto-sync failed: {}", e);
                None
            }
        }
    }
}

/// One-shot drain after a CLI write, when auto-sync is enabled.
///
/// Never fails the calling command: an unreachable server or a failed
/// drain leaves the operations queued for next time.
pub async fn try_auto_sync(store: &LocalStore, config: &SyncConfig) {
    if !config.auto_sync || !config.is_configured() {
        return;
    }

    let url = match config.server_url.as_ref() {
        Some(url) => url,
        None => return,
    };

    // Check server reachability first (fast fail)
    if !check_server(url).await {
        eprintln!("Auto-sync: server unreachable, changes stay queued");
        return;
    }

    let remote = match HttpRemoteStore::from_config(config) {
        Ok(remote) => remote,
        Err(_) => return,
    };

    match SyncEngine::new(store, remote).drain_all().await {
        Ok(summary) if summary.failed > 0 => {
            eprintln!(
                "Auto-sync: {} synced, {} still pending",
                summary.synced, summary.failed
            );
        }
        Ok(_) => {}
        Err(e) => eprintln!("Auto-sync failed: {}", e),
    }
}
