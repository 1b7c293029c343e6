//! Connectivity state shared across the process.
//!
//! One [`NetworkObserver`] is created at startup with a sampled initial
//! state. Clones share the same state. Subscribers are woken only when the
//! state actually flips.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::remote::check_server;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

#[derive(Clone, Debug)]
pub struct NetworkObserver {
    tx: watch::Sender<bool>,
}

impl NetworkObserver {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    /// Applies a connectivity event. Reports that do not change the state are
    /// ignored.
    pub fn report(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(
                "Network is now {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn is_offline(&self) -> bool {
        !self.is_online()
    }

    pub fn subscribe(&self) -> NetworkWatch {
        NetworkWatch {
            rx: self.tx.subscribe(),
        }
    }
}

pub struct NetworkWatch {
    rx: watch::Receiver<bool>,
}

impl NetworkWatch {
    /// Waits for the next state change.
    ///
    /// Returns `None` once every observer handle has been dropped.
    pub async fn next_transition(&mut self) -> Option<Transition> {
        self.rx.changed().await.ok()?;
        let online = *self.rx.borrow_and_update();
        Some(if online {
            Transition::WentOnline
        } else {
            Transition::WentOffline
        })
    }

    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Polls the server health endpoint and feeds the result into `observer`.
pub fn spawn_probe(observer: NetworkObserver, server_url: String, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let online = check_server(&server_url).await;
            observer.report(online);
        }
    })
}
