//! Wallet registry and reload coordination.
//!
//! Holds the set of live wallet sessions. A reload procedure can be
//! installed (last registration wins) and invoked through
//! [`WalletRegistry::reload_wallets`], which rebuilds the whole session set
//! as one atomic swap: a reader of the registry sees either the fully old
//! or the fully new set, never a mix. Overlapping reload requests are
//! dropped; at most one reload executes at a time.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::session::{SessionStats, WalletSession};

/// Builds the replacement session set. Re-reads credentials so a reload
/// after an import picks up the new wallets.
pub type Reloader =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<WalletSession>>> + Send + Sync>;

struct SessionHandle {
    session: Arc<WalletSession>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Registry of live wallet sessions plus the reload coordinator.
pub struct WalletRegistry {
    sessions: RwLock<HashMap<Pubkey, SessionHandle>>,
    reloader: std::sync::Mutex<Option<Reloader>>,
    reload_gate: tokio::sync::Mutex<()>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            reloader: std::sync::Mutex::new(None),
            reload_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Install the reload procedure. Exactly one is active; the last
    /// registration wins.
    pub fn register_reloader(&self, reloader: Reloader) {
        *self.reloader.lock().unwrap() = Some(reloader);
    }

    /// Rebuild the full session set through the registered reloader.
    ///
    /// Safe to call with no reloader registered (a no-op). Serialized
    /// against itself: a call that arrives while a reload is in progress is
    /// dropped with a log line.
    pub async fn reload_wallets(&self) -> Result<()> {
        let Ok(_guard) = self.reload_gate.try_lock() else {
            warn!("wallet reload already in progress, dropping request");
            return Ok(());
        };

        let reloader = self.reloader.lock().unwrap().clone();
        let Some(reloader) = reloader else {
            debug!("no wallet reloader registered, nothing to do");
            return Ok(());
        };

        let new_sessions = reloader().await?;
        let installed = new_sessions.len();

        // install swaps the map in one write and only then drains the old
        // handles, so a concurrent reader sees the old set or the new set,
        // never an empty one.
        let replaced = self.sessions.read().await.len();
        self.install(new_sessions).await;
        info!(replaced, installed, "wallet session set reloaded");
        Ok(())
    }

    /// Spawn the given sessions and swap them in as the active set.
    ///
    /// Wallets are keyed by pubkey; if the incoming set carries the same
    /// pubkey twice the later session wins and the displaced one is stopped
    /// and awaited, never left running untracked.
    pub async fn install(&self, sessions: Vec<WalletSession>) {
        let mut new_map = HashMap::with_capacity(sessions.len());
        let mut displaced = Vec::new();
        for session in sessions {
            let session = Arc::new(session);
            let cancel = CancellationToken::new();
            let join = tokio::spawn(session.clone().run(cancel.clone()));
            let pubkey = session.pubkey();
            if let Some(previous) = new_map.insert(
                pubkey,
                SessionHandle {
                    session,
                    cancel,
                    join,
                },
            ) {
                warn!(wallet = %pubkey, "duplicate wallet in session set, stopping the displaced session");
                displaced.push(previous);
            }
        }
        drain(displaced).await;
        // Single swap under the write lock keeps the transition atomic for
        // readers.
        let old: Vec<SessionHandle> = {
            let mut sessions = self.sessions.write().await;
            let previous = std::mem::replace(&mut *sessions, new_map);
            previous.into_values().collect()
        };
        drain(old).await;
    }

    /// Remove and stop one session. Returns whether it existed.
    pub async fn remove(&self, wallet: &Pubkey) -> bool {
        let handle = self.sessions.write().await.remove(wallet);
        match handle {
            Some(handle) => {
                drain(vec![handle]).await;
                true
            }
            None => false,
        }
    }

    /// Cancel every session and wait for their loops to finish.
    pub async fn shutdown(&self) {
        let old: Vec<SessionHandle> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        let count = old.len();
        drain(old).await;
        info!(stopped = count, "wallet registry shut down");
    }

    /// Public keys of the active session set.
    pub async fn pubkeys(&self) -> Vec<Pubkey> {
        self.sessions.read().await.keys().copied().collect()
    }

    /// Statistics for every active session.
    pub async fn stats(&self) -> Vec<SessionStats> {
        self.sessions
            .read()
            .await
            .values()
            .map(|handle| handle.session.stats())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for WalletRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel and await a batch of session handles. Cancellation only takes
/// effect at suspension points, so an in-flight cycle either completes or
/// abandons cleanly; a panicked task is logged, not propagated.
async fn drain(handles: Vec<SessionHandle>) {
    for handle in &handles {
        handle.cancel.cancel();
    }
    for handle in handles {
        if let Err(e) = handle.join.await {
            warn!(wallet = %handle.session.pubkey(), error = %e, "session task ended abnormally");
        }
    }
}
