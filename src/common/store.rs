//! Durable persistence of user-authored strategies.
//!
//! The store keeps an authoritative in-memory copy guarded by one lock and
//! mirrors every mutation to a single JSON document on disk. Read failures
//! degrade to the empty set and write failures are logged, never raised, so
//! a transient storage problem cannot abort a trading cycle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use crate::strategies::Strategy;

const STORE_FILE: &str = "strategies.json";

/// Strategy store backed by a single JSON file under the data directory.
#[derive(Debug)]
pub struct StrategyStore {
    path: PathBuf,
    inner: Mutex<Vec<Strategy>>,
}

impl StrategyStore {
    /// Open the store, loading any previously persisted strategy set.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        let path = data_dir.join(STORE_FILE);
        let strategies = read_from_disk(&path);
        Ok(Self {
            path,
            inner: Mutex::new(strategies),
        })
    }

    /// Full ordered strategy set. Never fails; an unavailable scope reads
    /// as empty.
    pub fn load(&self) -> Vec<Strategy> {
        self.inner.lock().unwrap().clone()
    }

    /// Replace the full set. Atomic from a concurrent reader's perspective:
    /// a `load()` racing this call observes either the old or the new set.
    pub fn save(&self, strategies: Vec<Strategy>) {
        let mut guard = self.inner.lock().unwrap();
        *guard = strategies;
        self.persist(&guard);
    }

    /// Insert a strategy, or replace the one with the same identifier.
    pub fn upsert(&self, strategy: Strategy) {
        let mut guard = self.inner.lock().unwrap();
        match guard.iter_mut().find(|s| s.id == strategy.id) {
            Some(existing) => *existing = strategy,
            None => guard.push(strategy),
        }
        self.persist(&guard);
    }

    /// Delete by identifier. Returns whether anything was removed.
    pub fn remove(&self, id: &str) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let before = guard.len();
        guard.retain(|s| s.id != id);
        let removed = guard.len() != before;
        if removed {
            self.persist(&guard);
        }
        removed
    }

    /// Flip the enabled flag. Returns whether the strategy exists.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let Some(strategy) = guard.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        strategy.enabled = enabled;
        self.persist(&guard);
        true
    }

    /// Record an evaluation timestamp. In-memory only; evaluation times are
    /// runtime state and not worth a disk write per poll.
    pub fn touch(&self, id: &str, at: DateTime<Utc>) {
        let mut guard = self.inner.lock().unwrap();
        if let Some(strategy) = guard.iter_mut().find(|s| s.id == id) {
            strategy.last_evaluated_at = Some(at);
        }
    }

    /// Strategies owned by the given wallet, in stored order.
    pub fn for_wallet(&self, wallet: &Pubkey) -> Vec<Strategy> {
        let wallet = wallet.to_string();
        self.inner
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.wallet == wallet)
            .cloned()
            .collect()
    }

    // Write-then-rename so a crash mid-write cannot corrupt the document.
    fn persist(&self, strategies: &[Strategy]) {
        let result = (|| -> Result<()> {
            let json = serde_json::to_vec_pretty(strategies)?;
            let tmp = self.path.with_extension("json.tmp");
            fs::write(&tmp, json)?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!(
                path = %self.path.display(),
                error = %format!("{e:#}"),
                "failed to persist strategies, continuing on in-memory state"
            );
        }
    }
}

fn read_from_disk(path: &Path) -> Vec<Strategy> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "strategy store unreadable, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str(&contents) {
        Ok(strategies) => strategies,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "strategy store corrupt, starting empty");
            Vec::new()
        }
    }
}
