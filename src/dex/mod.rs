//! Pool observation and swap planning.
//!
//! The engine treats the pool as an external collaborator: sessions only
//! consume timestamped [`PoolSnapshot`]s through the [`PoolObserver`]
//! boundary and turn trade decisions into instructions through the
//! [`ActionPlanner`] boundary.

pub mod amm;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};

use crate::strategies::Side;

pub use amm::{AmmPoolObserver, AmmSwapPlanner};

/// Observed pool state at one point in time.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub pool: Pubkey,
    /// Base-side vault balance, in the base token's smallest unit.
    pub base_reserve: u64,
    /// Quote-side vault balance, in lamports.
    pub quote_reserve: u64,
    /// Quote per base, derived from the reserves.
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

/// Supplies current pool state on demand.
#[async_trait]
pub trait PoolObserver: Send + Sync {
    async fn snapshot(&self, pool: &Pubkey) -> Result<PoolSnapshot>;
}

/// Turns a sized trade decision into submittable instructions.
///
/// Concrete sizing and instruction encoding are the pluggable half of the
/// strategy capability; the session resolves the sizing rule to lamports
/// before planning.
pub trait ActionPlanner: Send + Sync {
    fn plan(
        &self,
        wallet: &Pubkey,
        side: Side,
        amount_lamports: u64,
        snapshot: &PoolSnapshot,
    ) -> Result<Vec<Instruction>>;
}
