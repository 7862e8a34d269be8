//! User-authored trading strategies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted trading rule owned by one wallet.
///
/// Strategies are immutable once created except for the `enabled` flag and
/// parameter edits, both of which go through the store so no partial write
/// is visible to a concurrent reader. The wallet reference is the public
/// key, not a live session: strategies outlive sessions and process
/// restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    /// Owning wallet public key, base58.
    pub wallet: String,
    /// Ordered trigger conditions; all must hold for the action to fire.
    pub conditions: Vec<TriggerCondition>,
    pub action: TradeAction,
    pub enabled: bool,
    #[serde(default)]
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

/// One threshold over an observed pool snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TriggerCondition {
    /// Pool price (quote per base) strictly above the threshold.
    PriceAbove(f64),
    /// Pool price strictly below the threshold.
    PriceBelow(f64),
    /// Quote-side reserve strictly above the threshold, in lamports.
    QuoteLiquidityAbove(u64),
    /// Quote-side reserve strictly below the threshold, in lamports.
    QuoteLiquidityBelow(u64),
}

/// What to do when the conditions hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAction {
    pub side: Side,
    pub sizing: SizingRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// How the trade amount is derived at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SizingRule {
    /// A fixed amount in lamports.
    FixedLamports(u64),
    /// A fraction of the wallet's current balance, in `(0, 1]`.
    PctOfBalance(f64),
}
