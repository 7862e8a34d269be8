//! Pluggable strategy trigger evaluation.
//!
//! The concrete predicate language is deliberately open: sessions only see
//! the [`StrategyEvaluator`] trait. [`ThresholdEvaluator`] is the default
//! implementation over the built-in threshold conditions.

use crate::dex::PoolSnapshot;
use crate::strategies::{Strategy, TriggerCondition};

/// Decides whether a strategy's trigger holds against observed pool state.
pub trait StrategyEvaluator: Send + Sync {
    fn evaluate(&self, strategy: &Strategy, snapshot: &PoolSnapshot) -> bool;
}

/// Default evaluator: every condition of the strategy must hold.
#[derive(Debug, Default)]
pub struct ThresholdEvaluator;

impl StrategyEvaluator for ThresholdEvaluator {
    fn evaluate(&self, strategy: &Strategy, snapshot: &PoolSnapshot) -> bool {
        strategy
            .conditions
            .iter()
            .all(|condition| condition_holds(condition, snapshot))
    }
}

fn condition_holds(condition: &TriggerCondition, snapshot: &PoolSnapshot) -> bool {
    match condition {
        TriggerCondition::PriceAbove(threshold) => snapshot.price > *threshold,
        TriggerCondition::PriceBelow(threshold) => snapshot.price < *threshold,
        TriggerCondition::QuoteLiquidityAbove(threshold) => snapshot.quote_reserve > *threshold,
        TriggerCondition::QuoteLiquidityBelow(threshold) => snapshot.quote_reserve < *threshold,
    }
}
