//! Strategy data model and the pluggable trigger evaluation capability.

pub mod evaluator;
pub mod model;

pub use evaluator::{StrategyEvaluator, ThresholdEvaluator};
pub use model::{Side, SizingRule, Strategy, TradeAction, TriggerCondition};
