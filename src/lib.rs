//! # Solana Pool Pilot
//!
//! A multi-wallet automated strategy execution engine for a Solana DEX
//! liquidity pool.
//!
//! ## Architecture
//!
//! The engine is structured into several key modules:
//!
//! - `engine`: Per-wallet execution sessions, the retry state machine,
//!   transaction building, error classification, and the wallet registry
//! - `strategies`: The strategy data model and the pluggable trigger
//!   evaluation capability
//! - `dex`: Pool observation (reserve/price snapshots) and swap planning
//! - `library`: The remote ledger service boundary (blockhash, submission,
//!   confirmation)
//! - `common`: Shared services: durable strategy store and the bounded
//!   audit log sink
//! - `utils`: Configuration and logging
//!
//! ## Design
//!
//! Every wallet runs its own independent session task. Failures, backoff
//! delays, and rate limiting on one wallet never block another wallet's
//! progress. The strategy store and log sink are the only shared mutable
//! resources and serialize their writes internally.

pub mod common;
pub mod dex;
pub mod engine;
pub mod library;
pub mod strategies;
pub mod utils;

// Re-export commonly used types
pub use engine::Engine;
pub use utils::config::Config;
