//! Failure classification for remote ledger errors.
//!
//! Every retry decision in the engine keys off the classification produced
//! here. Matching is by substring over the error's textual description:
//! rate-limit phrases take precedence over simulation-failure phrases, and
//! anything else falls back to `Unknown`.

use anyhow::Error;

const RATE_LIMIT_PHRASES: &[&str] = &["429", "rate limit", "too many requests"];
const SIMULATION_PHRASE: &str = "transaction simulation failed";

/// Closed set of failure kinds the retry state machine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient, remote-imposed throttling. Retried with backoff.
    RateLimited,
    /// The proposed action is currently invalid. Never retried unchanged.
    SimulationFailed,
    /// Unclassified. Retried once, conservatively.
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::RateLimited => write!(f, "rate limited"),
            FailureKind::SimulationFailed => write!(f, "simulation failed"),
            FailureKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified failure with its human-readable message.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: FailureKind,
    pub message: String,
}

/// Classify a raw error description. Deterministic, no side effects, total:
/// any input maps to exactly one kind.
pub fn classify(text: &str) -> ClassifiedError {
    if text.trim().is_empty() {
        return ClassifiedError {
            kind: FailureKind::Unknown,
            message: "remote call failed without an error description".to_string(),
        };
    }

    let lowered = text.to_lowercase();
    let kind = if RATE_LIMIT_PHRASES.iter().any(|p| lowered.contains(p)) {
        FailureKind::RateLimited
    } else if lowered.contains(SIMULATION_PHRASE) {
        FailureKind::SimulationFailed
    } else {
        FailureKind::Unknown
    };

    ClassifiedError {
        kind,
        message: text.to_string(),
    }
}

/// Classify an error chain by its full display text.
pub fn classify_error(error: &Error) -> ClassifiedError {
    classify(&format!("{error:#}"))
}
