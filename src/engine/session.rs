//! Per-wallet execution session.
//!
//! Each session owns one wallet's signing keypair and runs its own loop:
//! observe pool state, evaluate the wallet's strategies, build and submit a
//! transaction for the first triggered action, and drive the retry state
//! machine on failure. Sessions are fully independent; nothing here is
//! shared with another session except the strategy store and the log sink,
//! which serialize their own writes.
//!
//! State machine:
//!
//! ```text
//! Idle -> Evaluating -> Building -> Submitting -> AwaitingConfirmation
//!                          ^                             |
//!                          |                             v
//!                       Retrying <--------------- {Success, Failed} -> Idle
//! ```
//!
//! `Retrying` loops back to `Building`, not `Evaluating`: trigger
//! conditions are not re-checked mid-retry so a noisy pool read cannot
//! flip-flop an in-flight cycle.

use std::cmp;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signature::Signature, signer::Signer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::log_sink::LogSink;
use crate::common::store::StrategyStore;
use crate::dex::{ActionPlanner, PoolObserver, PoolSnapshot};
use crate::engine::classifier::{classify_error, ClassifiedError, FailureKind};
use crate::engine::tx_builder::TransactionBuilder;
use crate::library::LedgerClient;
use crate::strategies::{SizingRule, StrategyEvaluator, TradeAction};

/// Execution states of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Evaluating,
    Building,
    Submitting,
    AwaitingConfirmation,
    Retrying,
    Success,
    Failed,
}

/// Retry and timing settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    /// Maximum total submission attempts for a rate-limited cycle.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub unknown_retry_delay: Duration,
    pub confirm_timeout: Duration,
}

/// Shared collaborators handed to every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub ledger: Arc<dyn LedgerClient>,
    pub observer: Arc<dyn PoolObserver>,
    pub evaluator: Arc<dyn StrategyEvaluator>,
    pub planner: Arc<dyn ActionPlanner>,
    pub builder: Arc<TransactionBuilder>,
    pub store: Arc<StrategyStore>,
    pub sink: Arc<LogSink>,
}

/// Terminal outcome of one execution cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Succeeded(Signature),
    Failed(ClassifiedError),
    /// Cancelled at a suspension point before any transaction was accepted.
    Abandoned,
}

/// What one cycle did, for callers and tests.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    /// Number of submission attempts (envelope rebuilds) made.
    pub attempts: u32,
}

/// Point-in-time session statistics.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub wallet: Pubkey,
    pub state: SessionState,
    pub submitted: u64,
    pub succeeded: u64,
    pub consecutive_failures: u32,
}

enum AttemptResult {
    Confirmed(Signature),
    Errored(ClassifiedError),
    Cancelled,
}

/// One wallet's execution loop. Exclusively owns that wallet's keypair.
pub struct WalletSession {
    keypair: Keypair,
    pubkey: Pubkey,
    pool: Pubkey,
    cfg: SessionConfig,
    deps: SessionDeps,
    state: RwLock<SessionState>,
    submitted: AtomicU64,
    succeeded: AtomicU64,
    consecutive_failures: AtomicU32,
}

impl WalletSession {
    pub fn new(keypair: Keypair, pool: Pubkey, cfg: SessionConfig, deps: SessionDeps) -> Self {
        let pubkey = keypair.pubkey();
        Self {
            keypair,
            pubkey,
            pool,
            cfg,
            deps,
            state: RwLock::new(SessionState::Idle),
            submitted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            wallet: self.pubkey,
            state: self.state(),
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    /// Session loop: poll, evaluate, execute, until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(wallet = %self.pubkey, "wallet session started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.cfg.poll_interval) => {}
            }
            self.run_cycle(&cancel).await;
        }
        self.set_state(SessionState::Idle);
        info!(wallet = %self.pubkey, "wallet session stopped");
    }

    /// One evaluation cycle. Returns `None` when nothing fired (or the pool
    /// was unobservable), `Some` with the terminal report otherwise.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Option<CycleReport> {
        self.set_state(SessionState::Evaluating);

        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.set_state(SessionState::Idle);
                return None;
            }
            result = self.deps.observer.snapshot(&self.pool) => match result {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(
                        wallet = %self.pubkey,
                        error = %format!("{e:#}"),
                        "pool state unavailable, skipping cycle"
                    );
                    self.set_state(SessionState::Idle);
                    return None;
                }
            }
        };

        // Exactly one action per evaluation cycle per wallet.
        let Some((strategy_id, action)) = self.pick_action(&snapshot) else {
            self.set_state(SessionState::Idle);
            return None;
        };
        self.deps.store.touch(&strategy_id, Utc::now());

        let report = self.execute(&strategy_id, &action, &snapshot, cancel).await;
        self.set_state(SessionState::Idle);
        Some(report)
    }

    fn pick_action(&self, snapshot: &PoolSnapshot) -> Option<(String, TradeAction)> {
        self.deps
            .store
            .for_wallet(&self.pubkey)
            .into_iter()
            .filter(|s| s.enabled)
            .find(|s| self.deps.evaluator.evaluate(s, snapshot))
            .map(|s| (s.id, s.action))
    }

    /// Retry state machine for one selected action. Conditions are not
    /// re-evaluated here; every attempt rebuilds a fresh envelope.
    async fn execute(
        &self,
        strategy_id: &str,
        action: &TradeAction,
        snapshot: &PoolSnapshot,
        cancel: &CancellationToken,
    ) -> CycleReport {
        let mut attempts: u32 = 0;
        let mut unknown_retried = false;

        loop {
            attempts += 1;
            match self.attempt(action, snapshot, cancel).await {
                AttemptResult::Confirmed(signature) => {
                    self.succeeded.fetch_add(1, Ordering::Relaxed);
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    self.set_state(SessionState::Success);
                    self.deps.sink.append(format!(
                        "wallet {} strategy {} succeeded after {} attempt(s): {}",
                        self.pubkey, strategy_id, attempts, signature
                    ));
                    info!(
                        wallet = %self.pubkey,
                        strategy = strategy_id,
                        signature = %signature,
                        attempts,
                        "cycle succeeded"
                    );
                    return CycleReport {
                        outcome: CycleOutcome::Succeeded(signature),
                        attempts,
                    };
                }
                AttemptResult::Cancelled => {
                    debug!(
                        wallet = %self.pubkey,
                        strategy = strategy_id,
                        "cycle abandoned before submission"
                    );
                    return CycleReport {
                        outcome: CycleOutcome::Abandoned,
                        attempts,
                    };
                }
                AttemptResult::Errored(reason) => match reason.kind {
                    FailureKind::SimulationFailed => {
                        return self.fail(strategy_id, reason, attempts);
                    }
                    FailureKind::RateLimited => {
                        if attempts >= self.cfg.max_retries {
                            return self.fail(strategy_id, reason, attempts);
                        }
                        let delay = backoff_delay(
                            attempts,
                            self.cfg.retry_base_delay,
                            self.cfg.retry_max_delay,
                        );
                        debug!(
                            wallet = %self.pubkey,
                            strategy = strategy_id,
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            "rate limited, backing off"
                        );
                        self.set_state(SessionState::Retrying);
                        if !self.pause(delay, cancel).await {
                            return CycleReport {
                                outcome: CycleOutcome::Abandoned,
                                attempts,
                            };
                        }
                    }
                    FailureKind::Unknown => {
                        if unknown_retried {
                            return self.fail(strategy_id, reason, attempts);
                        }
                        unknown_retried = true;
                        self.set_state(SessionState::Retrying);
                        if !self.pause(self.cfg.unknown_retry_delay, cancel).await {
                            return CycleReport {
                                outcome: CycleOutcome::Abandoned,
                                attempts,
                            };
                        }
                    }
                },
            }
        }
    }

    /// One build-submit-confirm attempt. Cancellation is honored at the
    /// pre-submission suspension points only; once a transaction has been
    /// handed to the remote service its outcome is always resolved.
    async fn attempt(
        &self,
        action: &TradeAction,
        snapshot: &PoolSnapshot,
        cancel: &CancellationToken,
    ) -> AttemptResult {
        self.set_state(SessionState::Building);

        let amount = match self.resolve_amount(&action.sizing, cancel).await {
            Ok(Some(amount)) => amount,
            Ok(None) => return AttemptResult::Cancelled,
            Err(e) => return AttemptResult::Errored(classify_error(&e)),
        };

        let instructions =
            match self.deps.planner.plan(&self.pubkey, action.side, amount, snapshot) {
                Ok(instructions) => instructions,
                Err(e) => return AttemptResult::Errored(classify_error(&e)),
            };

        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => return AttemptResult::Cancelled,
            result = self.deps.builder.build(&self.keypair, instructions) => match result {
                Ok(envelope) => envelope,
                Err(e) => return AttemptResult::Errored(classify_error(&e)),
            }
        };

        self.set_state(SessionState::Submitting);
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let transaction = envelope.into_transaction();
        let signature = match self.deps.ledger.send_transaction(&transaction).await {
            Ok(signature) => signature,
            Err(e) => return AttemptResult::Errored(classify_error(&e)),
        };

        self.set_state(SessionState::AwaitingConfirmation);
        match self
            .deps
            .ledger
            .confirm_transaction(&signature, self.cfg.confirm_timeout)
            .await
        {
            Ok(()) => AttemptResult::Confirmed(signature),
            Err(e) => AttemptResult::Errored(classify_error(&e)),
        }
    }

    async fn resolve_amount(
        &self,
        sizing: &SizingRule,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<u64>> {
        match sizing {
            SizingRule::FixedLamports(amount) => Ok(Some(*amount)),
            SizingRule::PctOfBalance(pct) => {
                if !(*pct > 0.0 && *pct <= 1.0) {
                    anyhow::bail!("balance percentage {pct} is outside (0, 1]");
                }
                let balance = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(None),
                    result = self.deps.ledger.balance(&self.pubkey) => result?,
                };
                Ok(Some((balance as f64 * pct).floor() as u64))
            }
        }
    }

    fn fail(&self, strategy_id: &str, reason: ClassifiedError, attempts: u32) -> CycleReport {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.set_state(SessionState::Failed);
        self.deps.sink.append(format!(
            "wallet {} strategy {} failed after {} attempt(s) ({}): {}",
            self.pubkey, strategy_id, attempts, reason.kind, reason.message
        ));
        error!(
            wallet = %self.pubkey,
            strategy = strategy_id,
            kind = %reason.kind,
            attempts,
            "cycle failed"
        );
        CycleReport {
            outcome: CycleOutcome::Failed(reason),
            attempts,
        }
    }

    /// Cancellable delay. Returns false when the session was told to stop.
    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write().unwrap() = state;
    }
}

/// Exponential backoff bounded by a ceiling: `base * 2^(attempt - 1)`.
pub fn backoff_delay(attempt: u32, base: Duration, ceiling: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let factor = 1u32 << exponent;
    cmp::min(base.saturating_mul(factor), ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, bail, Result};
    use async_trait::async_trait;
    use solana_sdk::{hash::Hash, transaction::Transaction};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::dex::AmmSwapPlanner;
    use crate::strategies::{Side, Strategy, ThresholdEvaluator, TriggerCondition};
    use crate::utils::config::PoolKeys;

    /// Scripted outcome for one submission attempt.
    #[derive(Clone)]
    enum Attempt {
        SendFails(&'static str),
        ConfirmFails(&'static str),
        Lands,
    }

    struct ScriptedLedger {
        script: Mutex<VecDeque<Attempt>>,
        blockhash_calls: AtomicU32,
        send_calls: AtomicU32,
        current: Mutex<Option<Attempt>>,
    }

    impl ScriptedLedger {
        fn new(script: Vec<Attempt>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                blockhash_calls: AtomicU32::new(0),
                send_calls: AtomicU32::new(0),
                current: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LedgerClient for ScriptedLedger {
        async fn latest_blockhash(&self) -> Result<(Hash, u64)> {
            self.blockhash_calls.fetch_add(1, Ordering::Relaxed);
            Ok((Hash::default(), 100))
        }

        async fn send_transaction(&self, _transaction: &Transaction) -> Result<Signature> {
            self.send_calls.fetch_add(1, Ordering::Relaxed);
            let attempt = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Attempt::Lands);
            match attempt {
                Attempt::SendFails(text) => Err(anyhow!("{text}")),
                other => {
                    *self.current.lock().unwrap() = Some(other);
                    Ok(Signature::default())
                }
            }
        }

        async fn confirm_transaction(&self, _: &Signature, _: Duration) -> Result<()> {
            match self.current.lock().unwrap().take() {
                Some(Attempt::ConfirmFails(text)) => bail!("{text}"),
                _ => Ok(()),
            }
        }

        async fn balance(&self, _: &Pubkey) -> Result<u64> {
            Ok(10_000_000_000)
        }
    }

    struct FixedObserver;

    #[async_trait]
    impl PoolObserver for FixedObserver {
        async fn snapshot(&self, pool: &Pubkey) -> Result<PoolSnapshot> {
            Ok(PoolSnapshot {
                pool: *pool,
                base_reserve: 1_000,
                quote_reserve: 2_000,
                price: 2.0,
                observed_at: Utc::now(),
            })
        }
    }

    fn always_firing_strategy(wallet: &Pubkey) -> Strategy {
        Strategy {
            id: "s-1".to_string(),
            wallet: wallet.to_string(),
            conditions: vec![TriggerCondition::PriceBelow(f64::INFINITY)],
            action: TradeAction {
                side: Side::Buy,
                sizing: SizingRule::FixedLamports(1_000_000),
            },
            enabled: true,
            last_evaluated_at: None,
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(5),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(1),
            retry_max_delay: Duration::from_millis(4),
            unknown_retry_delay: Duration::from_millis(1),
            confirm_timeout: Duration::from_millis(100),
        }
    }

    fn build_session(
        script: Vec<Attempt>,
        dir: &std::path::Path,
    ) -> (Arc<WalletSession>, Arc<ScriptedLedger>, Arc<LogSink>) {
        let keys = PoolKeys {
            pool: Pubkey::new_unique(),
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            swap_program: Pubkey::new_unique(),
        };
        let keypair = Keypair::new();
        let wallet = keypair.pubkey();

        let ledger = Arc::new(ScriptedLedger::new(script));
        let store = Arc::new(StrategyStore::open(dir).unwrap());
        store.upsert(always_firing_strategy(&wallet));
        let sink = Arc::new(LogSink::new());

        let deps = SessionDeps {
            ledger: ledger.clone(),
            observer: Arc::new(FixedObserver),
            evaluator: Arc::new(ThresholdEvaluator),
            planner: Arc::new(AmmSwapPlanner::new(keys)),
            builder: Arc::new(TransactionBuilder::new(ledger.clone(), 200_000, 20_000)),
            store,
            sink: sink.clone(),
        };

        let session = Arc::new(WalletSession::new(keypair, keys.pool, test_config(), deps));
        (session, ledger, sink)
    }

    #[tokio::test]
    async fn clean_cycle_succeeds_with_one_attempt_and_one_log_line() {
        let dir = tempfile::tempdir().unwrap();
        let (session, ledger, sink) = build_session(vec![Attempt::Lands], dir.path());

        let report = session
            .run_cycle(&CancellationToken::new())
            .await
            .expect("strategy should fire");
        assert!(matches!(report.outcome, CycleOutcome::Succeeded(_)));
        assert_eq!(report.attempts, 1);
        assert_eq!(ledger.send_calls.load(Ordering::Relaxed), 1);
        assert_eq!(sink.len(), 1);
        assert!(sink.snapshot()[0].message.contains("succeeded"));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn three_rate_limits_fail_after_exactly_three_rebuilt_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let (session, ledger, sink) = build_session(
            vec![
                Attempt::SendFails("429 too many requests"),
                Attempt::SendFails("rate limit exceeded"),
                Attempt::SendFails("429"),
            ],
            dir.path(),
        );

        let report = session
            .run_cycle(&CancellationToken::new())
            .await
            .expect("strategy should fire");
        let CycleOutcome::Failed(reason) = &report.outcome else {
            panic!("expected failure, got {:?}", report.outcome);
        };
        assert_eq!(reason.kind, FailureKind::RateLimited);
        assert_eq!(report.attempts, 3);
        assert_eq!(ledger.send_calls.load(Ordering::Relaxed), 3);
        // every retry rebuilt the envelope against a fresh blockhash
        assert_eq!(ledger.blockhash_calls.load(Ordering::Relaxed), 3);
        assert_eq!(sink.len(), 1);
        assert!(sink.snapshot()[0].message.contains("rate limited"));
    }

    #[tokio::test]
    async fn simulation_failure_is_terminal_after_one_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let (session, ledger, sink) = build_session(
            vec![Attempt::SendFails(
                "Transaction simulation failed: insufficient funds",
            )],
            dir.path(),
        );

        let report = session
            .run_cycle(&CancellationToken::new())
            .await
            .expect("strategy should fire");
        let CycleOutcome::Failed(reason) = &report.outcome else {
            panic!("expected failure, got {:?}", report.outcome);
        };
        assert_eq!(reason.kind, FailureKind::SimulationFailed);
        assert_eq!(report.attempts, 1);
        assert_eq!(ledger.send_calls.load(Ordering::Relaxed), 1);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn unknown_failure_retries_once_then_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (session, ledger, _sink) = build_session(
            vec![
                Attempt::SendFails("connection reset by peer"),
                Attempt::SendFails("connection reset by peer"),
            ],
            dir.path(),
        );

        let report = session
            .run_cycle(&CancellationToken::new())
            .await
            .expect("strategy should fire");
        let CycleOutcome::Failed(reason) = &report.outcome else {
            panic!("expected failure, got {:?}", report.outcome);
        };
        assert_eq!(reason.kind, FailureKind::Unknown);
        assert_eq!(report.attempts, 2);
        assert_eq!(ledger.send_calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn unknown_failure_then_success_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _ledger, sink) = build_session(
            vec![
                Attempt::SendFails("connection reset by peer"),
                Attempt::Lands,
            ],
            dir.path(),
        );

        let report = session
            .run_cycle(&CancellationToken::new())
            .await
            .expect("strategy should fire");
        assert!(matches!(report.outcome, CycleOutcome::Succeeded(_)));
        assert_eq!(report.attempts, 2);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn confirmation_failure_classifies_and_retries_as_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let (session, ledger, _sink) = build_session(
            vec![
                Attempt::ConfirmFails("confirmation of sig timed out after 100ms"),
                Attempt::Lands,
            ],
            dir.path(),
        );

        let report = session
            .run_cycle(&CancellationToken::new())
            .await
            .expect("strategy should fire");
        assert!(matches!(report.outcome, CycleOutcome::Succeeded(_)));
        assert_eq!(report.attempts, 2);
        assert_eq!(ledger.send_calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn cancelled_session_abandons_before_submission() {
        let dir = tempfile::tempdir().unwrap();
        let (session, ledger, sink) = build_session(vec![Attempt::Lands], dir.path());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = session.run_cycle(&cancel).await;
        assert!(report.is_none());
        assert_eq!(ledger.send_calls.load(Ordering::Relaxed), 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn disabled_strategies_never_fire() {
        let dir = tempfile::tempdir().unwrap();
        let (session, ledger, _sink) = build_session(vec![Attempt::Lands], dir.path());
        session.deps.store.set_enabled("s-1", false);

        let report = session.run_cycle(&CancellationToken::new()).await;
        assert!(report.is_none());
        assert_eq!(ledger.send_calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let base = Duration::from_millis(250);
        let ceiling = Duration::from_millis(4_000);

        let delays: Vec<_> = (1..=8).map(|a| backoff_delay(a, base, ceiling)).collect();
        assert_eq!(delays[0], Duration::from_millis(250));
        assert_eq!(delays[1], Duration::from_millis(500));
        assert_eq!(delays[2], Duration::from_millis(1_000));
        // strictly increasing until the ceiling, then pinned there
        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert_eq!(*delays.last().unwrap(), ceiling);
        // huge attempt numbers must not overflow
        assert_eq!(backoff_delay(1_000, base, ceiling), ceiling);
    }
}
