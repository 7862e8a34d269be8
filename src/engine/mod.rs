//! Core engine: orchestration of wallet sessions and shared services.

pub mod classifier;
pub mod registry;
pub mod session;
pub mod tx_builder;

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::FutureExt;
use tracing::info;

use crate::common::log_sink::LogSink;
use crate::common::store::StrategyStore;
use crate::dex::{AmmPoolObserver, AmmSwapPlanner};
use crate::library::{create_rpc_client, RpcLedgerClient};
use crate::strategies::ThresholdEvaluator;
use crate::utils::config::Config;

use registry::WalletRegistry;
use session::{SessionDeps, WalletSession};
use tx_builder::TransactionBuilder;

/// Engine wiring: shared services plus the wallet registry.
pub struct Engine {
    config: Config,
    deps: SessionDeps,
    registry: Arc<WalletRegistry>,
}

impl Engine {
    /// Build the shared services from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let rpc_client = create_rpc_client(&config.rpc_url);
        let ledger = Arc::new(RpcLedgerClient::new(rpc_client.clone()));
        let store = Arc::new(
            StrategyStore::open(&config.data_dir).context("failed to open strategy store")?,
        );

        let deps = SessionDeps {
            ledger: ledger.clone(),
            observer: Arc::new(AmmPoolObserver::new(rpc_client, config.pool_keys)),
            evaluator: Arc::new(ThresholdEvaluator),
            planner: Arc::new(AmmSwapPlanner::new(config.pool_keys)),
            builder: Arc::new(TransactionBuilder::new(
                ledger,
                config.unit_limit,
                config.unit_price,
            )),
            store,
            sink: Arc::new(LogSink::new()),
        };

        Ok(Self {
            config,
            deps,
            registry: Arc::new(WalletRegistry::new()),
        })
    }

    /// Import the configured wallets, spawn their sessions, and install the
    /// reload procedure.
    pub async fn run(&self) -> Result<()> {
        let sessions = build_sessions(&self.config, &self.deps)?;
        let count = sessions.len();
        self.registry.install(sessions).await;

        let config = self.config.clone();
        let deps = self.deps.clone();
        self.registry.register_reloader(Arc::new(move || {
            let config = config.clone();
            let deps = deps.clone();
            async move { build_sessions(&config, &deps) }.boxed()
        }));

        info!(
            sessions = count,
            pool = %self.config.pool_keys.pool,
            "engine started"
        );
        Ok(())
    }

    /// Stop every session and wait for their loops to finish.
    pub async fn stop(&self) {
        info!("stopping engine");
        self.registry.shutdown().await;
    }

    pub fn registry(&self) -> Arc<WalletRegistry> {
        self.registry.clone()
    }

    pub fn log_sink(&self) -> Arc<LogSink> {
        self.deps.sink.clone()
    }

    pub fn store(&self) -> Arc<StrategyStore> {
        self.deps.store.clone()
    }
}

fn build_sessions(config: &Config, deps: &SessionDeps) -> Result<Vec<WalletSession>> {
    let session_config = config.session_config();
    Ok(config
        .import_wallets()?
        .into_iter()
        .map(|keypair| {
            WalletSession::new(
                keypair,
                config.pool_keys.pool,
                session_config.clone(),
                deps.clone(),
            )
        })
        .collect())
}
