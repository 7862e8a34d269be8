//! Remote ledger service boundary.
//!
//! Everything a session needs from the chain goes through [`LedgerClient`]:
//! blockhash retrieval, transaction submission, confirmation polling, and
//! balance reads. All calls are fallible and their error text is what the
//! error classifier inspects, so errors are propagated with their original
//! descriptions intact.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};

const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Remote ledger operations used by wallet sessions.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// A fresh blockhash and its last valid block height.
    async fn latest_blockhash(&self) -> Result<(Hash, u64)>;

    /// Hand a signed transaction to the remote service for inclusion.
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature>;

    /// Wait for the submitted transaction to finalize, bounded by `timeout`.
    /// An on-chain rejection or an expired wait both surface as errors.
    async fn confirm_transaction(&self, signature: &Signature, timeout: Duration) -> Result<()>;

    /// Current lamport balance of an account.
    async fn balance(&self, pubkey: &Pubkey) -> Result<u64>;
}

/// Create the shared nonblocking RPC client.
pub fn create_rpc_client(rpc_url: &str) -> Arc<RpcClient> {
    Arc::new(RpcClient::new_with_timeout_and_commitment(
        rpc_url.to_string(),
        Duration::from_secs(30),
        CommitmentConfig::confirmed(),
    ))
}

/// [`LedgerClient`] over a Solana RPC endpoint.
pub struct RpcLedgerClient {
    rpc_client: Arc<RpcClient>,
}

impl RpcLedgerClient {
    pub fn new(rpc_client: Arc<RpcClient>) -> Self {
        Self { rpc_client }
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn latest_blockhash(&self) -> Result<(Hash, u64)> {
        let (blockhash, last_valid_block_height) = self
            .rpc_client
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await?;
        Ok((blockhash, last_valid_block_height))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        Ok(self.rpc_client.send_transaction(transaction).await?)
    }

    async fn confirm_transaction(&self, signature: &Signature, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.rpc_client.get_signature_status(signature).await? {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) => bail!("transaction {} failed on chain: {}", signature, e),
                None => {
                    if tokio::time::Instant::now() >= deadline {
                        bail!(
                            "confirmation of {} timed out after {:?}",
                            signature,
                            timeout
                        );
                    }
                    tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn balance(&self, pubkey: &Pubkey) -> Result<u64> {
        Ok(self.rpc_client.get_balance(pubkey).await?)
    }
}
