//! Constant-product AMM pool integration.
//!
//! Reads the pool's two vault token accounts in a single RPC round trip and
//! derives price from the reserve ratio. The swap planner emits a minimal
//! program invocation against the configured swap program.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_program_pack::Pack;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use spl_token::state::Account as TokenAccount;

use crate::dex::{ActionPlanner, PoolObserver, PoolSnapshot};
use crate::strategies::Side;
use crate::utils::config::PoolKeys;

/// Pool observer backed by vault token accounts.
pub struct AmmPoolObserver {
    rpc_client: Arc<RpcClient>,
    keys: PoolKeys,
}

impl AmmPoolObserver {
    pub fn new(rpc_client: Arc<RpcClient>, keys: PoolKeys) -> Self {
        Self { rpc_client, keys }
    }
}

#[async_trait]
impl PoolObserver for AmmPoolObserver {
    async fn snapshot(&self, pool: &Pubkey) -> Result<PoolSnapshot> {
        if *pool != self.keys.pool {
            bail!("observer is configured for pool {}, not {}", self.keys.pool, pool);
        }

        let accounts = self
            .rpc_client
            .get_multiple_accounts(&[self.keys.base_vault, self.keys.quote_vault])
            .await?;

        let base_reserve = unpack_vault(&accounts, 0, &self.keys.base_vault)?;
        let quote_reserve = unpack_vault(&accounts, 1, &self.keys.quote_vault)?;
        if base_reserve == 0 {
            bail!("pool {} has no base-side liquidity", pool);
        }

        Ok(PoolSnapshot {
            pool: *pool,
            base_reserve,
            quote_reserve,
            price: quote_reserve as f64 / base_reserve as f64,
            observed_at: Utc::now(),
        })
    }
}

fn unpack_vault(
    accounts: &[Option<solana_sdk::account::Account>],
    index: usize,
    vault: &Pubkey,
) -> Result<u64> {
    let account = accounts
        .get(index)
        .and_then(|a| a.as_ref())
        .ok_or_else(|| anyhow!("vault account {} not found", vault))?;
    let token_account = TokenAccount::unpack(&account.data)
        .map_err(|e| anyhow!("vault account {} is not a token account: {}", vault, e))?;
    Ok(token_account.amount)
}

/// Swap instruction encoding: one-byte side tag followed by the amount.
const SWAP_TAG_BUY: u8 = 1;
const SWAP_TAG_SELL: u8 = 2;

/// Default planner: a single swap instruction against the pool program.
pub struct AmmSwapPlanner {
    keys: PoolKeys,
}

impl AmmSwapPlanner {
    pub fn new(keys: PoolKeys) -> Self {
        Self { keys }
    }
}

impl ActionPlanner for AmmSwapPlanner {
    fn plan(
        &self,
        wallet: &Pubkey,
        side: Side,
        amount_lamports: u64,
        snapshot: &PoolSnapshot,
    ) -> Result<Vec<Instruction>> {
        if amount_lamports == 0 {
            bail!("swap amount resolved to zero lamports");
        }
        if snapshot.pool != self.keys.pool {
            bail!("snapshot is for pool {}, planner expects {}", snapshot.pool, self.keys.pool);
        }

        let tag = match side {
            Side::Buy => SWAP_TAG_BUY,
            Side::Sell => SWAP_TAG_SELL,
        };
        let mut data = Vec::with_capacity(9);
        data.push(tag);
        data.extend_from_slice(&amount_lamports.to_le_bytes());

        let accounts = vec![
            AccountMeta::new(self.keys.pool, false),
            AccountMeta::new(self.keys.base_vault, false),
            AccountMeta::new(self.keys.quote_vault, false),
            AccountMeta::new(*wallet, true),
            AccountMeta::new_readonly(spl_token::id(), false),
        ];

        Ok(vec![Instruction {
            program_id: self.keys.swap_program,
            accounts,
            data,
        }])
    }
}
