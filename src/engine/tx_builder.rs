//! Transaction construction.
//!
//! Produces a single-use [`TransactionEnvelope`] bound to a blockhash
//! fetched at construction time. Retry policy lives in the wallet session,
//! not here: a blockhash fetch failure propagates straight to the caller.

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::Transaction,
};

use crate::library::LedgerClient;

/// A fully constructed, signed, time-bounded transaction.
///
/// Single-use by construction: submission consumes the envelope via
/// [`TransactionEnvelope::into_transaction`], so a retry is forced to
/// rebuild against a fresh blockhash.
#[derive(Debug)]
pub struct TransactionEnvelope {
    transaction: Transaction,
    pub payer: Pubkey,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    pub built_at: DateTime<Utc>,
}

impl TransactionEnvelope {
    /// Take the signed transaction out for submission.
    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }
}

/// Builds submittable envelopes for wallet sessions.
pub struct TransactionBuilder {
    ledger: Arc<dyn LedgerClient>,
    unit_limit: u32,
    unit_price: u64,
}

impl TransactionBuilder {
    pub fn new(ledger: Arc<dyn LedgerClient>, unit_limit: u32, unit_price: u64) -> Self {
        Self {
            ledger,
            unit_limit,
            unit_price,
        }
    }

    /// Construct and sign an envelope for the given instructions. The
    /// instruction list must be non-empty; compute budget instructions are
    /// prepended before signing.
    pub async fn build(
        &self,
        payer: &Keypair,
        instructions: Vec<Instruction>,
    ) -> Result<TransactionEnvelope> {
        if instructions.is_empty() {
            bail!("cannot build a transaction from an empty instruction list");
        }

        let (blockhash, last_valid_block_height) = self.ledger.latest_blockhash().await?;

        let mut all = Vec::with_capacity(instructions.len() + 2);
        all.push(ComputeBudgetInstruction::set_compute_unit_limit(self.unit_limit));
        all.push(ComputeBudgetInstruction::set_compute_unit_price(self.unit_price));
        all.extend(instructions);

        let payer_pubkey = payer.pubkey();
        let transaction =
            Transaction::new_signed_with_payer(&all, Some(&payer_pubkey), &[payer], blockhash);

        Ok(TransactionEnvelope {
            transaction,
            payer: payer_pubkey,
            blockhash,
            last_valid_block_height,
            built_at: Utc::now(),
        })
    }
}
