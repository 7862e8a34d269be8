//! Configuration management for the engine.
//!
//! All settings come from environment variables (with a `.env` file loaded
//! first), following the usual deployment shape of this kind of bot.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use dotenv::dotenv;
use solana_sdk::{pubkey::Pubkey, signature::Keypair, signer::Signer};

use crate::engine::session::SessionConfig;

/// Pool account set a session trades against.
#[derive(Debug, Clone, Copy)]
pub struct PoolKeys {
    pub pool: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub swap_program: Pubkey,
}

/// Main configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub pool_keys: PoolKeys,
    pub data_dir: PathBuf,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub unknown_retry_delay: Duration,
    pub confirm_timeout: Duration,
    pub unit_limit: u32,
    pub unit_price: u64,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let rpc_url = import_env_var("RPC_HTTP")?;
        let pool_keys = PoolKeys {
            pool: import_pubkey("POOL_ADDRESS")?,
            base_vault: import_pubkey("POOL_BASE_VAULT")?,
            quote_vault: import_pubkey("POOL_QUOTE_VAULT")?,
            swap_program: import_pubkey("SWAP_PROGRAM")?,
        };

        Ok(Self {
            rpc_url,
            pool_keys,
            data_dir: PathBuf::from(env_or("DATA_DIR", "data".to_string())?),
            poll_interval: Duration::from_millis(env_or("POLL_INTERVAL_MS", 2_000)?),
            max_retries: env_or("MAX_RETRIES", 3)?,
            retry_base_delay: Duration::from_millis(env_or("RETRY_BASE_DELAY_MS", 250)?),
            retry_max_delay: Duration::from_millis(env_or("RETRY_MAX_DELAY_MS", 4_000)?),
            unknown_retry_delay: Duration::from_millis(env_or("UNKNOWN_RETRY_DELAY_MS", 500)?),
            confirm_timeout: Duration::from_millis(env_or("CONFIRM_TIMEOUT_MS", 30_000)?),
            unit_limit: env_or("UNIT_LIMIT", 200_000)?,
            unit_price: env_or("UNIT_PRICE", 20_000)?,
        })
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            bail!("RPC_HTTP must not be empty");
        }
        if self.max_retries == 0 {
            bail!("MAX_RETRIES must be at least 1");
        }
        if self.retry_base_delay > self.retry_max_delay {
            bail!("RETRY_BASE_DELAY_MS must not exceed RETRY_MAX_DELAY_MS");
        }
        if self.confirm_timeout.is_zero() {
            bail!("CONFIRM_TIMEOUT_MS must be positive");
        }
        Ok(())
    }

    /// Per-session retry and timing settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: self.poll_interval,
            max_retries: self.max_retries,
            retry_base_delay: self.retry_base_delay,
            retry_max_delay: self.retry_max_delay,
            unknown_retry_delay: self.unknown_retry_delay,
            confirm_timeout: self.confirm_timeout,
        }
    }

    /// Import the wallet set from `WALLET_PRIVATE_KEYS` (comma-separated
    /// base58 secret keys). Read fresh on every call so a reload picks up
    /// newly imported credentials. Duplicate keys are rejected: each signing
    /// keypair belongs to exactly one session. Key material is decoded
    /// straight into `Keypair`s and never persisted by this crate.
    pub fn import_wallets(&self) -> Result<Vec<Keypair>> {
        parse_wallets(&import_env_var("WALLET_PRIVATE_KEYS")?)
    }
}

fn parse_wallets(raw: &str) -> Result<Vec<Keypair>> {
    let mut seen = HashSet::new();
    let mut wallets = Vec::new();
    for (index, key) in raw.split(',').map(str::trim).filter(|k| !k.is_empty()).enumerate() {
        let keypair = import_keypair(key)
            .with_context(|| format!("invalid wallet secret key at position {index}"))?;
        if !seen.insert(keypair.pubkey()) {
            bail!(
                "duplicate wallet {} at position {index} in WALLET_PRIVATE_KEYS",
                keypair.pubkey()
            );
        }
        wallets.push(keypair);
    }
    if wallets.is_empty() {
        bail!("WALLET_PRIVATE_KEYS contains no keys");
    }
    Ok(wallets)
}

fn import_env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing environment variable {key}"))
}

fn import_pubkey(key: &str) -> Result<Pubkey> {
    let raw = import_env_var(key)?;
    Pubkey::from_str(&raw).with_context(|| format!("{key} is not a valid pubkey: {raw}"))
}

// Missing variables fall back to the default; a variable that is present
// but malformed is a configuration error, not something to paper over.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("{key} has invalid value {raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

fn import_keypair(key: &str) -> Result<Keypair> {
    let bytes = bs58::decode(key)
        .into_vec()
        .map_err(|e| anyhow!("secret key is not valid base58: {e}"))?;
    if bytes.len() != 64 {
        bail!("secret key must decode to 64 bytes, got {}", bytes.len());
    }
    Keypair::try_from(bytes.as_slice()).map_err(|e| anyhow!("invalid secret key bytes: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signer::Signer;

    #[test]
    fn import_keypair_round_trips_base58() {
        let keypair = Keypair::new();
        let encoded = keypair.to_base58_string();
        let imported = import_keypair(&encoded).unwrap();
        assert_eq!(imported.pubkey(), keypair.pubkey());
    }

    #[test]
    fn import_keypair_rejects_garbage() {
        assert!(import_keypair("not-base58-!!").is_err());
        assert!(import_keypair("abc").is_err());
    }

    #[test]
    fn parse_wallets_accepts_distinct_keys() {
        let raw = format!(
            "{}, {}",
            Keypair::new().to_base58_string(),
            Keypair::new().to_base58_string()
        );
        assert_eq!(parse_wallets(&raw).unwrap().len(), 2);
    }

    #[test]
    fn parse_wallets_rejects_duplicate_keys() {
        let encoded = Keypair::new().to_base58_string();
        let err = parse_wallets(&format!("{encoded},{encoded}")).unwrap_err();
        assert!(err.to_string().contains("duplicate wallet"));
    }

    #[test]
    fn env_or_errors_on_malformed_value() {
        std::env::set_var("POOL_PILOT_TEST_BAD_U32", "abc");
        let err = env_or::<u32>("POOL_PILOT_TEST_BAD_U32", 3).unwrap_err();
        assert!(err.to_string().contains("POOL_PILOT_TEST_BAD_U32"));
        std::env::remove_var("POOL_PILOT_TEST_BAD_U32");
        assert_eq!(env_or("POOL_PILOT_TEST_BAD_U32", 3u32).unwrap(), 3);
    }
}
