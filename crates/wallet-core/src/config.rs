//! Engine configuration loaded from environment variables.

use std::time::Duration;

use chain_btc::{BuildPolicy, FeeRate, SelectionStrategy};
use node_rpc::BitcoindConfig;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node JSON-RPC endpoint.
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    #[serde(skip_serializing)]
    pub rpc_password: Option<String>,
    /// Node-side wallet to route wallet RPCs to.
    pub rpc_wallet: Option<String>,
    /// Upper bound for every node call, in seconds.
    pub rpc_timeout_secs: u64,
    /// Fee rate (sat/B) used when the node has no estimate.
    pub fallback_fee_rate: u64,
    /// Change below this many satoshis goes to the fee.
    pub dust_limit: u64,
    /// Random subsets to try when deterministic selection fails; 0 disables.
    pub selection_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:18332".to_string(),
            rpc_user: None,
            rpc_password: None,
            rpc_wallet: None,
            rpc_timeout_secs: 10,
            fallback_fee_rate: 1,
            dust_limit: 0,
            selection_attempts: 0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `WALLET_*` environment variables.
    pub fn from_env() -> Result<Self, WalletError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WalletError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let rpc_timeout_secs = parse_number(&lookup, "WALLET_RPC_TIMEOUT_SECS", defaults.rpc_timeout_secs)?;
        if rpc_timeout_secs == 0 {
            return Err(WalletError::Config(
                "WALLET_RPC_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            rpc_url: lookup("WALLET_RPC_URL").unwrap_or(defaults.rpc_url),
            rpc_user: lookup("WALLET_RPC_USER"),
            rpc_password: lookup("WALLET_RPC_PASSWORD"),
            rpc_wallet: lookup("WALLET_RPC_WALLET"),
            rpc_timeout_secs,
            fallback_fee_rate: parse_number(&lookup, "WALLET_FALLBACK_FEE_RATE", defaults.fallback_fee_rate)?,
            dust_limit: parse_number(&lookup, "WALLET_DUST_LIMIT", defaults.dust_limit)?,
            selection_attempts: parse_number(&lookup, "WALLET_SELECTION_ATTEMPTS", defaults.selection_attempts)?,
        })
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn fallback_fee_rate(&self) -> FeeRate {
        FeeRate::from_sat_per_byte(self.fallback_fee_rate.max(1))
    }

    pub fn build_policy(&self) -> BuildPolicy {
        BuildPolicy {
            dust_limit: self.dust_limit,
        }
    }

    pub fn selection_strategy(&self) -> SelectionStrategy {
        match self.selection_attempts {
            0 => SelectionStrategy::Deterministic,
            attempts => SelectionStrategy::RandomizedFallback { attempts },
        }
    }

    /// Client settings for a bitcoind-compatible node.
    pub fn bitcoind(&self) -> BitcoindConfig {
        let mut config = BitcoindConfig::new(self.rpc_url.clone());
        config.user = self.rpc_user.clone();
        config.password = self.rpc_password.clone();
        config.wallet = self.rpc_wallet.clone();
        config.timeout = self.rpc_timeout();
        config.fallback_fee_rate = self.fallback_fee_rate();
        config
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, WalletError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| WalletError::Config(format!("{key} must be a non-negative integer: {e}"))),
    }
}
