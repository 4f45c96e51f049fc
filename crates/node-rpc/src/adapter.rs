use async_trait::async_trait;
use chain_btc::{FeeRate, Utxo};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Input reference for `createrawtransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInput {
    pub txid: String,
    pub vout: u32,
}

/// Output for `createrawtransaction`: address and amount in satoshis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub address: String,
    pub amount_sat: u64,
}

/// Result of `fundrawtransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundedTransaction {
    pub hex: String,
    pub fee_sat: u64,
    /// Position of the change output, -1 when none was added.
    pub change_position: i32,
}

/// Result of `signrawtransactionwithkey`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignedRawTransaction {
    pub hex: String,
    pub complete: bool,
}

/// Subset of `getaddressinfo` the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pub_key: String,
    #[serde(rename = "ismine", default)]
    pub is_mine: bool,
    #[serde(rename = "iswatchonly", default)]
    pub is_watch_only: bool,
    #[serde(rename = "pubkey", default)]
    pub pubkey: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Contract the engine uses against a Bitcoin-protocol node.
///
/// bitcoind, litecoind and dogecoind share it. Implementations must bound
/// every call with a timeout and report transport failures as
/// [`NodeError::Unavailable`].
#[async_trait]
pub trait NodeAdapter: Send + Sync {
    /// Confirmed unspent outputs paying to `address`.
    async fn list_unspent(&self, address: &str) -> Result<Vec<Utxo>, NodeError>;

    /// Current fee rate, never zero.
    async fn estimate_fee_rate(&self) -> Result<FeeRate, NodeError>;

    /// Submit a serialized transaction; returns its txid.
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, NodeError>;

    async fn create_wallet(&self, name: &str) -> Result<(), NodeError>;

    async fn import_private_key(&self, wif: &str, label: &str, rescan: bool)
        -> Result<(), NodeError>;

    async fn dump_private_key(&self, address: &str) -> Result<String, NodeError>;

    async fn encrypt_wallet(&self, passphrase: &str) -> Result<(), NodeError>;

    async fn unlock_wallet(&self, passphrase: &str, timeout_secs: u64) -> Result<(), NodeError>;

    async fn lock_wallet(&self) -> Result<(), NodeError>;

    async fn get_address_info(&self, address: &str) -> Result<AddressInfo, NodeError>;

    async fn create_raw_transaction(
        &self,
        inputs: &[RawInput],
        outputs: &[RawOutput],
    ) -> Result<String, NodeError>;

    async fn fund_raw_transaction(&self, hex: &str) -> Result<FundedTransaction, NodeError>;

    async fn sign_raw_transaction_with_key(
        &self,
        hex: &str,
        wifs: &[String],
    ) -> Result<SignedRawTransaction, NodeError>;
}
