//! Send pipeline: UTXO snapshot → selection → build → sign → broadcast.
//!
//! Sends from the same source address are serialized in-process so two
//! concurrent requests cannot select the same outputs. Different addresses
//! proceed concurrently. Double-spends against other processes remain
//! possible and surface as node rejections at broadcast time.

use std::future::Future;
use std::sync::Arc;

use chain_btc::transaction::{build_transaction, sign_with_key};
use chain_btc::utxo::select_utxos_with;
use chain_btc::SignedTransaction;
use dashmap::DashMap;
use node_rpc::{NodeAdapter, NodeError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::WalletError;
use crate::registry::{CoinRegistry, Wallet};

/// A payment request from one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub destination: String,
    /// Amount the recipient receives, in satoshis.
    pub amount_sat: u64,
    /// Where change goes; defaults to the sending wallet's own address.
    pub change_address: Option<String>,
}

impl SendRequest {
    pub fn new(destination: impl Into<String>, amount_sat: u64) -> Self {
        Self {
            destination: destination.into(),
            amount_sat,
            change_address: None,
        }
    }
}

/// Outcome of a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub txid: String,
    pub fee: u64,
    pub change: u64,
    /// Number of inputs spent.
    pub inputs: usize,
}

/// A signed transaction together with its fee breakdown.
#[derive(Debug, Clone)]
pub struct PreparedSend {
    pub transaction: SignedTransaction,
    pub fee: u64,
    pub change: u64,
}

pub struct Engine {
    registry: CoinRegistry,
    node: Arc<dyn NodeAdapter>,
    config: EngineConfig,
    address_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(registry: CoinRegistry, node: Arc<dyn NodeAdapter>, config: EngineConfig) -> Self {
        Self {
            registry,
            node,
            config,
            address_locks: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &CoinRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Send
    // -----------------------------------------------------------------------

    /// Pay `request.amount_sat` from `wallet` and broadcast the result.
    ///
    /// Holds the wallet address lock from the UTXO fetch until the node has
    /// accepted (or rejected) the transaction.
    pub async fn send(
        &self,
        wallet: &Wallet,
        request: &SendRequest,
    ) -> Result<SendReceipt, WalletError> {
        self.with_address_lock(wallet.address(), self.send_unlocked(wallet, request))
            .await
    }

    async fn send_unlocked(
        &self,
        wallet: &Wallet,
        request: &SendRequest,
    ) -> Result<SendReceipt, WalletError> {
        info!(
            from = wallet.address(),
            to = %request.destination,
            amount_sat = request.amount_sat,
            coin = wallet.coin_type().id(),
            "sending"
        );

        let prepared = self.prepare_unlocked(wallet, request).await?;
        let raw = prepared.transaction.serialize();

        let node_txid = self
            .bounded("sendrawtransaction", self.node.broadcast(&raw))
            .await?;

        if node_txid != prepared.transaction.txid {
            warn!(
                local = %prepared.transaction.txid,
                node = %node_txid,
                "node reported a different txid"
            );
        }

        info!(
            txid = %node_txid,
            fee = prepared.fee,
            change = prepared.change,
            "broadcast accepted"
        );

        Ok(SendReceipt {
            txid: node_txid,
            fee: prepared.fee,
            change: prepared.change,
            inputs: prepared.transaction.tx.input.len(),
        })
    }

    /// Build and sign without broadcasting.
    pub async fn prepare(
        &self,
        wallet: &Wallet,
        request: &SendRequest,
    ) -> Result<PreparedSend, WalletError> {
        self.with_address_lock(wallet.address(), self.prepare_unlocked(wallet, request))
            .await
    }

    async fn prepare_unlocked(
        &self,
        wallet: &Wallet,
        request: &SendRequest,
    ) -> Result<PreparedSend, WalletError> {
        if request.amount_sat == 0 {
            return Err(WalletError::TransactionFailed(
                "amount must be greater than zero".into(),
            ));
        }

        // Fresh snapshot and fee rate for every build.
        let utxos = self
            .bounded("listunspent", self.node.list_unspent(wallet.address()))
            .await?;
        let fee_rate = self
            .bounded("estimatesmartfee", self.node.estimate_fee_rate())
            .await?;

        debug!(
            utxos = utxos.len(),
            fee_rate = %fee_rate,
            "fetched spendable outputs"
        );

        let selection = select_utxos_with(
            &utxos,
            request.amount_sat,
            fee_rate,
            self.config.selection_strategy(),
            &mut rand::thread_rng(),
        )?;

        debug!(
            inputs = selection.selected.len(),
            total_sat = selection.total_sat,
            fee = selection.fee,
            "selected inputs"
        );

        let change_address = request
            .change_address
            .as_deref()
            .unwrap_or(wallet.address());

        let unsigned = build_transaction(
            &selection,
            &request.destination,
            request.amount_sat,
            change_address,
            wallet.network(),
            &self.config.build_policy(),
        )?;

        let transaction = sign_with_key(&unsigned, wallet.private_key())?;

        Ok(PreparedSend {
            transaction,
            fee: unsigned.fee,
            change: unsigned.change,
        })
    }

    // -----------------------------------------------------------------------
    // Node wallet management
    // -----------------------------------------------------------------------

    /// Import the wallet's key into the node's wallet under `label`.
    ///
    /// The node is not asked to rescan; balances for an address with history
    /// appear only after a separate rescan.
    pub async fn import_into_node(&self, wallet: &Wallet, label: &str) -> Result<(), WalletError> {
        let wif = zeroize::Zeroizing::new(wallet.private_key_wif());
        self.bounded(
            "importprivkey",
            self.node.import_private_key(&wif, label, false),
        )
        .await?;
        info!(address = wallet.address(), label, "imported key into node");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Number of source addresses with a send or prepare in progress.
    pub fn addresses_in_flight(&self) -> usize {
        self.address_locks.len()
    }

    /// Run `work` while holding the lock for `address`.
    ///
    /// The map entry is dropped once no other caller holds or waits on it,
    /// so the map only tracks addresses with work in progress.
    async fn with_address_lock<T, F>(&self, address: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = self
            .address_locks
            .entry(address.to_owned())
            .or_default()
            .clone();
        let guard = lock.lock().await;
        let result = work.await;
        // One reference in the map, one here. Clones are taken under the
        // map's shard lock, so no waiter can appear between check and removal.
        self.address_locks
            .remove_if(address, |_, entry| Arc::strong_count(entry) == 2);
        drop(guard);
        result
    }

    /// Run a node call under the configured timeout.
    async fn bounded<T, F>(&self, method: &str, call: F) -> Result<T, WalletError>
    where
        F: Future<Output = Result<T, NodeError>>,
    {
        match tokio::time::timeout(self.config.rpc_timeout(), call).await {
            Ok(result) => result.map_err(WalletError::from),
            Err(_) => {
                warn!(method, timeout_secs = self.config.rpc_timeout_secs, "node call timed out");
                Err(WalletError::NodeUnavailable(format!(
                    "{method} timed out after {}s",
                    self.config.rpc_timeout_secs
                )))
            }
        }
    }
}
