//! Cross-crate integration tests exercising the full pipeline:
//! mnemonic -> derive wallet -> select -> build -> sign -> broadcast.
//!
//! The node is a mock `NodeAdapter` that keeps a UTXO set per address and
//! removes outputs once a broadcast transaction spends them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::transaction::Version;
use bitcoin::OutPoint;
use chain_btc::address::hash160;
use chain_btc::script::{p2pkh_script, verify_input};
use chain_btc::{decode_transaction, parse_outpoint, total_output, FeeRate, Transaction, Utxo};
use node_rpc::{
    AddressInfo, FundedTransaction, NodeAdapter, NodeError, RawInput, RawOutput,
    SignedRawTransaction,
};
use wallet_core::*;

const SCENARIO_MNEMONIC: &str =
    "chair column reveal income inside soul blade concert series syrup ivory bulb";

/// Testnet m/44'/1'/0'/0/0 of the scenario mnemonic.
const OTHER_TESTNET_ADDRESS: &str = "mhLbrx42Fy1p28eTYyCS9MbUX1VyUxA1Dc";

// ─── Mock node ─────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum Failure {
    None,
    Unreachable,
    RejectBroadcast,
    Hang,
}

struct MockNode {
    utxos: Mutex<HashMap<String, Vec<Utxo>>>,
    fee_rate: FeeRate,
    failure: Failure,
    broadcasts: Mutex<Vec<Transaction>>,
    imports: Mutex<Vec<(String, String, bool)>>,
}

impl MockNode {
    fn new(fee_rate: u64) -> Self {
        Self {
            utxos: Mutex::new(HashMap::new()),
            fee_rate: FeeRate::from_sat_per_byte(fee_rate),
            failure: Failure::None,
            broadcasts: Mutex::new(Vec::new()),
            imports: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, failure: Failure) -> Self {
        self.failure = failure;
        self
    }

    /// Credit `wallet` with one output per amount.
    fn fund(&self, wallet: &Wallet, amounts: &[u64]) {
        let script = p2pkh_script(&hash160(wallet.public_key()));
        let mut utxos = self.utxos.lock().unwrap();
        // Outpoints are numbered across all addresses so they never collide.
        let mut n = utxos.values().map(Vec::len).sum::<usize>() as u8;
        let entry = utxos.entry(wallet.address().to_owned()).or_default();
        for amount in amounts {
            n += 1;
            entry.push(Utxo {
                txid: hex::encode([n; 32]),
                vout: n as u32,
                amount_sat: *amount,
                script_pubkey: script.to_bytes(),
            });
        }
    }

    fn broadcasts(&self) -> Vec<Transaction> {
        self.broadcasts.lock().unwrap().clone()
    }

    fn spent(&self) -> HashSet<OutPoint> {
        self.broadcasts
            .lock()
            .unwrap()
            .iter()
            .flat_map(|tx| tx.input.iter().map(|i| i.previous_output))
            .collect()
    }

    fn check(&self) -> Result<(), NodeError> {
        match self.failure {
            Failure::Unreachable => Err(NodeError::Unavailable("connection refused".into())),
            _ => Ok(()),
        }
    }
}

fn not_used<T>(method: &str) -> Result<T, NodeError> {
    Err(NodeError::Rejected {
        code: -32601,
        message: format!("{method} not mocked"),
    })
}

#[async_trait]
impl NodeAdapter for MockNode {
    async fn list_unspent(&self, address: &str) -> Result<Vec<Utxo>, NodeError> {
        self.check()?;
        if self.failure == Failure::Hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        let spent = self.spent();
        let utxos = self.utxos.lock().unwrap();
        Ok(utxos
            .get(address)
            .map(|list| {
                list.iter()
                    .filter(|u| {
                        let outpoint = parse_outpoint(&u.txid, u.vout).unwrap();
                        !spent.contains(&outpoint)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn estimate_fee_rate(&self) -> Result<FeeRate, NodeError> {
        self.check()?;
        Ok(self.fee_rate)
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, NodeError> {
        self.check()?;
        if self.failure == Failure::RejectBroadcast {
            return Err(NodeError::Rejected {
                code: -26,
                message: "min relay fee not met".into(),
            });
        }
        let tx = decode_transaction(raw_tx).map_err(|e| NodeError::Rejected {
            code: -22,
            message: format!("TX decode failed: {e}"),
        })?;
        let txid = tx.compute_txid().to_string();
        self.broadcasts.lock().unwrap().push(tx);
        Ok(txid)
    }

    async fn create_wallet(&self, _name: &str) -> Result<(), NodeError> {
        not_used("createwallet")
    }

    async fn import_private_key(
        &self,
        wif: &str,
        label: &str,
        rescan: bool,
    ) -> Result<(), NodeError> {
        self.check()?;
        self.imports
            .lock()
            .unwrap()
            .push((wif.to_owned(), label.to_owned(), rescan));
        Ok(())
    }

    async fn dump_private_key(&self, _address: &str) -> Result<String, NodeError> {
        not_used("dumpprivkey")
    }

    async fn encrypt_wallet(&self, _passphrase: &str) -> Result<(), NodeError> {
        not_used("encryptwallet")
    }

    async fn unlock_wallet(&self, _passphrase: &str, _timeout_secs: u64) -> Result<(), NodeError> {
        not_used("walletpassphrase")
    }

    async fn lock_wallet(&self) -> Result<(), NodeError> {
        not_used("walletlock")
    }

    async fn get_address_info(&self, _address: &str) -> Result<AddressInfo, NodeError> {
        not_used("getaddressinfo")
    }

    async fn create_raw_transaction(
        &self,
        _inputs: &[RawInput],
        _outputs: &[RawOutput],
    ) -> Result<String, NodeError> {
        not_used("createrawtransaction")
    }

    async fn fund_raw_transaction(&self, _hex: &str) -> Result<FundedTransaction, NodeError> {
        not_used("fundrawtransaction")
    }

    async fn sign_raw_transaction_with_key(
        &self,
        _hex: &str,
        _wifs: &[String],
    ) -> Result<SignedRawTransaction, NodeError> {
        not_used("signrawtransactionwithkey")
    }
}

// ─── Helpers ───────────────────────────────────────────────────────

fn scenario_seed() -> Vec<u8> {
    mnemonic_to_seed(SCENARIO_MNEMONIC, "").unwrap().to_vec()
}

fn testnet_wallet(index: u32) -> Wallet {
    CoinRegistry::with_defaults()
        .wallet_for(CoinType::BitcoinTestnet, &scenario_seed(), 0, 0, index)
        .unwrap()
}

fn engine_with(node: Arc<MockNode>, config: EngineConfig) -> Engine {
    Engine::new(CoinRegistry::with_defaults(), node, config)
}

fn engine(node: Arc<MockNode>) -> Engine {
    engine_with(node, EngineConfig::default())
}

/// Every input verifies and value is conserved.
fn assert_valid_spend(tx: &Transaction, wallet: &Wallet, spent_total: u64, fee: u64) {
    let script = p2pkh_script(&hash160(wallet.public_key()));
    for index in 0..tx.input.len() {
        verify_input(tx, index, &script).unwrap();
    }
    assert_eq!(spent_total, total_output(tx) + fee);
}

// ─── Derivation ────────────────────────────────────────────────────

#[test]
fn scenario_testnet_second_address() {
    assert!(validate_mnemonic(SCENARIO_MNEMONIC));
    let wallet = testnet_wallet(1);
    assert_eq!(wallet.derivation_path(), "m/44'/1'/0'/0/1");
    assert_eq!(wallet.address(), "mqJ8FALtYnxvLgwTUWQ2shNkdiLuU7tkPR");
    assert_eq!(
        hex::encode(wallet.public_key()),
        "0208bbc3dec2d64190bb7ddd89243fffd0a9b1d2533e75f46ff7d5b45fd63de224"
    );
    assert_eq!(
        wallet.private_key_wif(),
        "cTujmQgVdGYzmZEfhq5gVDpd2EAHF1sZahPmkDnRHmPDEVRYz6eo"
    );
}

#[test]
fn same_seed_addresses_per_chain() {
    let registry = CoinRegistry::with_defaults();
    let seed = scenario_seed();
    let expected = [
        (CoinType::Bitcoin, 0, "19p3GDKm7sDgKNyTqN3aeCioLw6TC9m8D8"),
        (CoinType::Bitcoin, 1, "14tqZGiTyMeXkoKz9Kqe7Ju6kDU7piGjNc"),
        (CoinType::BitcoinTestnet, 0, OTHER_TESTNET_ADDRESS),
        (CoinType::Litecoin, 0, "LSyh4VMq2zdhYqPquNxqWE14jg1oLHkD5Z"),
        (CoinType::Litecoin, 1, "La3FeFP5si6KQtvAL4ViS7tWN54AjmDTin"),
        (CoinType::Dogecoin, 0, "DMmEpoRm57op6tT2sH2udJXNmhy12JCT8c"),
        (CoinType::Dogecoin, 1, "DCBtnUcdnXAvaqrCfYUkCqzm4TLNknyv1r"),
    ];
    for (coin, index, address) in expected {
        let wallet = registry.wallet_for(coin, &seed, 0, 0, index).unwrap();
        assert_eq!(wallet.address(), address, "{coin} index {index}");
    }
}

#[test]
fn derive_twice_is_identical() {
    let a = testnet_wallet(5);
    let b = testnet_wallet(5);
    assert_eq!(a.address(), b.address());
    assert_eq!(a.public_key(), b.public_key());
    assert_eq!(a.private_key_wif(), b.private_key_wif());
}

#[test]
fn manual_path_matches_registry_shortcut() {
    let seed = scenario_seed();
    let master = derive_master(&seed).unwrap();
    let path: DerivationPath = "m/44'/1'/0'/0/1".parse().unwrap();
    let key = derive(&master, &path).unwrap();
    let wallet = CoinRegistry::with_defaults()
        .create_wallet(CoinType::BitcoinTestnet, &key)
        .unwrap();
    assert_eq!(wallet.address(), testnet_wallet(1).address());
}

// ─── Send pipeline ─────────────────────────────────────────────────

#[tokio::test]
async fn send_broadcasts_verified_transaction_with_change() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(2));
    node.fund(&wallet, &[30_000, 70_000]);
    let engine = engine(node.clone());

    let receipt = engine
        .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 50_000))
        .await
        .unwrap();

    // fee(1, 2) at 2 sat/B = 518; the 70k output covers alone.
    assert_eq!(receipt.inputs, 1);
    assert_eq!(receipt.fee, 518);
    assert_eq!(receipt.change, 70_000 - 50_000 - 518);

    let broadcasts = node.broadcasts();
    assert_eq!(broadcasts.len(), 1);
    let tx = &broadcasts[0];
    assert_eq!(tx.compute_txid().to_string(), receipt.txid);
    assert_eq!(tx.version, Version::TWO);
    assert_eq!(tx.output.len(), 2);
    assert_eq!(tx.output[0].value.to_sat(), 50_000);
    assert_eq!(tx.output[1].value.to_sat(), receipt.change);
    assert_valid_spend(tx, &wallet, 70_000, receipt.fee);
}

#[tokio::test]
async fn exact_amount_has_no_change_output() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1));
    node.fund(&wallet, &[10_259]);
    let engine = engine(node.clone());

    let receipt = engine
        .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 10_000))
        .await
        .unwrap();

    assert_eq!(receipt.change, 0);
    let tx = &node.broadcasts()[0];
    assert_eq!(tx.output.len(), 1);
    assert_valid_spend(tx, &wallet, 10_259, receipt.fee);
}

#[tokio::test]
async fn single_covering_output_preferred_over_combination() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1));
    node.fund(&wallet, &[1_000, 4_000, 5_000]);
    let engine = engine(node.clone());

    let receipt = engine
        .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 4_000))
        .await
        .unwrap();

    assert_eq!(receipt.inputs, 1);
    assert_eq!(receipt.fee, 259);
    assert_eq!(receipt.change, 5_000 - 4_000 - 259);
}

#[tokio::test]
async fn insufficient_funds_broadcasts_nothing() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1));
    node.fund(&wallet, &[500, 500]);
    let engine = engine(node.clone());

    let err = engine
        .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 2_000))
        .await
        .unwrap_err();

    assert!(matches!(err, WalletError::InsufficientFunds { available: 1_000, .. }));
    assert!(!err.is_retryable());
    assert!(node.broadcasts().is_empty());
}

#[tokio::test]
async fn invalid_destination_is_rejected_before_broadcast() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1));
    node.fund(&wallet, &[100_000]);
    let engine = engine(node.clone());

    // Mainnet address on a testnet wallet.
    let err = engine
        .send(
            &wallet,
            &SendRequest::new("19p3GDKm7sDgKNyTqN3aeCioLw6TC9m8D8", 10_000),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WalletError::InvalidAddress(_)));
    assert!(node.broadcasts().is_empty());
}

#[tokio::test]
async fn custom_change_address_receives_change() {
    let wallet = testnet_wallet(1);
    let change_wallet = testnet_wallet(2);
    let node = Arc::new(MockNode::new(1));
    node.fund(&wallet, &[100_000]);
    let engine = engine(node.clone());

    let request = SendRequest {
        destination: OTHER_TESTNET_ADDRESS.into(),
        amount_sat: 10_000,
        change_address: Some(change_wallet.address().to_owned()),
    };
    engine.send(&wallet, &request).await.unwrap();

    let tx = &node.broadcasts()[0];
    assert_eq!(
        tx.output[1].script_pubkey,
        p2pkh_script(&hash160(change_wallet.public_key()))
    );
}

#[tokio::test]
async fn dust_change_is_added_to_fee() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1));
    node.fund(&wallet, &[10_259 + 300]);
    let config = EngineConfig {
        dust_limit: 546,
        ..EngineConfig::default()
    };
    let engine = engine_with(node.clone(), config);

    let receipt = engine
        .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 10_000))
        .await
        .unwrap();

    assert_eq!(receipt.change, 0);
    assert_eq!(receipt.fee, 559);
    assert_eq!(node.broadcasts()[0].output.len(), 1);
}

#[tokio::test]
async fn prepare_signs_without_broadcasting() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(3));
    node.fund(&wallet, &[20_000, 20_000, 20_000]);
    let engine = engine(node.clone());

    let prepared = engine
        .prepare(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 35_000))
        .await
        .unwrap();

    assert!(node.broadcasts().is_empty());
    assert_eq!(prepared.transaction.tx.input.len(), 2);
    assert_valid_spend(&prepared.transaction.tx, &wallet, 40_000, prepared.fee);
    assert_eq!(prepared.transaction.txid, prepared.transaction.tx.compute_txid().to_string());
}

#[tokio::test]
async fn zero_amount_is_rejected() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1));
    node.fund(&wallet, &[100_000]);
    let err = engine(node)
        .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::TransactionFailed(_)));
}

#[tokio::test]
async fn concurrent_sends_from_one_address_spend_disjoint_outputs() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1));
    node.fund(&wallet, &[60_000, 60_000]);
    let engine = Arc::new(engine(node.clone()));

    let first = {
        let engine = engine.clone();
        let wallet = wallet.clone();
        tokio::spawn(async move {
            engine
                .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 40_000))
                .await
        })
    };
    let second = {
        let engine = engine.clone();
        let wallet = wallet.clone();
        tokio::spawn(async move {
            engine
                .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 40_000))
                .await
        })
    };

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_ne!(a.txid, b.txid);

    let broadcasts = node.broadcasts();
    assert_eq!(broadcasts.len(), 2);
    let inputs_a: HashSet<OutPoint> = broadcasts[0].input.iter().map(|i| i.previous_output).collect();
    let inputs_b: HashSet<OutPoint> = broadcasts[1].input.iter().map(|i| i.previous_output).collect();
    assert!(inputs_a.is_disjoint(&inputs_b));
    assert_eq!(engine.addresses_in_flight(), 0);
}

#[tokio::test]
async fn address_locks_are_released_after_each_send() {
    let node = Arc::new(MockNode::new(1));
    let engine = engine(node.clone());

    for index in 1..=5 {
        let wallet = testnet_wallet(index);
        node.fund(&wallet, &[50_000]);
        engine
            .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 10_000))
            .await
            .unwrap();
        assert_eq!(engine.addresses_in_flight(), 0);
    }

    // Failed attempts release their entry as well.
    let unfunded = testnet_wallet(9);
    assert!(engine
        .prepare(&unfunded, &SendRequest::new(OTHER_TESTNET_ADDRESS, 10_000))
        .await
        .is_err());
    assert_eq!(engine.addresses_in_flight(), 0);
}

#[tokio::test]
async fn randomized_fallback_config_still_sound() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1));
    let mut amounts = vec![100u64; 40];
    amounts.extend([6_000, 6_000]);
    node.fund(&wallet, &amounts);
    let config = EngineConfig {
        selection_attempts: 50,
        ..EngineConfig::default()
    };
    let engine = engine_with(node.clone(), config);

    let receipt = engine
        .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 10_000))
        .await
        .unwrap();

    let tx = &node.broadcasts()[0];
    assert_eq!(tx.input.len(), receipt.inputs);
    let spent: u64 = total_output(tx) + receipt.fee;
    assert_valid_spend(tx, &wallet, spent, receipt.fee);
}

// ─── Node failures ─────────────────────────────────────────────────

#[tokio::test]
async fn unreachable_node_is_retryable() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1).failing(Failure::Unreachable));
    let err = engine(node)
        .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 1_000))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::NodeUnavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn broadcast_rejection_is_surfaced() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1).failing(Failure::RejectBroadcast));
    node.fund(&wallet, &[100_000]);
    let engine = engine(node);
    let err = engine
        .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 1_000))
        .await
        .unwrap_err();
    assert_eq!(engine.addresses_in_flight(), 0);
    assert_eq!(
        err,
        WalletError::NodeRejected {
            code: -26,
            message: "min relay fee not met".into()
        }
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn slow_node_times_out() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1).failing(Failure::Hang));
    let config = EngineConfig {
        rpc_timeout_secs: 1,
        ..EngineConfig::default()
    };
    let err = engine_with(node, config)
        .send(&wallet, &SendRequest::new(OTHER_TESTNET_ADDRESS, 1_000))
        .await
        .unwrap_err();
    assert!(matches!(err, WalletError::NodeUnavailable(ref msg) if msg.contains("timed out")));
}

#[tokio::test]
async fn import_into_node_sends_wif_without_rescan() {
    let wallet = testnet_wallet(1);
    let node = Arc::new(MockNode::new(1));
    engine(node.clone())
        .import_into_node(&wallet, "customer-42")
        .await
        .unwrap();

    let imports = node.imports.lock().unwrap().clone();
    assert_eq!(
        imports,
        vec![(wallet.private_key_wif(), "customer-42".to_string(), false)]
    );
}
