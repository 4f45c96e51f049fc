use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chain_btc::{FeeRate, Utxo};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};

use crate::adapter::{
    AddressInfo, FundedTransaction, NodeAdapter, RawInput, RawOutput, SignedRawTransaction,
};
use crate::error::NodeError;

const SATS_PER_COIN: f64 = 100_000_000.0;

/// Connection settings for [`BitcoindClient`].
#[derive(Debug, Clone)]
pub struct BitcoindConfig {
    /// Base RPC URL, e.g. `http://127.0.0.1:18332`.
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Routes wallet calls to `/wallet/<name>` when set.
    pub wallet: Option<String>,
    pub timeout: Duration,
    /// Used when `estimatesmartfee` has no estimate.
    pub fallback_fee_rate: FeeRate,
    /// Confirmation target passed to `estimatesmartfee`.
    pub conf_target: u16,
}

impl BitcoindConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: None,
            password: None,
            wallet: None,
            timeout: Duration::from_secs(10),
            fallback_fee_rate: FeeRate::from_sat_per_byte(1),
            conf_target: 6,
        }
    }

    fn endpoint(&self) -> String {
        let base = self.url.trim_end_matches('/');
        match &self.wallet {
            Some(name) => format!("{base}/wallet/{name}"),
            None => base.to_owned(),
        }
    }
}

/// JSON-RPC 1.0 client for bitcoind-compatible nodes.
pub struct BitcoindClient {
    client: Client,
    endpoint: String,
    user: Option<String>,
    password: Option<String>,
    fallback_fee_rate: FeeRate,
    conf_target: u16,
    next_id: AtomicU64,
}

impl BitcoindClient {
    pub fn new(config: BitcoindConfig) -> Result<Self, NodeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NodeError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint(),
            client,
            user: config.user,
            password: config.password,
            fallback_fee_rate: config.fallback_fee_rate,
            conf_target: config.conf_target,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, NodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(method, id, "rpc call");

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        // bitcoind answers RPC errors with HTTP 500 and a JSON body, so the
        // status alone says nothing.
        let value: Value = serde_json::from_str(&text).map_err(|_| {
            NodeError::Unavailable(format!("{method}: HTTP {status} with non-JSON body"))
        })?;

        let result = parse_response(value)?;
        serde_json::from_value(result)
            .map_err(|e| NodeError::InvalidResponse(format!("{method}: {e}")))
    }
}

/// Split a JSON-RPC envelope into its result or a structured rejection.
pub fn parse_response(mut envelope: Value) -> Result<Value, NodeError> {
    let error = envelope.get_mut("error").map(Value::take).unwrap_or(Value::Null);
    if !error.is_null() {
        let code = error.get("code").and_then(Value::as_i64);
        let message = error.get("message").and_then(Value::as_str);
        return match (code, message) {
            (Some(code), Some(message)) => Err(NodeError::Rejected {
                code,
                message: message.to_owned(),
            }),
            _ => Err(NodeError::InvalidResponse(format!("malformed error object: {error}"))),
        };
    }

    match envelope.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(NodeError::InvalidResponse("missing result".into())),
    }
}

/// Coin units as reported by the node to satoshis.
pub fn coin_to_sat(amount: f64) -> Result<u64, NodeError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(NodeError::InvalidResponse(format!("invalid amount {amount}")));
    }
    Ok((amount * SATS_PER_COIN).round() as u64)
}

/// Satoshis to the decimal coin amount the node expects.
pub fn sat_to_coin(amount_sat: u64) -> Value {
    let coins = amount_sat as f64 / SATS_PER_COIN;
    serde_json::Number::from_f64(coins)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[derive(Deserialize)]
struct ListUnspentEntry {
    txid: String,
    vout: u32,
    amount: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: String,
}

/// Parse a `listunspent` result.
pub fn parse_unspent(result: Value) -> Result<Vec<Utxo>, NodeError> {
    let entries: Vec<ListUnspentEntry> = serde_json::from_value(result)
        .map_err(|e| NodeError::InvalidResponse(format!("listunspent: {e}")))?;

    entries
        .into_iter()
        .map(|entry| {
            let script_pubkey = hex::decode(&entry.script_pub_key)
                .map_err(|e| NodeError::InvalidResponse(format!("scriptPubKey hex: {e}")))?;
            Ok(Utxo {
                txid: entry.txid,
                vout: entry.vout,
                amount_sat: coin_to_sat(entry.amount)?,
                script_pubkey,
            })
        })
        .collect()
}

#[derive(Deserialize)]
struct SmartFeeEstimate {
    feerate: Option<f64>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Turn an `estimatesmartfee` result into a fee rate, or `fallback` when
/// the node has no estimate yet.
pub fn parse_fee_estimate(result: Value, fallback: FeeRate) -> Result<FeeRate, NodeError> {
    let estimate: SmartFeeEstimate = serde_json::from_value(result)
        .map_err(|e| NodeError::InvalidResponse(format!("estimatesmartfee: {e}")))?;

    match estimate.feerate.and_then(FeeRate::from_coin_per_kb) {
        Some(rate) => Ok(rate),
        None => {
            warn!(
                errors = ?estimate.errors,
                fallback = %fallback,
                "no fee estimate from node, using fallback"
            );
            Ok(fallback)
        }
    }
}

#[derive(Deserialize)]
struct FundRawResult {
    hex: String,
    fee: f64,
    changepos: i32,
}

#[async_trait]
impl NodeAdapter for BitcoindClient {
    async fn list_unspent(&self, address: &str) -> Result<Vec<Utxo>, NodeError> {
        let result: Value = self
            .call("listunspent", json!([1, 9_999_999, [address]]))
            .await?;
        let utxos = parse_unspent(result)?;
        debug!(address, count = utxos.len(), "fetched unspent outputs");
        Ok(utxos)
    }

    async fn estimate_fee_rate(&self) -> Result<FeeRate, NodeError> {
        let result: Value = self
            .call("estimatesmartfee", json!([self.conf_target]))
            .await?;
        parse_fee_estimate(result, self.fallback_fee_rate)
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, NodeError> {
        let txid: String = self
            .call("sendrawtransaction", json!([hex::encode(raw_tx)]))
            .await?;
        info!(%txid, "transaction broadcast");
        Ok(txid)
    }

    async fn create_wallet(&self, name: &str) -> Result<(), NodeError> {
        let _: Value = self.call("createwallet", json!([name])).await?;
        Ok(())
    }

    async fn import_private_key(
        &self,
        wif: &str,
        label: &str,
        rescan: bool,
    ) -> Result<(), NodeError> {
        let _: Value = self
            .call("importprivkey", json!([wif, label, rescan]))
            .await?;
        Ok(())
    }

    async fn dump_private_key(&self, address: &str) -> Result<String, NodeError> {
        self.call("dumpprivkey", json!([address])).await
    }

    async fn encrypt_wallet(&self, passphrase: &str) -> Result<(), NodeError> {
        let _: Value = self.call("encryptwallet", json!([passphrase])).await?;
        Ok(())
    }

    async fn unlock_wallet(&self, passphrase: &str, timeout_secs: u64) -> Result<(), NodeError> {
        let _: Value = self
            .call("walletpassphrase", json!([passphrase, timeout_secs]))
            .await?;
        Ok(())
    }

    async fn lock_wallet(&self) -> Result<(), NodeError> {
        let _: Value = self.call("walletlock", json!([])).await?;
        Ok(())
    }

    async fn get_address_info(&self, address: &str) -> Result<AddressInfo, NodeError> {
        self.call("getaddressinfo", json!([address])).await
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[RawInput],
        outputs: &[RawOutput],
    ) -> Result<String, NodeError> {
        let outputs: Vec<Value> = outputs
            .iter()
            .map(|o| json!({ o.address.as_str(): sat_to_coin(o.amount_sat) }))
            .collect();
        self.call("createrawtransaction", json!([inputs, outputs]))
            .await
    }

    async fn fund_raw_transaction(&self, hex: &str) -> Result<FundedTransaction, NodeError> {
        let funded: FundRawResult = self.call("fundrawtransaction", json!([hex])).await?;
        Ok(FundedTransaction {
            hex: funded.hex,
            fee_sat: coin_to_sat(funded.fee)?,
            change_position: funded.changepos,
        })
    }

    async fn sign_raw_transaction_with_key(
        &self,
        hex: &str,
        wifs: &[String],
    ) -> Result<SignedRawTransaction, NodeError> {
        self.call("signrawtransactionwithkey", json!([hex, wifs]))
            .await
    }
}
