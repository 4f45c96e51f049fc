use bitcoin::absolute::LockTime;
use bitcoin::consensus::{self, encode::serialize_hex};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{ecdsa, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use tracing::debug;

use crate::address::{hash160, Address};
use crate::error::BtcError;
use crate::keys::PrivateKey;
use crate::network::NetworkParams;
use crate::script;
use crate::utxo::SelectionResult;

/// Estimated serialized size of one P2PKH input, in bytes.
pub const INPUT_BYTES: u64 = 180;
/// Estimated serialized size of one output, in bytes.
pub const OUTPUT_BYTES: u64 = 34;
/// Fixed transaction overhead, in bytes.
pub const TX_OVERHEAD_BYTES: u64 = 10;

/// Fee rate in satoshis per byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FeeRate(u64);

impl FeeRate {
    pub const fn from_sat_per_byte(sat_per_byte: u64) -> Self {
        Self(sat_per_byte)
    }

    pub const fn sat_per_byte(self) -> u64 {
        self.0
    }

    /// Convert a node estimate in coin units per 1000 bytes, rounding up.
    ///
    /// Returns `None` for negative, non-finite or zero estimates.
    pub fn from_coin_per_kb(coin_per_kb: f64) -> Option<Self> {
        if !coin_per_kb.is_finite() || coin_per_kb <= 0.0 {
            return None;
        }
        let sat_per_kb = (coin_per_kb * 100_000_000.0).round();
        let sat_per_byte = (sat_per_kb / 1000.0).ceil() as u64;
        Some(Self(sat_per_byte.max(1)))
    }
}

impl std::fmt::Display for FeeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} sat/B", self.0)
    }
}

/// Estimated size in bytes: `inputs*180 + outputs*34 + 10 + inputs`.
pub fn estimate_size(num_inputs: usize, num_outputs: usize) -> u64 {
    let inputs = num_inputs as u64;
    let outputs = num_outputs as u64;
    inputs
        .saturating_mul(INPUT_BYTES)
        .saturating_add(outputs.saturating_mul(OUTPUT_BYTES))
        .saturating_add(TX_OVERHEAD_BYTES)
        .saturating_add(inputs)
}

/// Fee for a transaction of the given shape: `fee_rate * estimate_size`.
pub fn estimate_fee(num_inputs: usize, num_outputs: usize, fee_rate: FeeRate) -> u64 {
    estimate_size(num_inputs, num_outputs).saturating_mul(fee_rate.sat_per_byte())
}

/// Outpoint from a display-order (big-endian hex) txid, as nodes report it.
pub fn parse_outpoint(txid_hex: &str, vout: u32) -> Result<OutPoint, BtcError> {
    let txid = txid_hex
        .parse::<Txid>()
        .map_err(|e| BtcError::TransactionBuild(format!("invalid txid {txid_hex}: {e}")))?;
    Ok(OutPoint::new(txid, vout))
}

/// Decode a transaction from wire bytes. Trailing bytes are an error.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, BtcError> {
    consensus::deserialize(bytes).map_err(|e| BtcError::Decode(e.to_string()))
}

/// Sum of output values, in satoshis.
pub fn total_output(tx: &Transaction) -> u64 {
    tx.output
        .iter()
        .fold(0u64, |acc, o| acc.saturating_add(o.value.to_sat()))
}

/// A transaction ready for signing, with the outputs it spends.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    /// The transaction with empty scriptSigs.
    pub tx: Transaction,
    /// Previous outputs, in input order. Needed for sighash and verification.
    pub prevouts: Vec<TxOut>,
    /// Fee paid: inputs minus outputs.
    pub fee: u64,
    /// Value returned to the change address (0 when there is no change output).
    pub change: u64,
}

impl UnsignedTransaction {
    pub fn total_input(&self) -> u64 {
        self.prevouts
            .iter()
            .fold(0u64, |acc, p| acc.saturating_add(p.value.to_sat()))
    }

    pub fn serialize(&self) -> Vec<u8> {
        consensus::serialize(&self.tx)
    }
}

/// A fully signed, locally verified transaction.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub txid: String,
    pub fee: u64,
}

impl SignedTransaction {
    pub fn serialize(&self) -> Vec<u8> {
        consensus::serialize(&self.tx)
    }

    pub fn to_hex(&self) -> String {
        serialize_hex(&self.tx)
    }
}

/// Knobs for transaction construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildPolicy {
    /// Change below this many satoshis is added to the fee instead of creating
    /// an output. Zero keeps every non-zero change.
    pub dust_limit: u64,
}

/// Build an unsigned transaction paying `amount_sat` to `destination`.
///
/// The recipient receives exactly `amount_sat`; the fee (sized for the
/// selected inputs and two outputs) is taken out of the change. A change
/// output is added whenever the remainder is non-zero and not below
/// `policy.dust_limit`.
pub fn build_transaction(
    selection: &SelectionResult,
    destination: &str,
    amount_sat: u64,
    change_address: &str,
    network: &NetworkParams,
    policy: &BuildPolicy,
) -> Result<UnsignedTransaction, BtcError> {
    if amount_sat == 0 {
        return Err(BtcError::TransactionBuild("amount must be non-zero".into()));
    }
    if selection.selected.is_empty() {
        return Err(BtcError::TransactionBuild("no inputs selected".into()));
    }

    let recipient = Address::decode(destination, network)
        .map_err(|e| BtcError::InvalidAddress(format!("recipient: {e}")))?;
    let change_addr = Address::decode(change_address, network)
        .map_err(|e| BtcError::InvalidAddress(format!("change: {e}")))?;

    let needed = amount_sat.saturating_add(selection.fee);
    let remainder = selection
        .total_sat
        .checked_sub(needed)
        .ok_or(BtcError::InsufficientFunds {
            needed,
            available: selection.total_sat,
        })?;

    let mut inputs = Vec::with_capacity(selection.selected.len());
    let mut prevouts = Vec::with_capacity(selection.selected.len());
    for utxo in &selection.selected {
        inputs.push(TxIn {
            previous_output: parse_outpoint(&utxo.txid, utxo.vout)?,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        });
        prevouts.push(TxOut {
            value: Amount::from_sat(utxo.amount_sat),
            script_pubkey: ScriptBuf::from(utxo.script_pubkey.clone()),
        });
    }

    let mut outputs = vec![TxOut {
        value: Amount::from_sat(amount_sat),
        script_pubkey: recipient.script_pubkey()?,
    }];

    let (fee, change) = if remainder == 0 || remainder < policy.dust_limit {
        (selection.fee + remainder, 0)
    } else {
        outputs.push(TxOut {
            value: Amount::from_sat(remainder),
            script_pubkey: change_addr.script_pubkey()?,
        });
        (selection.fee, remainder)
    };

    debug!(
        inputs = inputs.len(),
        outputs = outputs.len(),
        amount_sat,
        fee,
        change,
        network = network.symbol,
        "built unsigned transaction"
    );

    Ok(UnsignedTransaction {
        tx: Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: inputs,
            output: outputs,
        },
        prevouts,
        fee,
        change,
    })
}

/// Sign every input with the matching key from `keys`.
///
/// Each previous output must be P2PKH; the key whose compressed public key
/// hashes to it signs with SIGHASH_ALL. Every input is then run through the
/// script interpreter before the transaction is returned.
pub fn sign_transaction(
    unsigned: &UnsignedTransaction,
    keys: &[PrivateKey],
) -> Result<SignedTransaction, BtcError> {
    if unsigned.prevouts.len() != unsigned.tx.input.len() {
        return Err(BtcError::SigningError(format!(
            "{} prevouts for {} inputs",
            unsigned.prevouts.len(),
            unsigned.tx.input.len()
        )));
    }

    let secp = Secp256k1::signing_only();
    let cache = SighashCache::new(&unsigned.tx);

    let mut keyring = Vec::with_capacity(keys.len());
    for key in keys {
        let pubkey = key.public_key_compressed()?;
        keyring.push((hash160(&pubkey), pubkey, key));
    }

    let mut signed = unsigned.tx.clone();

    for (index, prevout) in unsigned.prevouts.iter().enumerate() {
        let pubkey_hash = script::p2pkh_hash(&prevout.script_pubkey).ok_or_else(|| {
            BtcError::SigningError(format!("input {index} does not spend a P2PKH output"))
        })?;

        let (_, pubkey, key) = keyring
            .iter()
            .find(|(hash, _, _)| *hash == pubkey_hash)
            .ok_or_else(|| BtcError::SigningError(format!("no private key for input {index}")))?;

        let sighash = cache
            .legacy_signature_hash(index, &prevout.script_pubkey, EcdsaSighashType::All.to_u32())
            .map_err(|e| BtcError::SigningError(format!("sighash for input {index}: {e}")))?;
        let msg = Message::from_digest(sighash.to_byte_array());
        let signature = ecdsa::Signature::sighash_all(secp.sign_ecdsa(&msg, &key.secret_key()?));

        signed.input[index].script_sig = script::p2pkh_script_sig(&signature, pubkey)?;
    }

    for (index, prevout) in unsigned.prevouts.iter().enumerate() {
        script::verify_input(&signed, index, &prevout.script_pubkey)?;
    }

    let txid = signed.compute_txid().to_string();
    debug!(%txid, inputs = signed.input.len(), "signed and verified transaction");

    Ok(SignedTransaction {
        tx: signed,
        txid,
        fee: unsigned.fee,
    })
}

/// Sign when one key controls every input.
pub fn sign_with_key(
    unsigned: &UnsignedTransaction,
    key: &PrivateKey,
) -> Result<SignedTransaction, BtcError> {
    sign_transaction(unsigned, std::slice::from_ref(key))
}
