use bech32::{segwit, Fe32, Hrp};
use bitcoin::ScriptBuf;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::BtcError;
use crate::network::NetworkParams;
use crate::script;

/// A decoded destination, independent of the chain it was encoded for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Pay-to-public-key-hash.
    P2pkh([u8; 20]),
    /// Pay-to-script-hash.
    P2sh([u8; 20]),
    /// Native segwit output (v0 P2WPKH/P2WSH, v1 taproot).
    Witness { version: u8, program: Vec<u8> },
}

impl Address {
    /// P2PKH address for a 33-byte compressed secp256k1 public key.
    pub fn p2pkh_from_pubkey(pubkey_bytes: &[u8; 33]) -> Result<Self, BtcError> {
        if pubkey_bytes[0] != 0x02 && pubkey_bytes[0] != 0x03 {
            return Err(BtcError::InvalidPublicKey(
                "compressed key must start with 0x02 or 0x03".into(),
            ));
        }
        Ok(Address::P2pkh(hash160(pubkey_bytes)))
    }

    /// Locking script paying to this address.
    pub fn script_pubkey(&self) -> Result<ScriptBuf, BtcError> {
        match self {
            Address::P2pkh(hash) => Ok(script::p2pkh_script(hash)),
            Address::P2sh(hash) => Ok(script::p2sh_script(hash)),
            Address::Witness { version, program } => script::witness_script(*version, program),
        }
    }

    /// Encode for the given chain.
    pub fn encode(&self, network: &NetworkParams) -> Result<String, BtcError> {
        match self {
            Address::P2pkh(hash) => Ok(base58check(network.p2pkh_version, hash)),
            Address::P2sh(hash) => Ok(base58check(network.p2sh_version, hash)),
            Address::Witness { version, program } => {
                let hrp_str = network.bech32_hrp.ok_or_else(|| {
                    BtcError::InvalidAddress(format!("{} has no segwit addresses", network.name))
                })?;
                let hrp = Hrp::parse(hrp_str)
                    .map_err(|e| BtcError::InvalidAddress(format!("bad hrp: {e}")))?;
                let witness_version = Fe32::try_from(*version)
                    .map_err(|e| BtcError::InvalidAddress(format!("bad witness version: {e}")))?;
                segwit::encode(hrp, witness_version, program)
                    .map_err(|e| BtcError::InvalidAddress(format!("bech32 encoding failed: {e}")))
            }
        }
    }

    /// Decode an address string, requiring it to belong to `network`.
    pub fn decode(address: &str, network: &NetworkParams) -> Result<Self, BtcError> {
        if let Some(hrp) = network.bech32_hrp {
            let prefix = format!("{hrp}1");
            if address.to_lowercase().starts_with(&prefix) {
                return decode_segwit(address, hrp);
            }
        }

        let payload = bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map_err(|e| BtcError::InvalidAddress(format!("invalid base58check: {e}")))?;

        if payload.len() != 21 {
            return Err(BtcError::InvalidAddress(format!(
                "expected 21-byte payload, got {}",
                payload.len()
            )));
        }

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);

        match payload[0] {
            v if v == network.p2pkh_version => Ok(Address::P2pkh(hash)),
            v if v == network.p2sh_version => Ok(Address::P2sh(hash)),
            v => Err(BtcError::InvalidAddress(format!(
                "version byte 0x{v:02x} is not valid for {}",
                network.name
            ))),
        }
    }
}

fn decode_segwit(address: &str, expected_hrp: &str) -> Result<Address, BtcError> {
    let (hrp, version, program) = segwit::decode(address)
        .map_err(|e| BtcError::InvalidAddress(format!("invalid bech32: {e}")))?;

    if !hrp.to_string().eq_ignore_ascii_case(expected_hrp) {
        return Err(BtcError::InvalidAddress(format!(
            "expected hrp {expected_hrp}, got {hrp}"
        )));
    }

    Ok(Address::Witness {
        version: version.to_u8(),
        program,
    })
}

/// Derive the P2PKH address string for a compressed public key.
pub fn pubkey_to_p2pkh_address(
    pubkey_bytes: &[u8; 33],
    network: &NetworkParams,
) -> Result<String, BtcError> {
    Address::p2pkh_from_pubkey(pubkey_bytes)?.encode(network)
}

/// Check whether an address string decodes for the given chain.
///
/// Returns `Ok(false)` for well-formed addresses of another chain and an
/// error for strings that are not addresses at all.
pub fn validate_address(address: &str, network: &NetworkParams) -> Result<bool, BtcError> {
    match Address::decode(address, network) {
        Ok(_) => Ok(true),
        Err(_) if bs58::decode(address).with_check(None).into_vec().is_ok() => Ok(false),
        Err(_) if segwit::decode(address).is_ok() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Hash160: RIPEMD-160(SHA-256(data)).
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

fn base58check(version: u8, hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}
