use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::BtcError;
use crate::network::NetworkParams;

/// Suffix byte marking a WIF key whose public key is used compressed.
const WIF_COMPRESSED_FLAG: u8 = 0x01;

/// A secp256k1 private key that is wiped from memory when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    bytes: [u8; 32],
}

impl PrivateKey {
    /// Wrap a 32-byte scalar, rejecting zero and values >= the curve order.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, BtcError> {
        SecretKey::from_slice(&bytes)
            .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secret key: {e}")))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub(crate) fn secret_key(&self) -> Result<SecretKey, BtcError> {
        SecretKey::from_slice(&self.bytes)
            .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secret key: {e}")))
    }

    /// 33-byte SEC1 compressed public key.
    pub fn public_key_compressed(&self) -> Result<[u8; 33], BtcError> {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &self.secret_key()?);
        Ok(public_key.serialize())
    }

    /// Wallet Import Format for the given chain (always compressed).
    pub fn to_wif(&self, network: &NetworkParams) -> String {
        let mut payload = Vec::with_capacity(34);
        payload.push(network.wif_prefix);
        payload.extend_from_slice(&self.bytes);
        payload.push(WIF_COMPRESSED_FLAG);
        let encoded = bs58::encode(&payload).with_check().into_string();
        payload.zeroize();
        encoded
    }

    /// Parse a WIF string, checking its prefix against `network`.
    ///
    /// Returns the key and whether it is flagged as compressed.
    pub fn from_wif(wif: &str, network: &NetworkParams) -> Result<(Self, bool), BtcError> {
        let mut payload = bs58::decode(wif)
            .with_check(None)
            .into_vec()
            .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid WIF encoding: {e}")))?;

        let result = parse_wif_payload(&payload, network);
        payload.zeroize();
        result
    }
}

fn parse_wif_payload(payload: &[u8], network: &NetworkParams) -> Result<(PrivateKey, bool), BtcError> {
    let compressed = match payload.len() {
        33 => false,
        34 if payload[33] == WIF_COMPRESSED_FLAG => true,
        34 => {
            return Err(BtcError::InvalidPrivateKey(
                "unknown WIF compression flag".into(),
            ))
        }
        n => {
            return Err(BtcError::InvalidPrivateKey(format!(
                "WIF payload must be 33 or 34 bytes, got {n}"
            )))
        }
    };

    if payload[0] != network.wif_prefix {
        return Err(BtcError::InvalidPrivateKey(format!(
            "WIF prefix 0x{:02x} is not valid for {}",
            payload[0], network.name
        )));
    }

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&payload[1..33]);
    let key = PrivateKey::from_bytes(bytes);
    bytes.zeroize();
    Ok((key?, compressed))
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}
