use std::fmt;
use std::str::FromStr;

use bip32::{ChildNumber, XPrv};
use chain_btc::PrivateKey;
use k256::ecdsa::SigningKey;
use zeroize::Zeroize;

use crate::error::WalletError;
use crate::types::CoinType;

/// Added to an index to mark it hardened.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

pub const BIP44_PURPOSE: u32 = 44;

const MIN_SEED_LEN: usize = 16;
const MAX_SEED_LEN: usize = 64;

/// BIP-44 derivation path: m/purpose'/coin_type'/account'/change/address_index
///
/// Indices are stored raw, with [`HARDENED_OFFSET`] already applied where
/// the component is hardened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    indices: [u32; 5],
}

impl DerivationPath {
    pub fn new(indices: [u32; 5]) -> Self {
        Self { indices }
    }

    /// `m/44'/coin'/account'/change/address_index` for a registered coin.
    pub fn bip44(
        coin: CoinType,
        account: u32,
        change: u32,
        address_index: u32,
    ) -> Result<Self, WalletError> {
        for (name, value) in [("account", account), ("change", change), ("address_index", address_index)] {
            if value >= HARDENED_OFFSET {
                return Err(WalletError::InvalidPath(format!(
                    "{name} {value} is out of range"
                )));
            }
        }
        Ok(Self {
            indices: [
                BIP44_PURPOSE | HARDENED_OFFSET,
                coin.coin_type() | HARDENED_OFFSET,
                account | HARDENED_OFFSET,
                change,
                address_index,
            ],
        })
    }

    pub fn indices(&self) -> [u32; 5] {
        self.indices
    }

    /// Coin type component with the hardened bit cleared.
    pub fn coin_type(&self) -> u32 {
        self.indices[1] & !HARDENED_OFFSET
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for index in self.indices {
            write_component(f, index)?;
        }
        Ok(())
    }
}

fn write_component(f: &mut impl fmt::Write, index: u32) -> fmt::Result {
    if index >= HARDENED_OFFSET {
        write!(f, "/{}'", index - HARDENED_OFFSET)
    } else {
        write!(f, "/{index}")
    }
}

impl FromStr for DerivationPath {
    type Err = WalletError;

    /// Parse "m/44'/1'/0'/0/1"; `'` or `h` mark hardened components.
    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let rest = path
            .strip_prefix("m/")
            .ok_or_else(|| WalletError::InvalidPath("Path must start with m/".into()))?;

        let components: Vec<&str> = rest.split('/').collect();
        if components.len() != 5 {
            return Err(WalletError::InvalidPath(format!(
                "expected 5 components, got {}",
                components.len()
            )));
        }

        let mut indices = [0u32; 5];
        for (slot, component) in indices.iter_mut().zip(components) {
            let (digits, hardened) = match component.strip_suffix(['\'', 'h']) {
                Some(digits) => (digits, true),
                None => (component, false),
            };
            let value: u32 = digits.parse().map_err(|e| {
                WalletError::InvalidPath(format!("Invalid path component {component:?}: {e}"))
            })?;
            if value >= HARDENED_OFFSET {
                return Err(WalletError::InvalidPath(format!(
                    "component {value} is out of range"
                )));
            }
            *slot = if hardened { value | HARDENED_OFFSET } else { value };
        }
        Ok(Self { indices })
    }
}

/// A private node of the BIP-32 tree.
#[derive(Clone)]
pub struct ExtendedKey {
    xprv: XPrv,
    /// Child numbers from the master key down to this node.
    path: Vec<u32>,
}

impl ExtendedKey {
    pub fn depth(&self) -> u8 {
        self.xprv.attrs().depth
    }

    pub fn chain_code(&self) -> [u8; 32] {
        self.xprv.attrs().chain_code
    }

    pub fn parent_fingerprint(&self) -> [u8; 4] {
        self.xprv.attrs().parent_fingerprint
    }

    /// Raw child number of this node (0 for the master key).
    pub fn child_number(&self) -> u32 {
        u32::from(self.xprv.attrs().child_number)
    }

    /// Path from the master key, e.g. "m/44'/0'/0'/0/0".
    pub fn path(&self) -> String {
        let mut out = String::from("m");
        for index in &self.path {
            // Writing to a String cannot fail.
            let _ = write_component(&mut out, *index);
        }
        out
    }

    /// 33-byte SEC1 compressed public key.
    pub fn public_key(&self) -> Result<[u8; 33], WalletError> {
        let mut private_key_bytes: [u8; 32] = self.xprv.to_bytes().into();
        let signing_key = SigningKey::from_bytes(&private_key_bytes.into());
        private_key_bytes.zeroize();
        let signing_key =
            signing_key.map_err(|e| WalletError::InvalidPath(format!("derived invalid key: {e}")))?;

        signing_key
            .verifying_key()
            .to_sec1_bytes()
            .as_ref()
            .try_into()
            .map_err(|_| WalletError::InvalidPath("Invalid public key length".into()))
    }

    /// The private scalar as a signing key.
    pub fn private_key(&self) -> Result<PrivateKey, WalletError> {
        let mut private_key_bytes: [u8; 32] = self.xprv.to_bytes().into();
        let key = PrivateKey::from_bytes(private_key_bytes);
        private_key_bytes.zeroize();
        key.map_err(|e| WalletError::InvalidPath(format!("derived invalid key: {e}")))
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("path", &self.path())
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

/// Master key from a BIP-39 seed.
///
/// Seeds outside 16..=64 bytes are rejected with `InvalidSeed`.
pub fn derive_master(seed: &[u8]) -> Result<ExtendedKey, WalletError> {
    if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&seed.len()) {
        return Err(WalletError::InvalidSeed(format!(
            "seed must be {MIN_SEED_LEN}..={MAX_SEED_LEN} bytes, got {}",
            seed.len()
        )));
    }
    let xprv = XPrv::new(seed).map_err(|e| WalletError::InvalidSeed(e.to_string()))?;
    Ok(ExtendedKey {
        xprv,
        path: Vec::new(),
    })
}

/// Walk `path` down from `parent`.
pub fn derive(parent: &ExtendedKey, path: &DerivationPath) -> Result<ExtendedKey, WalletError> {
    let mut xprv = parent.xprv.clone();
    let mut trail = parent.path.clone();

    for index in path.indices() {
        xprv = xprv.derive_child(ChildNumber::from(index)).map_err(|e| {
            WalletError::InvalidPath(format!("cannot derive child {index:#x}: {e}"))
        })?;
        trail.push(index);
    }

    Ok(ExtendedKey { xprv, path: trail })
}
