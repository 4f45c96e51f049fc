//! Coin registry: maps coin types to wallet constructors.
//!
//! Bitcoin-family coins share [`Wallet::from_key`]; each registered
//! constructor only fixes the [`NetworkParams`] and coin type it passes in.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chain_btc::address::pubkey_to_p2pkh_address;
use chain_btc::network::{BITCOIN, BITCOIN_TESTNET, DOGECOIN, LITECOIN};
use chain_btc::{NetworkParams, PrivateKey};
use tracing::debug;

use crate::error::WalletError;
use crate::hd_derivation::{derive, derive_master, DerivationPath, ExtendedKey};
use crate::types::CoinType;

/// Builds a [`Wallet`] from a derived key.
pub type WalletConstructor =
    Arc<dyn Fn(&ExtendedKey) -> Result<Wallet, WalletError> + Send + Sync>;

/// One leaf of the derivation tree bound to one chain's encoding rules.
#[derive(Clone)]
pub struct Wallet {
    coin: CoinType,
    network: NetworkParams,
    private_key: PrivateKey,
    public_key: [u8; 33],
    address: String,
    derivation_path: String,
}

impl Wallet {
    /// Base constructor for every Bitcoin-family chain.
    pub fn from_key(
        coin: CoinType,
        network: NetworkParams,
        key: &ExtendedKey,
    ) -> Result<Self, WalletError> {
        let private_key = key.private_key()?;
        let public_key = key.public_key()?;
        let address = pubkey_to_p2pkh_address(&public_key, &network)?;

        Ok(Self {
            coin,
            network,
            private_key,
            public_key,
            address,
            derivation_path: key.path(),
        })
    }

    pub fn coin_type(&self) -> CoinType {
        self.coin
    }

    pub fn network(&self) -> &NetworkParams {
        &self.network
    }

    pub fn symbol(&self) -> &'static str {
        self.network.symbol
    }

    /// P2PKH address of the compressed public key.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }

    pub fn derivation_path(&self) -> &str {
        &self.derivation_path
    }

    /// Compressed WIF for importing into a node.
    pub fn private_key_wif(&self) -> String {
        self.private_key.to_wif(&self.network)
    }

    pub(crate) fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("coin", &self.coin)
            .field("address", &self.address)
            .field("derivation_path", &self.derivation_path)
            .finish_non_exhaustive()
    }
}

/// Explicit registry object, built at startup and passed by reference.
#[derive(Default, Clone)]
pub struct CoinRegistry {
    constructors: HashMap<CoinType, WalletConstructor>,
}

impl CoinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// BTC, BTC testnet, LTC and DOGE.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (coin, network) in [
            (CoinType::Bitcoin, BITCOIN),
            (CoinType::BitcoinTestnet, BITCOIN_TESTNET),
            (CoinType::Litecoin, LITECOIN),
            (CoinType::Dogecoin, DOGECOIN),
        ] {
            registry.register(coin, move |key| Wallet::from_key(coin, network, key));
        }
        registry
    }

    /// Register (or replace) the constructor for `coin`.
    pub fn register<F>(&mut self, coin: CoinType, constructor: F)
    where
        F: Fn(&ExtendedKey) -> Result<Wallet, WalletError> + Send + Sync + 'static,
    {
        debug!(coin = coin.id(), "registering wallet constructor");
        self.constructors.insert(coin, Arc::new(constructor));
    }

    pub fn is_supported(&self, coin: CoinType) -> bool {
        self.constructors.contains_key(&coin)
    }

    pub fn supported_coins(&self) -> Vec<CoinType> {
        let mut coins: Vec<CoinType> = self.constructors.keys().copied().collect();
        coins.sort_by_key(|c| c.coin_type());
        coins
    }

    pub fn create_wallet(&self, coin: CoinType, key: &ExtendedKey) -> Result<Wallet, WalletError> {
        let constructor = self
            .constructors
            .get(&coin)
            .ok_or_else(|| WalletError::UnsupportedCoin(coin.display_name().to_owned()))?;
        constructor(key)
    }

    /// Seed → master → `m/44'/coin'/account'/change/index` → wallet.
    pub fn wallet_for(
        &self,
        coin: CoinType,
        seed: &[u8],
        account: u32,
        change: u32,
        index: u32,
    ) -> Result<Wallet, WalletError> {
        if !self.is_supported(coin) {
            return Err(WalletError::UnsupportedCoin(coin.display_name().to_owned()));
        }
        let master = derive_master(seed)?;
        let path = DerivationPath::bip44(coin, account, change, index)?;
        let key = derive(&master, &path)?;
        self.create_wallet(coin, &key)
    }
}

impl fmt::Debug for CoinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoinRegistry")
            .field("coins", &self.supported_coins())
            .finish()
    }
}
