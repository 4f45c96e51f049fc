use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// BIP-44 coin types known to the engine.
///
/// Only the Bitcoin family has wallet constructors; Ethereum and Solana are
/// listed so their registered constants stay interoperable with other
/// BIP-44 wallets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinType {
    Bitcoin,
    BitcoinTestnet,
    Litecoin,
    Dogecoin,
    Ethereum,
    Solana,
}

impl CoinType {
    pub const ALL: [CoinType; 6] = [
        CoinType::Bitcoin,
        CoinType::BitcoinTestnet,
        CoinType::Litecoin,
        CoinType::Dogecoin,
        CoinType::Ethereum,
        CoinType::Solana,
    ];

    /// BIP-44 coin type for this chain
    pub fn coin_type(&self) -> u32 {
        match self {
            CoinType::Bitcoin => 0,
            CoinType::BitcoinTestnet => 1,
            CoinType::Litecoin => 2,
            CoinType::Dogecoin => 3,
            CoinType::Ethereum => 60,
            CoinType::Solana => 501,
        }
    }

    pub fn from_coin_type(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.coin_type() == value)
    }

    /// Display name
    pub fn display_name(&self) -> &'static str {
        match self {
            CoinType::Bitcoin => "Bitcoin",
            CoinType::BitcoinTestnet => "Bitcoin Testnet",
            CoinType::Litecoin => "Litecoin",
            CoinType::Dogecoin => "Dogecoin",
            CoinType::Ethereum => "Ethereum",
            CoinType::Solana => "Solana",
        }
    }

    /// Short identifier used on the command line and in logs.
    pub fn id(&self) -> &'static str {
        match self {
            CoinType::Bitcoin => "btc",
            CoinType::BitcoinTestnet => "btc-testnet",
            CoinType::Litecoin => "ltc",
            CoinType::Dogecoin => "doge",
            CoinType::Ethereum => "eth",
            CoinType::Solana => "sol",
        }
    }

    /// Whether this is a testnet
    pub fn is_testnet(&self) -> bool {
        matches!(self, CoinType::BitcoinTestnet)
    }
}

impl fmt::Display for CoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for CoinType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        CoinType::ALL
            .into_iter()
            .find(|c| c.id() == lower)
            .or_else(|| match lower.as_str() {
                "bitcoin" => Some(CoinType::Bitcoin),
                "testnet" | "tbtc" => Some(CoinType::BitcoinTestnet),
                "litecoin" => Some(CoinType::Litecoin),
                "dogecoin" => Some(CoinType::Dogecoin),
                _ => None,
            })
            .ok_or_else(|| WalletError::UnsupportedCoin(s.to_owned()))
    }
}
