/// Address-encoding rules and metadata for one Bitcoin-family chain.
///
/// Every chain in the family shares the same transaction model; only these
/// parameters differ. Variants are plain values, so a chain that needs a
/// different display name or symbol is built with [`NetworkParams::renamed`]
/// instead of patching a constructed wallet afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    /// Human readable chain name.
    pub name: &'static str,
    /// Ticker symbol of the native coin.
    pub symbol: &'static str,
    /// BIP-44 coin type (unhardened value).
    pub coin_type: u32,
    /// Base58Check version byte for P2PKH addresses.
    pub p2pkh_version: u8,
    /// Base58Check version byte for P2SH addresses.
    pub p2sh_version: u8,
    /// Version byte prepended to WIF-encoded private keys.
    pub wif_prefix: u8,
    /// Human-readable part of bech32 segwit addresses, if the chain has segwit.
    pub bech32_hrp: Option<&'static str>,
    /// Default JSON-RPC port of the reference node.
    pub default_rpc_port: u16,
}

/// Bitcoin mainnet.
pub const BITCOIN: NetworkParams = NetworkParams {
    name: "Bitcoin",
    symbol: "BTC",
    coin_type: 0,
    p2pkh_version: 0x00,
    p2sh_version: 0x05,
    wif_prefix: 0x80,
    bech32_hrp: Some("bc"),
    default_rpc_port: 8332,
};

/// Bitcoin testnet3.
pub const BITCOIN_TESTNET: NetworkParams = NetworkParams {
    name: "Bitcoin Testnet",
    symbol: "tBTC",
    coin_type: 1,
    p2pkh_version: 0x6f,
    p2sh_version: 0xc4,
    wif_prefix: 0xef,
    bech32_hrp: Some("tb"),
    default_rpc_port: 18332,
};

/// Litecoin mainnet.
pub const LITECOIN: NetworkParams = NetworkParams {
    name: "Litecoin",
    symbol: "LTC",
    coin_type: 2,
    p2pkh_version: 0x30,
    p2sh_version: 0x32,
    wif_prefix: 0xb0,
    bech32_hrp: Some("ltc"),
    default_rpc_port: 9332,
};

/// Dogecoin mainnet (no segwit).
pub const DOGECOIN: NetworkParams = NetworkParams {
    name: "Dogecoin",
    symbol: "DOGE",
    coin_type: 3,
    p2pkh_version: 0x1e,
    p2sh_version: 0x16,
    wif_prefix: 0x9e,
    bech32_hrp: None,
    default_rpc_port: 22555,
};

impl NetworkParams {
    /// Same encoding rules under a different display name and symbol.
    pub const fn renamed(self, name: &'static str, symbol: &'static str) -> Self {
        Self {
            name,
            symbol,
            ..self
        }
    }

    /// Whether this chain accepts bech32 segwit destinations.
    pub fn supports_segwit(&self) -> bool {
        self.bech32_hrp.is_some()
    }
}

impl std::fmt::Display for NetworkParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.symbol)
    }
}
