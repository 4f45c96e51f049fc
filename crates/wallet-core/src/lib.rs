//! Multi-coin HD wallet core and Bitcoin-family send engine.
//!
//! A BIP-39 mnemonic becomes a seed, the seed a BIP-32 master key, and a
//! BIP-44 path a [`Wallet`] bound to one chain through the [`CoinRegistry`].
//! The [`Engine`] turns a wallet and a [`SendRequest`] into a signed,
//! self-verified transaction and hands it to a [`node_rpc::NodeAdapter`].

pub mod config;
pub mod engine;
pub mod error;
pub mod hd_derivation;
pub mod logging;
pub mod mnemonic;
pub mod registry;
pub mod types;

pub use config::EngineConfig;
pub use engine::{Engine, PreparedSend, SendReceipt, SendRequest};
pub use error::WalletError;
pub use hd_derivation::{derive, derive_master, DerivationPath, ExtendedKey};
pub use mnemonic::{generate_mnemonic, mnemonic_to_seed, validate_mnemonic, ZeroizingMnemonic};
pub use registry::{CoinRegistry, Wallet};
pub use types::CoinType;
