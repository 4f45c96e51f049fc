//! Bitcoin-family chain support for the custodial wallet engine.
//!
//! Covers BTC, BTC testnet, LTC and DOGE: legacy P2PKH addresses, WIF keys,
//! UTXO coin selection, transaction building on `bitcoin` consensus types,
//! legacy sighash signing and a small script interpreter used to self-verify
//! every signed input before it leaves the process.

pub mod address;
pub mod error;
pub mod keys;
pub mod network;
pub mod script;
pub mod transaction;
pub mod utxo;

pub use bitcoin::Transaction;
pub use error::BtcError;
pub use keys::PrivateKey;
pub use network::NetworkParams;
pub use transaction::{
    build_transaction, decode_transaction, parse_outpoint, sign_transaction, sign_with_key,
    total_output, BuildPolicy, FeeRate, SignedTransaction, UnsignedTransaction,
};
pub use utxo::{select_utxos, select_utxos_with, SelectionResult, SelectionStrategy, Utxo};
