//! Node adapter for bitcoind-compatible JSON-RPC servers.
//!
//! [`NodeAdapter`] is the seam the wallet engine talks through; the
//! [`BitcoindClient`] implementation speaks JSON-RPC 1.0 over HTTP to
//! bitcoind, litecoind or dogecoind.

pub mod adapter;
pub mod client;
pub mod error;

pub use adapter::{
    AddressInfo, FundedTransaction, NodeAdapter, RawInput, RawOutput, SignedRawTransaction,
};
pub use client::{BitcoindClient, BitcoindConfig};
pub use error::NodeError;
