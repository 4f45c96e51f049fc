use chain_btc::BtcError;
use node_rpc::NodeError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Unsupported coin: {0}")]
    UnsupportedCoin(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Insufficient funds: need {needed} sat, have {available} sat")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Signing failed: {0}")]
    SigningError(String),

    #[error("Transaction build failed: {0}")]
    TransactionFailed(String),

    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),

    #[error("Node rejected request ({code}): {message}")]
    NodeRejected { code: i64, message: String },

    #[error("Invalid node response: {0}")]
    InvalidNodeResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WalletError {
    /// Transport failures are the only errors worth retrying with backoff.
    /// A rejection after local self-verification points at a fee or
    /// selection bug and must be surfaced.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::NodeUnavailable(_))
    }
}

impl From<BtcError> for WalletError {
    fn from(e: BtcError) -> Self {
        match e {
            BtcError::InvalidAddress(msg) => WalletError::InvalidAddress(msg),
            BtcError::InsufficientFunds { needed, available } => {
                WalletError::InsufficientFunds { needed, available }
            }
            BtcError::InvalidPrivateKey(msg) | BtcError::InvalidPublicKey(msg) => {
                WalletError::SigningError(format!("key: {msg}"))
            }
            BtcError::SigningError(msg) => WalletError::SigningError(msg),
            BtcError::TransactionBuild(msg) | BtcError::Decode(msg) => {
                WalletError::TransactionFailed(msg)
            }
        }
    }
}

impl From<NodeError> for WalletError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::Unavailable(msg) => WalletError::NodeUnavailable(msg),
            NodeError::Rejected { code, message } => WalletError::NodeRejected { code, message },
            NodeError::InvalidResponse(msg) => WalletError::InvalidNodeResponse(msg),
        }
    }
}
