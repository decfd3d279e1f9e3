use thiserror::Error;

/// Erros compartilhados entre os módulos da Teia
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid proof: {0}")]
    InvalidProof(String),

    #[error("malformed bytes: {0}")]
    Codec(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("utxo not found")]
    UtxoNotFound,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("network error: {0}")]
    Network(String),
}
