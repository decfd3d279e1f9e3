pub mod crypto;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{
    signature_is_valid, verify_signature, KeyPair, PrivateKey, PublicKey, Signature,
    SignatureAlgorithm,
};
pub use error::ChainError;
pub use hash::Hash256;

pub type Result<T> = std::result::Result<T, ChainError>;
