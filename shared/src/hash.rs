use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hash de 256 bits usado para identificar blocos, transações e provas
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// Creates a zeroed hash
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Creates a hash from a 32-byte array
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of the hash
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes the SHA-256 hash of the provided data
    #[must_use]
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// Verifica se o hash é o hash zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Decodifica um hash a partir de uma string hexadecimal de 64 caracteres
    ///
    /// # Errors
    ///
    /// Retorna erro se a string não for hexadecimal válido de 32 bytes
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| crate::ChainError::Codec(format!("invalid hash hex: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| crate::ChainError::Codec("hash hex must be 32 bytes".to_string()))?;
        Ok(Self(arr))
    }

    /// Representação hexadecimal minúscula do hash
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_creation_and_display() {
        let hash = Hash256::zero();
        assert_eq!(
            hash.to_string(),
            "0000000000000000000000000000000000000000000000000000000000000000"
        );
        assert!(hash.is_zero());
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256 da entrada vazia (vetor conhecido)
        let hash = Hash256::sha256(b"");
        assert_eq!(
            hash.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = Hash256::sha256(b"teia");
        let parsed = Hash256::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);

        assert!(Hash256::from_hex("zz").is_err());
        assert!(Hash256::from_hex("00ff").is_err());
    }

    #[test]
    fn test_lexicographic_ordering() {
        // Ordenação por bytes big-endian: usada como desempate de fork
        let a = Hash256::from_bytes([0u8; 32]);
        let mut higher = [0u8; 32];
        higher[0] = 1;
        let b = Hash256::from_bytes(higher);
        assert!(a < b);
    }
}
