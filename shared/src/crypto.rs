//! Módulo de criptografia Ed25519 para a Teia
//!
//! O script de bloqueio da Teia é pay-to-pubkey puro: a chave pública tem
//! sempre 32 bytes e a assinatura 64 bytes.

use crate::{ChainError, Result};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Tamanho em bytes de uma chave pública Ed25519
pub const PUBLIC_KEY_LEN: usize = 32;
/// Tamanho em bytes de uma assinatura Ed25519
pub const SIGNATURE_LEN: usize = 64;

/// Algoritmos de assinatura suportados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    Ed25519,
}

/// Chave pública Ed25519
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key_data: [u8; PUBLIC_KEY_LEN],
}

/// Chave privada Ed25519 (zerada ao ser descartada)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    key_data: [u8; PUBLIC_KEY_LEN],
}

/// Par de chaves Ed25519
#[derive(Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// Assinatura digital destacada
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(with = "serde_bytes64")]
    data: [u8; SIGNATURE_LEN],
}

impl PublicKey {
    /// Cria uma chave pública a partir de bytes
    ///
    /// # Errors
    ///
    /// Retorna erro se os bytes não formarem um ponto Ed25519 válido
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| ChainError::InvalidKeySize {
                expected: PUBLIC_KEY_LEN,
                actual: bytes.len(),
            })?;
        // Valida que os bytes decodificam para um ponto da curva
        VerifyingKey::from_bytes(&arr)
            .map_err(|e| ChainError::Crypto(format!("invalid public key: {e}")))?;
        Ok(Self { key_data: arr })
    }

    /// Returns the raw bytes of the public key
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.key_data
    }

    /// Returns the signature algorithm used by this key
    #[must_use]
    pub const fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }

    fn to_dalek(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.key_data)
            .map_err(|e| ChainError::Crypto(format!("invalid public key: {e}")))
    }
}

impl PrivateKey {
    /// Creates a `PrivateKey` from raw seed bytes
    ///
    /// # Errors
    ///
    /// Returns error if the slice is not exactly 32 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| ChainError::InvalidKeySize {
                expected: PUBLIC_KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self { key_data: arr })
    }

    /// Returns the raw bytes of the private key seed
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.key_data
    }

    fn to_dalek(&self) -> SigningKey {
        SigningKey::from_bytes(&self.key_data)
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Nunca expor o material da chave em logs
        write!(f, "PrivateKey(ed25519)")
    }
}

impl KeyPair {
    /// Generates a new Ed25519 keypair from the system RNG
    #[must_use]
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let public_key = PublicKey {
            key_data: signing.verifying_key().to_bytes(),
        };
        let private_key = PrivateKey {
            key_data: signing.to_bytes(),
        };
        Self {
            public_key,
            private_key,
        }
    }

    /// Reconstrói o par de chaves a partir da semente privada
    ///
    /// # Errors
    ///
    /// Retorna erro se a semente não tiver 32 bytes
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let private_key = PrivateKey::from_bytes(seed)?;
        let public_key = PublicKey {
            key_data: private_key.to_dalek().verifying_key().to_bytes(),
        };
        Ok(Self {
            public_key,
            private_key,
        })
    }

    /// Assina uma mensagem arbitrária
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.private_key.to_dalek().sign(message);
        Signature {
            data: sig.to_bytes(),
        }
    }
}

impl Signature {
    /// Cria uma assinatura a partir de bytes
    ///
    /// # Errors
    ///
    /// Retorna erro se a fatia não tiver exatamente 64 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; SIGNATURE_LEN] =
            bytes.try_into().map_err(|_| ChainError::InvalidKeySize {
                expected: SIGNATURE_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self { data: arr })
    }

    /// Returns the raw bytes of the signature
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.data
    }
}

/// Verifica uma assinatura Ed25519 sobre uma mensagem
///
/// # Errors
///
/// Retorna `InvalidSignature` se a verificação falhar, ou erro
/// criptográfico se a chave for malformada
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let key = public_key.to_dalek()?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.data);
    key.verify(message, &sig)
        .map_err(|_| ChainError::InvalidSignature)
}

/// Conveniência: verifica retornando booleano (sem distinguir a causa)
#[must_use]
pub fn signature_is_valid(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    verify_signature(public_key, message, signature).is_ok()
}

mod serde_bytes64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8; 64], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 64], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("signature must be 64 bytes"))
    }
}
