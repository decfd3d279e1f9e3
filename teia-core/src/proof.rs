//! Codec da prova de trabalho: 120 bytes em layout fixo little-endian

use shared::{ChainError, Hash256, Result};

use crate::params::CYCLE_LEN;

/// Tamanho do cabeçalho serializado embutido na prova
pub const HEADER_LEN: usize = 80;

/// Tamanho total da prova serializada
pub const PROOF_LEN: usize = HEADER_LEN + 8 + CYCLE_LEN * 4;

/// Prova de trabalho: cabeçalho, nonce e os 8 índices de aresta do ciclo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    /// Bytes do cabeçalho de 80 bytes exatamente como serializados
    pub header: [u8; HEADER_LEN],
    /// Nonce usado na derivação do grafo
    pub nonce: u64,
    /// Índices (no conjunto completo de arestas) que formam o ciclo
    pub cycle_edges: [u32; CYCLE_LEN],
}

impl Proof {
    /// Serializa a prova no layout de 120 bytes
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PROOF_LEN);
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        for edge in &self.cycle_edges {
            out.extend_from_slice(&edge.to_le_bytes());
        }
        out
    }

    /// Reconstrói uma prova a partir de exatamente 120 bytes
    ///
    /// # Errors
    ///
    /// Retorna erro para qualquer comprimento diferente de 120
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PROOF_LEN {
            return Err(ChainError::Codec(format!(
                "proof must be {PROOF_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[0..HEADER_LEN]);

        let nonce = u64::from_le_bytes(bytes[HEADER_LEN..HEADER_LEN + 8].try_into().unwrap());

        let mut cycle_edges = [0u32; CYCLE_LEN];
        for (i, chunk) in bytes[HEADER_LEN + 8..].chunks_exact(4).enumerate() {
            cycle_edges[i] = u32::from_le_bytes(chunk.try_into().unwrap());
        }

        Ok(Self {
            header,
            nonce,
            cycle_edges,
        })
    }

    /// Hash SHA-256 da prova serializada (comparado contra o alvo)
    #[must_use]
    pub fn hash(&self) -> Hash256 {
        Hash256::sha256(&self.serialize())
    }

    /// Lê o campo `bits` embutido nos bytes do cabeçalho
    #[must_use]
    pub fn header_bits(&self) -> u32 {
        u32::from_le_bytes(self.header[72..76].try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_round_trip() {
        let proof = Proof {
            header: [0xAAu8; HEADER_LEN],
            nonce: 12345,
            cycle_edges: [10, 20, 30, 40, 50, 60, 70, 80],
        };

        let bytes = proof.serialize();
        assert_eq!(bytes.len(), PROOF_LEN);

        let decoded = Proof::deserialize(&bytes).unwrap();
        assert_eq!(decoded, proof);
        assert_eq!(decoded.nonce, 12345);
        assert_eq!(decoded.cycle_edges, [10, 20, 30, 40, 50, 60, 70, 80]);
    }

    #[test]
    fn test_deserialize_rejects_wrong_length() {
        assert!(Proof::deserialize(&[0u8; PROOF_LEN - 1]).is_err());
        assert!(Proof::deserialize(&[0u8; PROOF_LEN + 1]).is_err());
        assert!(Proof::deserialize(&[]).is_err());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let proof = Proof {
            header: [1u8; HEADER_LEN],
            nonce: 7,
            cycle_edges: [0, 1, 2, 3, 4, 5, 6, 7],
        };
        assert_eq!(proof.hash(), proof.hash());
        assert_eq!(proof.hash(), Hash256::sha256(&proof.serialize()));
    }

    #[test]
    fn test_header_bits_extraction() {
        let mut header = [0u8; HEADER_LEN];
        header[72..76].copy_from_slice(&0x1D00_FFFFu32.to_le_bytes());
        let proof = Proof {
            header,
            nonce: 0,
            cycle_edges: [0; CYCLE_LEN],
        };
        assert_eq!(proof.header_bits(), 0x1D00_FFFF);
    }
}
